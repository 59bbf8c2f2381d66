//! Core business logic, independent of the HTTP layer.

/// Activity feed entries
pub mod activity;
/// Booking creation, status changes and dashboards
pub mod booking;
/// Signup, login and identity lookups
pub mod identity;
/// Points balance and ledger
pub mod points;
/// Referral codes and referral rewards
pub mod referral;
/// Point awards for forum posts and study groups
pub mod rewards;
