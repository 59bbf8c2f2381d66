//! Route handlers, one router per resource.

mod activities;
mod auth;
mod bookings;
mod mentors;
mod referrals;

pub use activities::activity_routes;
pub use auth::auth_routes;
pub use bookings::booking_routes;
pub use mentors::mentor_routes;
pub use referrals::{IDEMPOTENCY_HEADER, referral_routes};
