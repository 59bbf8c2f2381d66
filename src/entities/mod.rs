//! SeaORM entities for users, mentors, referrals, the points ledger, bookings
//! and the activity feed. Tables are created from these definitions at startup.

pub mod activity;
pub mod booking;
pub mod mentor;
pub mod points_history;
pub mod referral;
pub mod user;

pub use activity::{Column as ActivityColumn, Entity as Activity, Model as ActivityModel};
pub use booking::{Column as BookingColumn, Entity as Booking, Model as BookingModel};
pub use mentor::{Column as MentorColumn, Entity as Mentor, Model as MentorModel};
pub use points_history::{
    Column as PointsHistoryColumn, Entity as PointsHistory, Model as PointsHistoryModel,
};
pub use referral::{Column as ReferralColumn, Entity as Referral, Model as ReferralModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
