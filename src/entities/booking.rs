//! Booking entity - A paid session between a student and a mentor.
//!
//! Bookings are created `CONFIRMED`. From there they can be rescheduled (same
//! state) or moved to `COMPLETED` or `CANCELLED`, both of which are terminal.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Booking lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Initial state
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    /// Session took place
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    /// Session was declined or cancelled
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl BookingStatus {
    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `COMPLETED` and `CANCELLED` accept no further changes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a booking in this state may move to `next`.
    ///
    /// Only `CONFIRMED` bookings can change; `CONFIRMED -> CONFIRMED` is the
    /// reschedule case.
    #[must_use]
    pub const fn can_transition_to(self, _next: Self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the booking
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student who booked
    pub user_id: i64,
    /// Mentor being booked
    pub mentor_id: i64,
    /// Day of the session
    pub date: Date,
    /// Time slot as entered by the student (e.g. "14:30")
    pub time: String,
    /// What the session is about
    pub topic: String,
    /// Length in minutes
    pub duration: i32,
    /// Price paid in whole currency units
    pub amount: i64,
    /// Generated order reference, `ORD` followed by digits
    #[sea_orm(unique)]
    pub order_id: String,
    /// Lifecycle state
    pub status: BookingStatus,
    /// When the booking was made
    pub created_at: DateTimeUtc,
    /// When the booking was last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Booking and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each booking belongs to one student
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    /// Each booking belongs to one mentor
    #[sea_orm(
        belongs_to = "super::mentor::Entity",
        from = "Column::MentorId",
        to = "super::mentor::Column::Id"
    )]
    Mentor,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::mentor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mentor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
