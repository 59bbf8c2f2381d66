//! User entity - Students who book sessions and hold a points balance.
//!
//! `points` is only ever changed through `core::points`, which keeps it equal to
//! the sum of the user's `points_history` rows. `referral_code` is allocated
//! lazily and never changes once set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a user account. Mentors live in their own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// A student account
    #[sea_orm(string_value = "STUDENT")]
    Student,
}

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login email, unique across users
    #[sea_orm(unique)]
    pub email: String,
    /// Argon2 PHC string, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name; the first word seeds the referral code
    pub full_name: String,
    /// Account role
    pub role: UserRole,
    /// Optional contact phone
    pub phone: Option<String>,
    /// Optional city
    pub city: Option<String>,
    /// School grade, used in the referral code when present
    pub grade: Option<String>,
    /// Optional school name
    pub school: Option<String>,
    /// Current points balance, never negative
    pub points: i64,
    /// Shareable referral code, unique once assigned
    #[sea_orm(unique)]
    pub referral_code: Option<String>,
    /// The user whose code this user signed up with
    pub referred_by: Option<i64>,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The referring user
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ReferredBy",
        to = "Column::Id",
        fk_name = "fk-users-referred_by"
    )]
    Referrer,
    /// Ledger entries for this user
    #[sea_orm(has_many = "super::points_history::Entity")]
    PointsHistory,
    /// Sessions this user booked
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
    /// Activity feed entries
    #[sea_orm(has_many = "super::activity::Entity")]
    Activities,
}

impl Related<super::points_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PointsHistory.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Activities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
