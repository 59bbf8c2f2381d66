//! Mentor entity - A separate identity space from users.
//!
//! `sessions_count` is bumped with a single atomic UPDATE for every booking
//! created against the mentor.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Mentor database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mentors")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the mentor
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login email, unique across mentors
    #[sea_orm(unique)]
    pub email: String,
    /// Argon2 PHC string, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name
    pub name: String,
    /// Job title (e.g. "Senior Engineer")
    pub title: Option<String>,
    /// Current employer
    pub company: Option<String>,
    /// Price of a session in whole currency units
    pub price: i64,
    /// Number of bookings ever created against this mentor
    pub sessions_count: i64,
    /// When the mentor registered
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Mentor and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Sessions booked with this mentor
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
