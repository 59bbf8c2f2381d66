//! Activity entity - Dashboard feed entries.
//!
//! Written best-effort after the mutation they describe has committed; a failed
//! write here never undoes a booking or points change.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Activity database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activities")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User the entry belongs to
    pub user_id: i64,
    /// Machine-readable kind, e.g. `"session_booking"`
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    /// Short headline
    pub title: String,
    /// Longer description
    pub description: String,
    /// When it happened
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Activity and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each entry belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
