//! Points history entity - The append-only points ledger.
//!
//! Rows are inserted by `core::points` in the same database transaction that
//! moves the user's balance, and are never updated or deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What a ledger entry was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointsType {
    /// Reward for creating a forum post
    #[sea_orm(string_value = "FORUM_POST")]
    ForumPost,
    /// Reward for creating a study group
    #[sea_orm(string_value = "STUDY_GROUP")]
    StudyGroup,
    /// Reward for a completed referral
    #[sea_orm(string_value = "REFERRAL")]
    Referral,
    /// Points spent on a discount
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
}

/// Points history database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "points_history")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the entry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the balance this entry moved
    pub user_id: i64,
    /// Signed amount: positive for credits, negative for debits
    pub points: i64,
    /// Reason for the movement
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub kind: PointsType,
    /// Human-readable description
    pub description: String,
    /// Optional id of the related record (post, booking, referred user)
    pub reference: Option<String>,
    /// Client-supplied key that makes a retried mutation replay this entry
    #[sea_orm(unique)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// When the entry was written
    pub created_at: DateTimeUtc,
}

/// Defines relationships between PointsHistory and other entities
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
