//! Referral entity - Links a referred user to the user whose code they applied.
//!
//! A referral starts `PENDING` with zero points and moves to `COMPLETED` exactly
//! once. `referred_id` is unique, so a user can be referred at most once.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a referral
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
    /// Code applied, reward not yet earned
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Reward paid out; terminal
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

/// Referral database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referrals")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Unique identifier for the referral
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who owns the applied code
    pub referrer_id: i64,
    /// User who applied the code
    #[sea_orm(unique)]
    pub referred_id: i64,
    /// Current status
    pub status: ReferralStatus,
    /// 0 while pending, the fixed reward once completed
    pub points_awarded: i64,
    /// When the code was applied
    pub created_at: DateTimeUtc,
    /// When the reward was paid
    pub completed_at: Option<DateTimeUtc>,
}

/// Defines relationships between Referral and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// The user earning the reward
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ReferrerId",
        to = "super::user::Column::Id",
        fk_name = "fk-referrals-referrer_id"
    )]
    Referrer,
    /// The user who signed up with the code
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::ReferredId",
        to = "super::user::Column::Id",
        fk_name = "fk-referrals-referred_id"
    )]
    Referred,
}

impl ActiveModelBehavior for ActiveModel {}
