//! Referral ledger - Referral codes, referral links and the one-time referral reward.
//!
//! Codes are allocated lazily with a conditional UPDATE (`WHERE referral_code IS
//! NULL`) backed by a unique column, so concurrent allocations for the same user
//! settle on one code and collisions between users are retried with a fresh
//! suffix. Completion flips `PENDING -> COMPLETED` with a conditional UPDATE and
//! credits the referrer in the same transaction, so the reward is paid exactly once.

use crate::{
    core::points::{self, Posting, PointsEntry},
    entities::{
        Referral, User, points_history::PointsType, referral, referral::ReferralStatus, user,
    },
    errors::{Error, Result, is_unique_violation},
};
use rand::Rng;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Points paid to the referrer when a referral completes.
pub const REFERRAL_REWARD_POINTS: i64 = 100;

/// Suffix retries before code allocation gives up.
const MAX_CODE_ATTEMPTS: usize = 10;

/// Prefix used when the user's name has no usable characters.
const FALLBACK_NAME_PREFIX: &str = "USER";

/// One referral made by a user, with the referred user's contact details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    /// The referral row
    #[serde(flatten)]
    pub referral: referral::Model,
    /// Name of the referred user
    pub referred_name: Option<String>,
    /// Email of the referred user
    pub referred_email: Option<String>,
}

/// Summary returned by [`get_stats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    /// The user's code, allocated on first request
    pub referral_code: String,
    /// Current points balance
    pub total_points: i64,
    /// Number of referrals made
    pub total_referrals: usize,
    /// Referrals that paid out
    pub completed_referrals: usize,
    /// Referrals still waiting for their trigger
    pub pending_referrals: usize,
    /// Sum of points awarded across referrals
    pub total_earned: i64,
    /// The referrals, newest first
    pub referrals: Vec<ReferralSummary>,
}

/// Outcome of [`complete_referral`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// The referral after completion
    pub referral: referral::Model,
    /// The credit paid to the referrer
    pub posting: Posting,
}

/// Builds the stable part of a code: up to four letters of the first name plus
/// the grade, or a random age between 15 and 24 when no grade is known.
pub fn code_prefix<R: Rng + ?Sized>(full_name: &str, grade: Option<&str>, rng: &mut R) -> String {
    let name: String = full_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(4)
        .collect::<String>()
        .to_ascii_uppercase();
    let name = if name.is_empty() {
        FALLBACK_NAME_PREFIX.to_string()
    } else {
        name
    };

    let grade_or_age = grade
        .map(|g| {
            g.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| rng.gen_range(15..=24).to_string());

    format!("{name}{grade_or_age}")
}

/// Appends a random three-digit suffix to `prefix`.
pub fn code_candidate<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    format!("{prefix}{}", rng.gen_range(100..1000))
}

/// Returns the user's referral code, allocating one on first use.
///
/// Calling this repeatedly, or concurrently, always yields the same code.
///
/// # Errors
/// Returns an error if:
/// - The user does not exist
/// - No free code was found within the retry budget
/// - The database operation fails
#[instrument(skip(db))]
pub async fn generate_referral_code(db: &DatabaseConnection, user_id: i64) -> Result<String> {
    let user = find_user(db, user_id).await?;
    if let Some(code) = user.referral_code {
        return Ok(code);
    }

    let prefix = {
        let mut rng = rand::thread_rng();
        code_prefix(&user.full_name, user.grade.as_deref(), &mut rng)
    };

    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let candidate = {
            let mut rng = rand::thread_rng();
            code_candidate(&prefix, &mut rng)
        };

        let outcome = User::update_many()
            .col_expr(user::Column::ReferralCode, Expr::value(candidate.clone()))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::ReferralCode.is_null())
            .exec(db)
            .await;

        match outcome {
            Ok(result) if result.rows_affected > 0 => {
                info!("Assigned referral code {} to user {}", candidate, user_id);
                return Ok(candidate);
            }
            // Another request assigned a code first
            Ok(_) => {
                return find_user(db, user_id)
                    .await?
                    .referral_code
                    .ok_or(Error::UserNotFound { id: user_id });
            }
            Err(err) if is_unique_violation(&err) => {
                debug!(
                    "Referral code {} already taken (attempt {}/{})",
                    candidate, attempt, MAX_CODE_ATTEMPTS
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::ReferralCodeExhausted {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

/// Links `new_user_id` to the owner of `code` and opens a pending referral.
///
/// # Errors
/// Returns an error if:
/// - No user owns the code (`InvalidReferralCode`)
/// - The code belongs to the new user (`SelfReferral`)
/// - The pair already has a referral (`DuplicateReferral`)
/// - The new user was already referred through another code (`AlreadyReferred`)
/// - The new user does not exist
#[instrument(skip(db))]
pub async fn apply_code(
    db: &DatabaseConnection,
    code: &str,
    new_user_id: i64,
) -> Result<referral::Model> {
    let referrer = check_code(db, code, new_user_id).await?;

    let txn = db.begin().await?;
    match link_in(&txn, &referrer, new_user_id).await {
        Ok(referral) => {
            txn.commit().await?;
            Ok(referral)
        }
        Err(err) => {
            txn.rollback().await?;
            Err(err)
        }
    }
}

/// [`apply_code`] on an existing connection or transaction, used by signup.
///
/// Inside a transaction the caller should already have written, since the
/// code checks read before the link is stored.
#[instrument(skip(conn))]
pub async fn apply_code_in<C>(conn: &C, code: &str, new_user_id: i64) -> Result<referral::Model>
where
    C: ConnectionTrait,
{
    let referrer = check_code(conn, code, new_user_id).await?;
    link_in(conn, &referrer, new_user_id).await
}

/// Resolves the code to its owner and rejects links that cannot be made.
async fn check_code<C>(conn: &C, code: &str, new_user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(Error::Validation {
            message: "Referral code is required".to_string(),
        });
    }

    let referrer = User::find()
        .filter(user::Column::ReferralCode.eq(code.as_str()))
        .one(conn)
        .await?
        .ok_or_else(|| Error::InvalidReferralCode { code: code.clone() })?;

    if referrer.id == new_user_id {
        return Err(Error::SelfReferral);
    }

    let new_user = find_user(conn, new_user_id).await?;

    let existing = Referral::find()
        .filter(referral::Column::ReferrerId.eq(referrer.id))
        .filter(referral::Column::ReferredId.eq(new_user_id))
        .one(conn)
        .await?;
    if existing.is_some() {
        return Err(Error::DuplicateReferral);
    }

    if new_user.referred_by.is_some() {
        return Err(Error::AlreadyReferred { id: new_user_id });
    }

    Ok(referrer)
}

/// Stores the link and the pending referral. The conditional UPDATE goes first
/// and settles concurrent applications for the same user.
async fn link_in<C>(conn: &C, referrer: &user::Model, new_user_id: i64) -> Result<referral::Model>
where
    C: ConnectionTrait,
{
    let linked = User::update_many()
        .col_expr(user::Column::ReferredBy, Expr::value(referrer.id))
        .filter(user::Column::Id.eq(new_user_id))
        .filter(user::Column::ReferredBy.is_null())
        .exec(conn)
        .await?;
    if linked.rows_affected == 0 {
        return Err(Error::AlreadyReferred { id: new_user_id });
    }

    let referral = referral::ActiveModel {
        referrer_id: Set(referrer.id),
        referred_id: Set(new_user_id),
        status: Set(ReferralStatus::Pending),
        points_awarded: Set(0),
        created_at: Set(chrono::Utc::now()),
        completed_at: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            Error::DuplicateReferral
        } else {
            err.into()
        }
    })?;

    info!(
        "User {} referred by user {} (code {:?})",
        new_user_id, referrer.id, referrer.referral_code
    );
    Ok(referral)
}

/// Completes the referral of `referred_user_id` and pays the referrer
/// [`REFERRAL_REWARD_POINTS`], all in one transaction.
///
/// # Errors
/// Returns an error if:
/// - The user has no referral row (`NoReferralFound`)
/// - The referral is already completed (`AlreadyCompleted`)
/// - The database operation fails
#[instrument(skip(db))]
pub async fn complete_referral(db: &DatabaseConnection, referred_user_id: i64) -> Result<Completion> {
    let pending = Referral::find()
        .filter(referral::Column::ReferredId.eq(referred_user_id))
        .one(db)
        .await?
        .ok_or(Error::NoReferralFound {
            id: referred_user_id,
        })?;
    if pending.status == ReferralStatus::Completed {
        return Err(Error::AlreadyCompleted);
    }

    let txn = db.begin().await?;
    match pay_out_in(&txn, &pending).await {
        Ok(completion) => {
            txn.commit().await?;
            info!(
                "Referral {} completed, {} points to user {}",
                completion.referral.id, REFERRAL_REWARD_POINTS, completion.referral.referrer_id
            );
            Ok(completion)
        }
        Err(err) => {
            txn.rollback().await?;
            Err(err)
        }
    }
}

/// Flips the referral to `COMPLETED` and credits the referrer. The flip is the
/// first statement and only one caller can win it.
async fn pay_out_in<C>(conn: &C, pending: &referral::Model) -> Result<Completion>
where
    C: ConnectionTrait,
{
    let flipped = Referral::update_many()
        .col_expr(
            referral::Column::Status,
            Expr::value(ReferralStatus::Completed),
        )
        .col_expr(
            referral::Column::PointsAwarded,
            Expr::value(REFERRAL_REWARD_POINTS),
        )
        .col_expr(
            referral::Column::CompletedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(referral::Column::Id.eq(pending.id))
        .filter(referral::Column::Status.eq(ReferralStatus::Pending))
        .exec(conn)
        .await?;
    if flipped.rows_affected == 0 {
        return Err(Error::AlreadyCompleted);
    }

    let referred_name = find_user(conn, pending.referred_id).await?.full_name;
    let posting = points::credit_in(
        conn,
        PointsEntry::new(
            pending.referrer_id,
            REFERRAL_REWARD_POINTS,
            PointsType::Referral,
            format!("Referral bonus - {referred_name} joined and booked a session"),
        )
        .with_reference(pending.referred_id.to_string()),
    )
    .await?;

    let referral = Referral::find_by_id(pending.id)
        .one(conn)
        .await?
        .ok_or(Error::NoReferralFound {
            id: pending.referred_id,
        })?;

    Ok(Completion { referral, posting })
}

/// Completes the user's referral if one is still pending; used as the
/// first-booking trigger.
///
/// # Errors
/// Returns database errors only; a missing or already completed referral yields `Ok(None)`.
pub async fn complete_if_pending(db: &DatabaseConnection, user_id: i64) -> Result<Option<Completion>> {
    match complete_referral(db, user_id).await {
        Ok(completion) => Ok(Some(completion)),
        Err(Error::NoReferralFound { .. } | Error::AlreadyCompleted) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Returns the user's code (allocating it if needed), balance and referral summary.
///
/// # Errors
/// Returns an error if the user does not exist or the database operation fails.
pub async fn get_stats(db: &DatabaseConnection, user_id: i64) -> Result<ReferralStats> {
    let referral_code = generate_referral_code(db, user_id).await?;
    let total_points = points::get_balance(db, user_id).await?;

    let referrals = Referral::find()
        .filter(referral::Column::ReferrerId.eq(user_id))
        .order_by_desc(referral::Column::CreatedAt)
        .order_by_desc(referral::Column::Id)
        .all(db)
        .await?;

    let referred_ids: Vec<i64> = referrals.iter().map(|r| r.referred_id).collect();
    let referred_users: HashMap<i64, user::Model> = if referred_ids.is_empty() {
        HashMap::new()
    } else {
        User::find()
            .filter(user::Column::Id.is_in(referred_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect()
    };

    let completed_referrals = referrals
        .iter()
        .filter(|r| r.status == ReferralStatus::Completed)
        .count();
    let pending_referrals = referrals
        .iter()
        .filter(|r| r.status == ReferralStatus::Pending)
        .count();
    let total_earned = referrals.iter().map(|r| r.points_awarded).sum();

    let referrals: Vec<ReferralSummary> = referrals
        .into_iter()
        .map(|referral| {
            let referred = referred_users.get(&referral.referred_id);
            ReferralSummary {
                referred_name: referred.map(|u| u.full_name.clone()),
                referred_email: referred.map(|u| u.email.clone()),
                referral,
            }
        })
        .collect();

    Ok(ReferralStats {
        referral_code,
        total_points,
        total_referrals: referrals.len(),
        completed_referrals,
        pending_referrals,
        total_earned,
        referrals,
    })
}

async fn find_user<C>(conn: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(Error::UserNotFound { id: user_id })
}
