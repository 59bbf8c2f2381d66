//! Points account - The only code path that moves a user's points balance.
//!
//! Every credit or debit updates `users.points` and appends a `points_history`
//! row inside one database transaction, so the balance always equals the sum of
//! the ledger. Balance updates are single conditional UPDATE statements
//! (`points = points + n`, or `points = points - n WHERE points >= n`), which
//! keeps concurrent debits from jointly overdrawing an account.
//!
//! Callers that already hold a transaction use the `*_in` variants.

use crate::{
    entities::{PointsHistory, User, points_history, points_history::PointsType, user},
    errors::{Error, Result},
};
use sea_orm::{
    QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::Serialize;
use tracing::{info, instrument};

/// Number of ledger entries returned by [`get_history`].
pub const HISTORY_LIMIT: u64 = 50;

/// A requested balance movement. `amount` is always positive; the direction
/// comes from calling [`credit`] or [`debit`].
#[derive(Debug, Clone)]
pub struct PointsEntry {
    /// Account to move
    pub user_id: i64,
    /// Positive number of points
    pub amount: i64,
    /// Ledger category
    pub kind: PointsType,
    /// Human-readable description stored on the ledger row
    pub description: String,
    /// Optional related record id
    pub reference: Option<String>,
    /// Optional client key that makes retries replay instead of re-apply
    pub idempotency_key: Option<String>,
}

impl PointsEntry {
    /// Builds an entry without reference or idempotency key.
    #[must_use]
    pub fn new(user_id: i64, amount: i64, kind: PointsType, description: impl Into<String>) -> Self {
        Self {
            user_id,
            amount,
            kind,
            description: description.into(),
            reference: None,
            idempotency_key: None,
        }
    }

    /// Attaches a reference id.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attaches an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

/// Result of a credit or debit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    /// The ledger row (the original one when `replayed`)
    pub entry: points_history::Model,
    /// Balance after the posting
    pub balance: i64,
    /// True when an earlier posting with the same idempotency key was returned
    pub replayed: bool,
}

/// Result of redeeming points for a discount.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    /// Discount in currency units (1 point = 1 unit)
    pub discount: i64,
    /// Balance left after redeeming
    pub remaining_points: i64,
    /// The debit posting
    pub posting: Posting,
}

/// Current balance plus the most recent ledger entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsHistoryView {
    /// Current balance
    pub current_points: i64,
    /// Newest entries first
    pub history: Vec<points_history::Model>,
}

/// Balance compared against the ledger sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAudit {
    /// `users.points`
    pub balance: i64,
    /// Sum of the user's `points_history.points`
    pub ledger_total: i64,
}

impl BalanceAudit {
    /// Whether the balance matches the ledger.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.balance == self.ledger_total
    }
}

/// Direction of a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Credit,
    Debit,
}

impl Direction {
    const fn signed(self, amount: i64) -> i64 {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }
}

/// Credits points in its own transaction.
///
/// A request carrying an idempotency key that was already posted returns the
/// earlier posting with `replayed` set.
///
/// # Errors
/// Returns an error if:
/// - The amount is zero or negative
/// - The user does not exist
/// - The idempotency key belongs to another user or another movement
/// - The database operation fails
pub async fn credit(db: &DatabaseConnection, entry: PointsEntry) -> Result<Posting> {
    post(db, entry, Direction::Credit).await
}

/// Credits points using an existing connection or transaction.
///
/// The balance UPDATE is the first statement, so inside a transaction the write
/// lock is taken before anything is read. Idempotency keys are not replayed
/// here; a reused key fails with `IdempotencyConflict`.
#[instrument(skip(conn, entry), fields(user_id = entry.user_id, amount = entry.amount))]
pub async fn credit_in<C>(conn: &C, entry: PointsEntry) -> Result<Posting>
where
    C: ConnectionTrait,
{
    validate_amount(entry.amount)?;

    let result = User::update_many()
        .col_expr(
            user::Column::Points,
            Expr::col(user::Column::Points).add(entry.amount),
        )
        .filter(user::Column::Id.eq(entry.user_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::UserNotFound { id: entry.user_id });
    }

    let posting = append_entry(conn, &entry, entry.amount).await?;
    info!(
        "Credited {} points to user {} ({:?})",
        entry.amount, entry.user_id, entry.kind
    );
    Ok(posting)
}

/// Debits points in its own transaction.
///
/// # Errors
/// Returns an error if:
/// - The amount is zero or negative
/// - The user does not exist
/// - The balance is lower than the amount
/// - The idempotency key belongs to another user or another movement
/// - The database operation fails
pub async fn debit(db: &DatabaseConnection, entry: PointsEntry) -> Result<Posting> {
    post(db, entry, Direction::Debit).await
}

/// Debits points using an existing connection or transaction.
///
/// The balance check and the decrement are one statement, so two concurrent
/// debits can never both pass the check on the same points. Idempotency keys
/// are handled as in [`credit_in`].
#[instrument(skip(conn, entry), fields(user_id = entry.user_id, amount = entry.amount))]
pub async fn debit_in<C>(conn: &C, entry: PointsEntry) -> Result<Posting>
where
    C: ConnectionTrait,
{
    validate_amount(entry.amount)?;

    let result = User::update_many()
        .col_expr(
            user::Column::Points,
            Expr::col(user::Column::Points).sub(entry.amount),
        )
        .filter(user::Column::Id.eq(entry.user_id))
        .filter(user::Column::Points.gte(entry.amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let current = get_balance(conn, entry.user_id).await?;
        return Err(Error::InsufficientBalance {
            current,
            required: entry.amount,
        });
    }

    let posting = append_entry(conn, &entry, -entry.amount).await?;
    info!(
        "Debited {} points from user {} ({:?})",
        entry.amount, entry.user_id, entry.kind
    );
    Ok(posting)
}

/// Runs one movement in its own transaction, replaying keyed retries.
async fn post(db: &DatabaseConnection, entry: PointsEntry, direction: Direction) -> Result<Posting> {
    validate_amount(entry.amount)?;

    if let Some(posting) = find_replay(db, &entry, direction).await? {
        return Ok(posting);
    }

    let txn = db.begin().await?;
    let outcome = match direction {
        Direction::Credit => credit_in(&txn, entry.clone()).await,
        Direction::Debit => debit_in(&txn, entry.clone()).await,
    };

    match outcome {
        Ok(posting) => {
            txn.commit().await?;
            Ok(posting)
        }
        Err(err) => {
            txn.rollback().await?;
            // A concurrent request with the same key may have committed first
            let raced = matches!(
                err,
                Error::IdempotencyConflict | Error::InsufficientBalance { .. }
            );
            if raced {
                if let Some(posting) = find_replay(db, &entry, direction).await? {
                    return Ok(posting);
                }
            }
            Err(err)
        }
    }
}

/// Returns the user's current balance.
///
/// # Errors
/// Returns an error if the user does not exist or the query fails.
pub async fn get_balance<C>(conn: &C, user_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(conn)
        .await?
        .map(|user| user.points)
        .ok_or(Error::UserNotFound { id: user_id })
}

/// Converts points into a discount at a fixed 1:1 rate.
///
/// # Arguments
/// * `user_id` - Account to debit
/// * `points` - Number of points to redeem, must be positive
/// * `booking_id` - Booking the discount applies to, stored as the ledger reference
/// * `idempotency_key` - Optional retry key
///
/// # Errors
/// Returns `InvalidAmount` for zero or negative points, `InsufficientBalance`
/// when the balance cannot cover them, plus the errors of [`debit`].
pub async fn redeem(
    db: &DatabaseConnection,
    user_id: i64,
    points: i64,
    booking_id: Option<i64>,
    idempotency_key: Option<String>,
) -> Result<Redemption> {
    let mut entry = PointsEntry::new(
        user_id,
        points,
        PointsType::Purchase,
        format!("Redeemed {points} points for discount"),
    )
    .with_idempotency_key(idempotency_key);
    if let Some(booking_id) = booking_id {
        entry = entry.with_reference(booking_id.to_string());
    }

    let posting = debit(db, entry).await?;
    Ok(Redemption {
        discount: posting.entry.points.abs(),
        remaining_points: posting.balance,
        posting,
    })
}

/// Returns the balance and the newest [`HISTORY_LIMIT`] ledger entries.
///
/// # Errors
/// Returns an error if the user does not exist or the query fails.
pub async fn get_history(db: &DatabaseConnection, user_id: i64) -> Result<PointsHistoryView> {
    let current_points = get_balance(db, user_id).await?;
    let history = PointsHistory::find()
        .filter(points_history::Column::UserId.eq(user_id))
        .order_by_desc(points_history::Column::CreatedAt)
        .order_by_desc(points_history::Column::Id)
        .limit(HISTORY_LIMIT)
        .all(db)
        .await?;

    Ok(PointsHistoryView {
        current_points,
        history,
    })
}

/// Compares the stored balance with the sum of the ledger.
///
/// # Errors
/// Returns an error if the user does not exist or the query fails.
pub async fn audit_balance<C>(conn: &C, user_id: i64) -> Result<BalanceAudit>
where
    C: ConnectionTrait,
{
    let balance = get_balance(conn, user_id).await?;
    let amounts: Vec<i64> = PointsHistory::find()
        .select_only()
        .column(points_history::Column::Points)
        .filter(points_history::Column::UserId.eq(user_id))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(BalanceAudit {
        balance,
        ledger_total: amounts.iter().sum(),
    })
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Looks up an earlier posting carrying the same idempotency key.
///
/// The key only replays the exact same movement; reusing it for another user,
/// amount, direction or category is a conflict.
async fn find_replay<C>(conn: &C, entry: &PointsEntry, direction: Direction) -> Result<Option<Posting>>
where
    C: ConnectionTrait,
{
    let Some(key) = entry.idempotency_key.as_deref() else {
        return Ok(None);
    };

    let Some(existing) = PointsHistory::find()
        .filter(points_history::Column::IdempotencyKey.eq(key))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let same_movement = existing.user_id == entry.user_id
        && existing.points == direction.signed(entry.amount)
        && existing.kind == entry.kind;
    if !same_movement {
        return Err(Error::IdempotencyConflict);
    }

    let balance = get_balance(conn, entry.user_id).await?;
    info!(
        "Replaying points entry {} for idempotency key {}",
        existing.id, key
    );
    Ok(Some(Posting {
        entry: existing,
        balance,
        replayed: true,
    }))
}

async fn append_entry<C>(conn: &C, entry: &PointsEntry, signed_points: i64) -> Result<Posting>
where
    C: ConnectionTrait,
{
    let row = points_history::ActiveModel {
        user_id: Set(entry.user_id),
        points: Set(signed_points),
        kind: Set(entry.kind),
        description: Set(entry.description.clone()),
        reference: Set(entry.reference.clone()),
        idempotency_key: Set(entry.idempotency_key.clone()),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    // A concurrent request with the same key loses here and rolls back its balance change.
    let entry_model = row.insert(conn).await.map_err(|err| {
        if crate::errors::is_unique_violation(&err) {
            Error::IdempotencyConflict
        } else {
            err.into()
        }
    })?;
    let balance = get_balance(conn, entry.user_id).await?;

    Ok(Posting {
        entry: entry_model,
        balance,
        replayed: false,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amounts() -> Result<()> {
        let (db, user) = setup_with_user().await?;

        for amount in [0, -5] {
            let result =
                credit_in(&db, PointsEntry::new(user.id, amount, PointsType::ForumPost, "x")).await;
            assert!(matches!(result, Err(Error::InvalidAmount { amount: a }) if a == amount));
        }
        assert_eq!(get_balance(&db, user.id).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_credit_updates_balance_and_ledger() -> Result<()> {
        let (db, user) = setup_with_user().await?;

        let posting = credit(
            &db,
            PointsEntry::new(user.id, 5, PointsType::ForumPost, "Created a forum post")
                .with_reference("post-1"),
        )
        .await?;

        assert_eq!(posting.balance, 5);
        assert_eq!(posting.entry.points, 5);
        assert_eq!(posting.entry.kind, PointsType::ForumPost);
        assert_eq!(posting.entry.reference.as_deref(), Some("post-1"));
        assert!(!posting.replayed);
        assert_eq!(get_balance(&db, user.id).await?, 5);
        assert!(audit_balance(&db, user.id).await?.is_consistent());

        Ok(())
    }

    #[tokio::test]
    async fn test_credit_unknown_user() -> Result<()> {
        let db = setup_test_db().await?;

        let result = credit(&db, PointsEntry::new(42, 10, PointsType::StudyGroup, "x")).await;
        assert!(matches!(result, Err(Error::UserNotFound { id: 42 })));

        Ok(())
    }

    #[tokio::test]
    async fn test_debit_insufficient_balance_leaves_account_untouched() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        credit(&db, PointsEntry::new(user.id, 20, PointsType::StudyGroup, "x")).await?;

        let result = debit(&db, PointsEntry::new(user.id, 21, PointsType::Purchase, "y")).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance {
                current: 20,
                required: 21
            })
        ));

        let audit = audit_balance(&db, user.id).await?;
        assert_eq!(audit.balance, 20);
        assert!(audit.is_consistent());

        Ok(())
    }

    #[tokio::test]
    async fn test_redeem_with_zero_balance_fails() -> Result<()> {
        let (db, user) = setup_with_user().await?;

        let result = redeem(&db, user.id, 50, None, None).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientBalance {
                current: 0,
                required: 50
            })
        ));
        assert_eq!(get_balance(&db, user.id).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_redeem_rejects_zero_and_negative_points() -> Result<()> {
        let (db, user) = setup_with_user().await?;

        assert!(matches!(
            redeem(&db, user.id, 0, None, None).await,
            Err(Error::InvalidAmount { amount: 0 })
        ));
        assert!(matches!(
            redeem(&db, user.id, -10, None, None).await,
            Err(Error::InvalidAmount { amount: -10 })
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_redeem_returns_one_to_one_discount() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        credit(&db, PointsEntry::new(user.id, 120, PointsType::Referral, "bonus")).await?;

        let redemption = redeem(&db, user.id, 70, Some(9), None).await?;

        assert_eq!(redemption.discount, 70);
        assert_eq!(redemption.remaining_points, 50);
        assert_eq!(redemption.posting.entry.points, -70);
        assert_eq!(redemption.posting.entry.kind, PointsType::Purchase);
        assert_eq!(redemption.posting.entry.reference.as_deref(), Some("9"));
        assert_eq!(
            redemption.posting.entry.description,
            "Redeemed 70 points for discount"
        );
        assert!(audit_balance(&db, user.id).await?.is_consistent());

        Ok(())
    }

    #[tokio::test]
    async fn test_redeem_with_idempotency_key_applies_once() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        credit(&db, PointsEntry::new(user.id, 100, PointsType::Referral, "bonus")).await?;

        let first = redeem(&db, user.id, 40, None, Some("req-1".to_string())).await?;
        let second = redeem(&db, user.id, 40, None, Some("req-1".to_string())).await?;

        assert!(!first.posting.replayed);
        assert!(second.posting.replayed);
        assert_eq!(first.posting.entry.id, second.posting.entry.id);
        assert_eq!(get_balance(&db, user.id).await?, 60);
        assert!(audit_balance(&db, user.id).await?.is_consistent());

        Ok(())
    }

    #[tokio::test]
    async fn test_reused_key_for_another_movement_conflicts() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        credit(&db, PointsEntry::new(user.id, 100, PointsType::Referral, "bonus")).await?;
        redeem(&db, user.id, 40, None, Some("req-1".to_string())).await?;

        let other_amount = redeem(&db, user.id, 30, None, Some("req-1".to_string())).await;
        assert!(matches!(other_amount, Err(Error::IdempotencyConflict)));

        let other_kind = debit(
            &db,
            PointsEntry::new(user.id, 40, PointsType::ForumPost, "x")
                .with_idempotency_key(Some("req-1".to_string())),
        )
        .await;
        assert!(matches!(other_kind, Err(Error::IdempotencyConflict)));

        let other_direction = credit(
            &db,
            PointsEntry::new(user.id, 40, PointsType::Purchase, "x")
                .with_idempotency_key(Some("req-1".to_string())),
        )
        .await;
        assert!(matches!(other_direction, Err(Error::IdempotencyConflict)));

        let audit = audit_balance(&db, user.id).await?;
        assert_eq!(audit.balance, 60);
        assert!(audit.is_consistent());

        Ok(())
    }

    #[tokio::test]
    async fn test_idempotency_key_cannot_cross_users() -> Result<()> {
        let db = setup_test_db().await?;
        let alice = create_test_user(&db, "Alice Smith").await?;
        let bob = create_test_user(&db, "Bob Jones").await?;
        credit(&db, PointsEntry::new(alice.id, 10, PointsType::ForumPost, "x")).await?;
        credit(&db, PointsEntry::new(bob.id, 10, PointsType::ForumPost, "x")).await?;

        redeem(&db, alice.id, 5, None, Some("shared".to_string())).await?;
        let result = redeem(&db, bob.id, 5, None, Some("shared".to_string())).await;

        assert!(matches!(result, Err(Error::IdempotencyConflict)));
        assert_eq!(get_balance(&db, bob.id).await?, 10);

        Ok(())
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_capped() -> Result<()> {
        let (db, user) = setup_with_user().await?;
        for i in 0..55 {
            credit(
                &db,
                PointsEntry::new(user.id, 1, PointsType::ForumPost, format!("post {i}")),
            )
            .await?;
        }

        let view = get_history(&db, user.id).await?;

        assert_eq!(view.current_points, 55);
        assert_eq!(view.history.len(), 50);
        assert_eq!(view.history[0].description, "post 54");

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_never_overdraw() -> Result<()> {
        let (db, _dir) = setup_file_db(10).await?;
        let user = create_test_user(&db, "Alice Smith").await?;
        credit(&db, PointsEntry::new(user.id, 100, PointsType::Referral, "bonus")).await?;

        let user_id = user.id;
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let db = db.clone();
            tasks.spawn(async move { redeem(&db, user_id, 30, None, None).await });
        }

        let mut succeeded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::InsufficientBalance { .. }) => {}
                Err(other) => return Err(other),
            }
        }

        assert_eq!(succeeded, 3);
        let audit = audit_balance(&db, user.id).await?;
        assert_eq!(audit.balance, 10);
        assert!(audit.is_consistent());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_retries_with_one_key_apply_once() -> Result<()> {
        let (db, _dir) = setup_file_db(10).await?;
        let user = create_test_user(&db, "Alice Smith").await?;
        credit(&db, PointsEntry::new(user.id, 100, PointsType::Referral, "bonus")).await?;

        let user_id = user.id;
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..6 {
            let db = db.clone();
            tasks.spawn(async move {
                redeem(&db, user_id, 40, None, Some("checkout-7".to_string())).await
            });
        }

        let mut entry_ids = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            entry_ids.push(joined.unwrap()?.posting.entry.id);
        }
        entry_ids.dedup();
        assert_eq!(entry_ids.len(), 1);

        let audit = audit_balance(&db, user.id).await?;
        assert_eq!(audit.balance, 60);
        assert!(audit.is_consistent());

        Ok(())
    }
}
