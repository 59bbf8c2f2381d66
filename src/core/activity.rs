//! Activity log - Dashboard feed entries recorded alongside core mutations.

use crate::{
    entities::{Activity, activity},
    errors::Result,
};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use tracing::warn;

/// Number of entries returned by [`list_for_user`].
pub const FEED_LIMIT: u64 = 20;

/// Activity kind written when a session is booked.
pub const SESSION_BOOKING: &str = "session_booking";

/// Appends an activity entry for a user.
///
/// # Errors
/// Returns an error if the database operation fails.
pub async fn record<C>(
    conn: &C,
    user_id: i64,
    kind: &str,
    title: &str,
    description: String,
) -> Result<activity::Model>
where
    C: ConnectionTrait,
{
    let entry = activity::ActiveModel {
        user_id: Set(user_id),
        kind: Set(kind.to_string()),
        title: Set(title.to_string()),
        description: Set(description),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(entry.insert(conn).await?)
}

/// Like [`record`], but a failure is only logged.
pub async fn record_best_effort(
    db: &DatabaseConnection,
    user_id: i64,
    kind: &str,
    title: &str,
    description: String,
) {
    if let Err(e) = record(db, user_id, kind, title, description).await {
        warn!("Failed to record {} activity for user {}: {}", kind, user_id, e);
    }
}

/// Returns the user's newest [`FEED_LIMIT`] entries.
///
/// # Errors
/// Returns an error if the database operation fails.
pub async fn list_for_user(db: &DatabaseConnection, user_id: i64) -> Result<Vec<activity::Model>> {
    Ok(Activity::find()
        .filter(activity::Column::UserId.eq(user_id))
        .order_by_desc(activity::Column::CreatedAt)
        .order_by_desc(activity::Column::Id)
        .limit(FEED_LIMIT)
        .all(db)
        .await?)
}
