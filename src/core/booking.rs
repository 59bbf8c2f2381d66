//! Booking workflow - Creating sessions and moving them through their lifecycle.
//!
//! A booking is inserted `CONFIRMED` and the mentor's `sessions_count` is bumped
//! with an atomic increment in the same transaction. Status changes are a
//! conditional UPDATE guarded by `status = 'CONFIRMED'`, so a booking reaches a
//! terminal state at most once even under concurrent PATCHes.

use crate::{
    core::{activity, referral},
    entities::{
        Booking, Mentor, User, booking, booking::BookingStatus, mentor, user,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Attempts at finding an unused order id before giving up.
const MAX_ORDER_ID_ATTEMPTS: usize = 5;

/// Input for [`create_booking`].
#[derive(Debug, Clone)]
pub struct NewBooking {
    /// Student making the booking
    pub user_id: i64,
    /// Mentor being booked
    pub mentor_id: i64,
    /// Day of the session
    pub date: NaiveDate,
    /// Time slot, e.g. "14:30"
    pub time: String,
    /// Session topic
    pub topic: String,
    /// Length in minutes
    pub duration: i32,
    /// Price paid
    pub amount: i64,
}

/// Changes requested by [`update_booking`]. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct BookingUpdate {
    /// New status; `None` keeps the current one
    pub status: Option<BookingStatus>,
    /// New day
    pub date: Option<NaiveDate>,
    /// New time slot
    pub time: Option<String>,
    /// New topic
    pub topic: Option<String>,
    /// New length in minutes
    pub duration: Option<i32>,
}

impl BookingUpdate {
    /// Whether any schedule field is being changed.
    #[must_use]
    pub const fn reschedules(&self) -> bool {
        self.date.is_some() || self.time.is_some() || self.topic.is_some() || self.duration.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.status.is_none() && !self.reschedules() {
            return Err(validation("Nothing to update"));
        }
        if let Some(duration) = self.duration {
            validate_duration(duration)?;
        }
        if self.time.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(validation("Time must not be empty"));
        }
        if self.topic.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(validation("Topic must not be empty"));
        }
        Ok(())
    }
}

/// A booking with the other party attached, as listed on dashboards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    /// The booking
    #[serde(flatten)]
    pub booking: booking::Model,
    /// Booked mentor, on student listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentor: Option<mentor::Model>,
    /// Booking student, on mentor listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<user::Model>,
}

/// Aggregates shown on the mentor dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Bookings ever created against the mentor
    pub total_sessions: i64,
    /// Confirmed bookings dated today or later
    pub upcoming_sessions: usize,
    /// Completed bookings
    pub completed_sessions: usize,
    /// Sum of completed booking amounts
    pub total_earnings: i64,
}

/// Mentor dashboard payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorDashboard {
    /// The mentor
    pub mentor: mentor::Model,
    /// Aggregates over the mentor's bookings
    pub stats: DashboardStats,
    /// All bookings with their students, newest first
    pub bookings: Vec<BookingDetails>,
}

/// Rejects any status change that does not start from `CONFIRMED`.
///
/// # Errors
/// Returns `InvalidTransition` when `from` is terminal.
pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Creates a `CONFIRMED` booking and counts it against the mentor.
///
/// After the booking commits, an activity entry is written and the student's
/// pending referral (if any) is completed. Failures in either are logged and do
/// not affect the returned booking.
///
/// # Errors
/// Returns an error if:
/// - Duration or amount is not positive, or time/topic is empty
/// - The mentor or student does not exist
/// - The database operation fails
#[instrument(skip(db, new), fields(user_id = new.user_id, mentor_id = new.mentor_id))]
pub async fn create_booking(db: &DatabaseConnection, new: NewBooking) -> Result<booking::Model> {
    validate_duration(new.duration)?;
    if new.amount <= 0 {
        return Err(Error::InvalidAmount { amount: new.amount });
    }
    if new.time.trim().is_empty() {
        return Err(validation("Time is required"));
    }
    if new.topic.trim().is_empty() {
        return Err(validation("Topic is required"));
    }

    let txn = db.begin().await?;
    let (created, mentor) = match insert_booking_in(&txn, &new).await {
        Ok(inserted) => inserted,
        Err(err) => {
            txn.rollback().await?;
            return Err(err);
        }
    };
    txn.commit().await?;
    info!(
        "Booking {} ({}) created for user {} with mentor {}",
        created.id, created.order_id, created.user_id, created.mentor_id
    );

    activity::record_best_effort(
        db,
        created.user_id,
        activity::SESSION_BOOKING,
        "Booked Mentor Session",
        format!("Booked session with {}", mentor.name),
    )
    .await;

    match referral::complete_if_pending(db, created.user_id).await {
        Ok(Some(completion)) => info!(
            "Booking {} completed referral {}",
            created.id, completion.referral.id
        ),
        Ok(None) => {}
        Err(e) => warn!(
            "Referral completion after booking {} failed: {}",
            created.id, e
        ),
    }

    Ok(created)
}

/// Counts the booking against the mentor, then inserts it.
///
/// The counter UPDATE is the first statement: `SQLite` cannot upgrade a
/// transaction that has already read to a writer while another writer is active.
async fn insert_booking_in<C>(conn: &C, new: &NewBooking) -> Result<(booking::Model, mentor::Model)>
where
    C: ConnectionTrait,
{
    let counted = Mentor::update_many()
        .col_expr(
            mentor::Column::SessionsCount,
            Expr::col(mentor::Column::SessionsCount).add(1),
        )
        .filter(mentor::Column::Id.eq(new.mentor_id))
        .exec(conn)
        .await?;
    if counted.rows_affected == 0 {
        return Err(Error::MentorNotFound { id: new.mentor_id });
    }

    let mentor = Mentor::find_by_id(new.mentor_id)
        .one(conn)
        .await?
        .ok_or(Error::MentorNotFound { id: new.mentor_id })?;
    User::find_by_id(new.user_id)
        .one(conn)
        .await?
        .ok_or(Error::UserNotFound { id: new.user_id })?;

    let order_id = unused_order_id(conn).await?;
    let now = chrono::Utc::now();
    let created = booking::ActiveModel {
        user_id: Set(new.user_id),
        mentor_id: Set(new.mentor_id),
        date: Set(new.date),
        time: Set(new.time.trim().to_string()),
        topic: Set(new.topic.trim().to_string()),
        duration: Set(new.duration),
        amount: Set(new.amount),
        order_id: Set(order_id),
        status: Set(BookingStatus::Confirmed),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    Ok((created, mentor))
}

/// Fetches one booking.
///
/// # Errors
/// Returns `BookingNotFound` if it does not exist.
pub async fn get_booking(db: &DatabaseConnection, booking_id: i64) -> Result<booking::Model> {
    Booking::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or(Error::BookingNotFound { id: booking_id })
}

/// Applies a status change and/or reschedule.
///
/// Rescheduling keeps the booking `CONFIRMED`; closing it moves it to
/// `COMPLETED` or `CANCELLED`. The two cannot be combined in one call.
///
/// # Errors
/// Returns an error if:
/// - The booking does not exist
/// - The booking is already `COMPLETED` or `CANCELLED` (`InvalidTransition`)
/// - The update is empty or carries invalid fields
/// - The database operation fails
#[instrument(skip(db, update))]
pub async fn update_booking(
    db: &DatabaseConnection,
    booking_id: i64,
    update: BookingUpdate,
) -> Result<booking::Model> {
    update.validate()?;

    // Without a status change the booking stays CONFIRMED
    let target = update.status.unwrap_or(BookingStatus::Confirmed);
    if target.is_terminal() && update.reschedules() {
        return Err(validation(
            "A booking cannot be rescheduled and closed in the same update",
        ));
    }

    let mut statement = Booking::update_many()
        .col_expr(booking::Column::Status, Expr::value(target))
        .col_expr(booking::Column::UpdatedAt, Expr::value(chrono::Utc::now()));
    if let Some(date) = update.date {
        statement = statement.col_expr(booking::Column::Date, Expr::value(date));
    }
    if let Some(time) = update.time {
        statement = statement.col_expr(booking::Column::Time, Expr::value(time.trim().to_string()));
    }
    if let Some(topic) = update.topic {
        statement =
            statement.col_expr(booking::Column::Topic, Expr::value(topic.trim().to_string()));
    }
    if let Some(duration) = update.duration {
        statement = statement.col_expr(booking::Column::Duration, Expr::value(duration));
    }

    let result = statement
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.eq(BookingStatus::Confirmed))
        .exec(db)
        .await?;

    let updated = get_booking(db, booking_id).await?;
    if result.rows_affected == 0 {
        // Already closed, earlier or by a concurrent update
        check_transition(updated.status, target)?;
    }

    info!("Booking {} is now {}", booking_id, updated.status);
    Ok(updated)
}

/// Lists a student's bookings with their mentors, newest first.
///
/// # Errors
/// Returns an error if the database operation fails.
pub async fn list_for_user(db: &DatabaseConnection, user_id: i64) -> Result<Vec<BookingDetails>> {
    let rows = Booking::find()
        .filter(booking::Column::UserId.eq(user_id))
        .order_by_desc(booking::Column::CreatedAt)
        .order_by_desc(booking::Column::Id)
        .find_also_related(Mentor)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(booking, mentor)| BookingDetails {
            booking,
            mentor,
            user: None,
        })
        .collect())
}

/// Lists a mentor's bookings with their students, newest first.
///
/// # Errors
/// Returns an error if the database operation fails.
pub async fn list_for_mentor(
    db: &DatabaseConnection,
    mentor_id: i64,
) -> Result<Vec<BookingDetails>> {
    let rows = Booking::find()
        .filter(booking::Column::MentorId.eq(mentor_id))
        .order_by_desc(booking::Column::CreatedAt)
        .order_by_desc(booking::Column::Id)
        .find_also_related(User)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(booking, user)| BookingDetails {
            booking,
            mentor: None,
            user,
        })
        .collect())
}

/// Builds the mentor dashboard.
///
/// # Errors
/// Returns `MentorNotFound` if the mentor does not exist.
pub async fn mentor_dashboard(db: &DatabaseConnection, mentor_id: i64) -> Result<MentorDashboard> {
    let mentor = Mentor::find_by_id(mentor_id)
        .one(db)
        .await?
        .ok_or(Error::MentorNotFound { id: mentor_id })?;
    let bookings = list_for_mentor(db, mentor_id).await?;

    let today = chrono::Utc::now().date_naive();
    let upcoming_sessions = bookings
        .iter()
        .filter(|b| b.booking.status == BookingStatus::Confirmed && b.booking.date >= today)
        .count();
    let completed: Vec<&booking::Model> = bookings
        .iter()
        .map(|b| &b.booking)
        .filter(|b| b.status == BookingStatus::Completed)
        .collect();

    let stats = DashboardStats {
        total_sessions: mentor.sessions_count,
        upcoming_sessions,
        completed_sessions: completed.len(),
        total_earnings: completed.iter().map(|b| b.amount).sum(),
    };

    Ok(MentorDashboard {
        mentor,
        stats,
        bookings,
    })
}

/// Picks an `ORD<millis><6 digits>` id that no booking uses yet.
async fn unused_order_id<C>(conn: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    use rand::Rng;

    for _ in 0..MAX_ORDER_ID_ATTEMPTS {
        let candidate = {
            let suffix: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
            format!("ORD{}{suffix}", chrono::Utc::now().timestamp_millis())
        };
        let taken = Booking::find()
            .filter(booking::Column::OrderId.eq(candidate.as_str()))
            .one(conn)
            .await?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
    }

    Err(Error::OrderIdExhausted {
        attempts: MAX_ORDER_ID_ATTEMPTS,
    })
}

fn validate_duration(duration: i32) -> Result<()> {
    if duration <= 0 {
        return Err(validation("Duration must be a positive number of minutes"));
    }
    Ok(())
}

fn validation(message: &str) -> Error {
    Error::Validation {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{points, referral::REFERRAL_REWARD_POINTS},
        entities::{Activity, Referral, referral::ReferralStatus},
        test_utils::*,
    };
    use sea_orm::IntoActiveModel;

    fn session(user_id: i64, mentor_id: i64) -> NewBooking {
        NewBooking {
            user_id,
            mentor_id,
            date: chrono::Utc::now().date_naive() + chrono::Duration::days(7),
            time: "14:30".to_string(),
            topic: "System design interview prep".to_string(),
            duration: 60,
            amount: 500,
        }
    }

    async fn mentor_sessions(db: &DatabaseConnection, mentor_id: i64) -> Result<i64> {
        Ok(Mentor::find_by_id(mentor_id)
            .one(db)
            .await?
            .unwrap()
            .sessions_count)
    }

    #[tokio::test]
    async fn test_create_booking_confirms_and_counts() -> Result<()> {
        let (db, user, mentor) = setup_with_mentor().await?;

        let booking = create_booking(&db, session(user.id, mentor.id)).await?;

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.amount, 500);
        assert_eq!(booking.duration, 60);
        let digits = booking.order_id.strip_prefix("ORD").unwrap();
        assert!(!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(mentor_sessions(&db, mentor.id).await?, 1);

        let feed = Activity::find().all(&db).await?;
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, activity::SESSION_BOOKING);
        assert_eq!(feed[0].description, "Booked session with Maya Rao");

        Ok(())
    }

    #[tokio::test]
    async fn test_create_booking_validation() -> Result<()> {
        let (db, user, mentor) = setup_with_mentor().await?;

        let mut zero_duration = session(user.id, mentor.id);
        zero_duration.duration = 0;
        assert!(matches!(
            create_booking(&db, zero_duration).await,
            Err(Error::Validation { .. })
        ));

        let mut negative_amount = session(user.id, mentor.id);
        negative_amount.amount = -5;
        assert!(matches!(
            create_booking(&db, negative_amount).await,
            Err(Error::InvalidAmount { amount: -5 })
        ));

        assert!(matches!(
            create_booking(&db, session(user.id, 999)).await,
            Err(Error::MentorNotFound { id: 999 })
        ));
        assert!(matches!(
            create_booking(&db, session(999, mentor.id)).await,
            Err(Error::UserNotFound { id: 999 })
        ));

        assert_eq!(mentor_sessions(&db, mentor.id).await?, 0);
        assert!(Booking::find().all(&db).await?.is_empty());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bookings_count_once_each() -> Result<()> {
        let (db, _dir) = setup_file_db(10).await?;
        let user = create_test_user(&db, "Alice Smith").await?;
        let maya = create_test_mentor(&db, "Maya Rao", 500).await?;
        let arjun = create_test_mentor(&db, "Arjun Mehta", 800).await?;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let db = db.clone();
            let mentor_id = if i % 2 == 0 { maya.id } else { arjun.id };
            let user_id = user.id;
            tasks.spawn(async move { create_booking(&db, session(user_id, mentor_id)).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap()?;
        }

        for mentor_id in [maya.id, arjun.id] {
            assert_eq!(mentor_sessions(&db, mentor_id).await?, 10);
            assert_eq!(list_for_mentor(&db, mentor_id).await?.len(), 10);
        }
        let mut order_ids: Vec<String> = Booking::find()
            .all(&db)
            .await?
            .into_iter()
            .map(|b| b.order_id)
            .collect();
        order_ids.sort();
        order_ids.dedup();
        assert_eq!(order_ids.len(), 20);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_changes_close_once() -> Result<()> {
        let (db, _dir) = setup_file_db(10).await?;
        let user = create_test_user(&db, "Alice Smith").await?;
        let mentor = create_test_mentor(&db, "Maya Rao", 500).await?;
        let booking_id = create_booking(&db, session(user.id, mentor.id)).await?.id;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let db = db.clone();
            let status = if i % 2 == 0 {
                BookingStatus::Completed
            } else {
                BookingStatus::Cancelled
            };
            tasks.spawn(async move {
                update_booking(
                    &db,
                    booking_id,
                    BookingUpdate {
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await
            });
        }

        let mut closed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(_) => closed += 1,
                Err(Error::InvalidTransition { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        assert_eq!(closed, 1);
        assert!(get_booking(&db, booking_id).await?.status.is_terminal());

        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_bookings_reject_changes() -> Result<()> {
        let (db, user, mentor) = setup_with_mentor().await?;
        let booking = create_booking(&db, session(user.id, mentor.id)).await?;

        let cancelled = update_booking(
            &db,
            booking.id,
            BookingUpdate {
                status: Some(BookingStatus::Cancelled),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let result = update_booking(
            &db,
            booking.id,
            BookingUpdate {
                status: Some(BookingStatus::Completed),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::InvalidTransition {
                from: BookingStatus::Cancelled,
                to: BookingStatus::Completed,
            })
        ));

        let reschedule = update_booking(
            &db,
            booking.id,
            BookingUpdate {
                time: Some("09:00".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(reschedule, Err(Error::InvalidTransition { .. })));

        // Cancelling keeps the session count
        assert_eq!(mentor_sessions(&db, mentor.id).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_reschedule_keeps_booking_confirmed() -> Result<()> {
        let (db, user, mentor) = setup_with_mentor().await?;
        let booking = create_booking(&db, session(user.id, mentor.id)).await?;
        let new_date = booking.date + chrono::Duration::days(1);

        let moved = update_booking(
            &db,
            booking.id,
            BookingUpdate {
                date: Some(new_date),
                time: Some("10:00".to_string()),
                duration: Some(90),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(moved.status, BookingStatus::Confirmed);
        assert_eq!(moved.date, new_date);
        assert_eq!(moved.time, "10:00");
        assert_eq!(moved.duration, 90);
        assert_eq!(moved.topic, booking.topic);

        let closing_and_moving = update_booking(
            &db,
            booking.id,
            BookingUpdate {
                status: Some(BookingStatus::Completed),
                time: Some("11:00".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(closing_and_moving, Err(Error::Validation { .. })));

        let empty = update_booking(&db, booking.id, BookingUpdate::default()).await;
        assert!(matches!(empty, Err(Error::Validation { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_update_missing_booking() -> Result<()> {
        let db = setup_test_db().await?;
        let result = update_booking(
            &db,
            77,
            BookingUpdate {
                status: Some(BookingStatus::Completed),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::BookingNotFound { id: 77 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_booking_completes_referral() -> Result<()> {
        let (db, referrer, mentor) = setup_with_mentor().await?;
        let friend = create_test_user(&db, "Bob Jones").await?;

        let mut active = referrer.clone().into_active_model();
        active.referral_code = Set(Some("ALIC15123".to_string()));
        active.update(&db).await?;
        referral::apply_code(&db, "ALIC15123", friend.id).await?;

        create_booking(&db, session(friend.id, mentor.id)).await?;
        create_booking(&db, session(friend.id, mentor.id)).await?;

        let row = Referral::find().one(&db).await?.unwrap();
        assert_eq!(row.status, ReferralStatus::Completed);
        assert_eq!(
            points::get_balance(&db, referrer.id).await?,
            REFERRAL_REWARD_POINTS
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_listings_and_dashboard() -> Result<()> {
        let (db, user, mentor) = setup_with_mentor().await?;
        let first = create_booking(&db, session(user.id, mentor.id)).await?;
        let second = create_booking(&db, session(user.id, mentor.id)).await?;
        update_booking(
            &db,
            first.id,
            BookingUpdate {
                status: Some(BookingStatus::Completed),
                ..Default::default()
            },
        )
        .await?;

        let mine = list_for_user(&db, user.id).await?;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].booking.id, second.id);
        assert_eq!(mine[0].mentor.as_ref().map(|m| m.id), Some(mentor.id));

        let dashboard = mentor_dashboard(&db, mentor.id).await?;
        assert_eq!(
            dashboard.stats,
            DashboardStats {
                total_sessions: 2,
                upcoming_sessions: 1,
                completed_sessions: 1,
                total_earnings: 500,
            }
        );
        assert_eq!(
            dashboard.bookings[0].user.as_ref().map(|u| u.id),
            Some(user.id)
        );

        assert!(matches!(
            mentor_dashboard(&db, 404).await,
            Err(Error::MentorNotFound { id: 404 })
        ));

        Ok(())
    }
}
