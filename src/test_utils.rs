//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test users and mentors with sensible defaults.

use crate::{
    config::database,
    entities::{mentor, user, user::UserRole},
    errors::Result,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tempfile::TempDir;

/// Password hash stored for fixtures that never log in.
pub const UNUSABLE_PASSWORD_HASH: &str = "!";

/// Creates an in-memory `SQLite` database with all tables initialized.
///
/// Each `sqlite::memory:` connection is its own database, so the pool holds one
/// connection. Tests that need real concurrency use [`setup_file_db`].
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = database::connect("sqlite::memory:", 1).await?;
    database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database in a temp directory, pooled over
/// `max_connections` connections.
///
/// The directory is deleted when the returned guard drops, so keep it alive for
/// the whole test.
pub async fn setup_file_db(max_connections: u32) -> Result<(DatabaseConnection, TempDir)> {
    let dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("pathfinder.sqlite").display()
    );
    let db = database::connect(&url, max_connections).await?;
    database::create_tables(&db).await?;
    Ok((db, dir))
}

/// Inserts a student with zero points and no referral code.
///
/// # Defaults
/// * `email`: derived from the name, e.g. `alice.smith@example.com`
/// * `grade`: None
pub async fn create_test_user(db: &DatabaseConnection, full_name: &str) -> Result<user::Model> {
    create_custom_user(db, full_name, None).await
}

/// Inserts a student with a specific grade.
pub async fn create_custom_user(
    db: &DatabaseConnection,
    full_name: &str,
    grade: Option<&str>,
) -> Result<user::Model> {
    let email = format!(
        "{}@example.com",
        full_name.to_lowercase().replace(' ', ".")
    );
    let model = user::ActiveModel {
        email: Set(email),
        password_hash: Set(UNUSABLE_PASSWORD_HASH.to_string()),
        full_name: Set(full_name.to_string()),
        role: Set(UserRole::Student),
        phone: Set(None),
        city: Set(None),
        grade: Set(grade.map(ToString::to_string)),
        school: Set(None),
        points: Set(0),
        referral_code: Set(None),
        referred_by: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Inserts a mentor with the given price and no sessions.
pub async fn create_test_mentor(
    db: &DatabaseConnection,
    name: &str,
    price: i64,
) -> Result<mentor::Model> {
    let model = mentor::ActiveModel {
        email: Set(format!(
            "{}@mentors.example.com",
            name.to_lowercase().replace(' ', ".")
        )),
        password_hash: Set(UNUSABLE_PASSWORD_HASH.to_string()),
        name: Set(name.to_string()),
        title: Set(Some("Senior Engineer".to_string())),
        company: Set(None),
        price: Set(price),
        sessions_count: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Sets up a database with one student.
pub async fn setup_with_user() -> Result<(DatabaseConnection, user::Model)> {
    let db = setup_test_db().await?;
    let user = create_test_user(&db, "Alice Smith").await?;
    Ok((db, user))
}

/// Sets up a database with one student and one mentor priced at 500.
pub async fn setup_with_mentor() -> Result<(DatabaseConnection, user::Model, mentor::Model)> {
    let (db, user) = setup_with_user().await?;
    let mentor = create_test_mentor(&db, "Maya Rao", 500).await?;
    Ok((db, user, mentor))
}
