//! Identity store - Student and mentor accounts, credentials and lookups.
//!
//! Passwords are stored as Argon2 PHC strings. A student signup that carries a
//! referral code applies it in the same transaction as the insert, so a bad code
//! leaves no half-registered account behind.

use crate::{
    core::referral,
    entities::{Mentor, User, mentor, user, user::UserRole},
    errors::{Error, Result, is_unique_violation},
};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::rngs::OsRng;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Session price used when a mentor signs up without one.
pub const DEFAULT_MENTOR_PRICE: i64 = 2000;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Student registration input.
#[derive(Debug, Clone, Default)]
pub struct StudentSignup {
    /// Login email
    pub email: String,
    /// Plain-text password, hashed before storage
    pub password: String,
    /// Display name
    pub full_name: String,
    /// Optional phone
    pub phone: Option<String>,
    /// Optional city
    pub city: Option<String>,
    /// Optional school grade
    pub grade: Option<String>,
    /// Optional school
    pub school: Option<String>,
    /// Code of the user who referred this student
    pub referral_code: Option<String>,
}

/// Mentor registration input.
#[derive(Debug, Clone, Default)]
pub struct MentorSignup {
    /// Login email
    pub email: String,
    /// Plain-text password, hashed before storage
    pub password: String,
    /// Display name
    pub name: String,
    /// Job title
    pub title: Option<String>,
    /// Employer
    pub company: Option<String>,
    /// Session price, [`DEFAULT_MENTOR_PRICE`] when absent
    pub price: Option<i64>,
}

/// Hashes a password into a PHC string.
///
/// # Errors
/// Returns `PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::PasswordHash {
            message: e.to_string(),
        })
}

/// Checks a password against a stored PHC string. Unparseable hashes never match.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Registers a student, applying their referral code if one was given.
///
/// # Errors
/// Returns an error if:
/// - Email, password or name is invalid
/// - The email is already registered (`EmailTaken`)
/// - The referral code is rejected (see [`referral::apply_code`])
/// - The database operation fails
pub async fn signup_student(db: &DatabaseConnection, signup: StudentSignup) -> Result<user::Model> {
    let email = normalize_email(&signup.email);
    validate_credentials(&email, &signup.password)?;
    let full_name = required(&signup.full_name, "Full name")?;
    let password_hash = hash_password(&signup.password)?;

    let txn = db.begin().await?;
    match register_student_in(&txn, email, password_hash, full_name, signup).await {
        Ok(created) => {
            txn.commit().await?;
            info!("Student {} signed up", created.id);
            Ok(created)
        }
        Err(err) => {
            txn.rollback().await?;
            Err(err)
        }
    }
}

/// Inserts the student, then applies the referral code. The insert is the
/// first statement, and the unique email column reports a taken address.
async fn register_student_in<C>(
    conn: &C,
    email: String,
    password_hash: String,
    full_name: String,
    signup: StudentSignup,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let created = user::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        full_name: Set(full_name),
        role: Set(UserRole::Student),
        phone: Set(signup.phone),
        city: Set(signup.city),
        grade: Set(signup.grade),
        school: Set(signup.school),
        points: Set(0),
        referral_code: Set(None),
        referred_by: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(email_conflict)?;

    match signup.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            referral::apply_code_in(conn, code, created.id).await?;
            find_user_in(conn, created.id).await
        }
        _ => Ok(created),
    }
}

/// Registers a mentor.
///
/// # Errors
/// Returns an error if:
/// - Email, password or name is invalid, or the price is negative
/// - The email is already registered (`EmailTaken`)
/// - The database operation fails
pub async fn signup_mentor(db: &DatabaseConnection, signup: MentorSignup) -> Result<mentor::Model> {
    let email = normalize_email(&signup.email);
    validate_credentials(&email, &signup.password)?;
    let name = required(&signup.name, "Name")?;
    let price = signup.price.unwrap_or(DEFAULT_MENTOR_PRICE);
    if price < 0 {
        return Err(Error::InvalidAmount { amount: price });
    }
    let password_hash = hash_password(&signup.password)?;

    let taken = Mentor::find()
        .filter(mentor::Column::Email.eq(email.as_str()))
        .one(db)
        .await?
        .is_some();
    if taken {
        return Err(Error::EmailTaken);
    }

    let created = mentor::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        name: Set(name),
        title: Set(signup.title),
        company: Set(signup.company),
        price: Set(price),
        sessions_count: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(email_conflict)?;

    info!("Mentor {} signed up", created.id);
    Ok(created)
}

/// Authenticates a student.
///
/// # Errors
/// Returns `InvalidCredentials` for an unknown email or wrong password.
pub async fn login_student(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<user::Model> {
    let found = User::find()
        .filter(user::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?;
    match found {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(Error::InvalidCredentials),
    }
}

/// Authenticates a mentor.
///
/// # Errors
/// Returns `InvalidCredentials` for an unknown email or wrong password.
pub async fn login_mentor(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<mentor::Model> {
    let found = Mentor::find()
        .filter(mentor::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?;
    match found {
        Some(mentor) if verify_password(password, &mentor.password_hash) => Ok(mentor),
        _ => Err(Error::InvalidCredentials),
    }
}

/// Looks up a student by id.
///
/// # Errors
/// Returns `UserNotFound` if the student does not exist.
pub async fn find_user(db: &DatabaseConnection, user_id: i64) -> Result<user::Model> {
    find_user_in(db, user_id).await
}

async fn find_user_in<C>(conn: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(Error::UserNotFound { id: user_id })
}

/// Looks up a mentor by id.
///
/// # Errors
/// Returns `MentorNotFound` if the mentor does not exist.
pub async fn find_mentor(db: &DatabaseConnection, mentor_id: i64) -> Result<mentor::Model> {
    Mentor::find_by_id(mentor_id)
        .one(db)
        .await?
        .ok_or(Error::MentorNotFound { id: mentor_id })
}

/// Lists all mentors by name.
///
/// # Errors
/// Returns an error if the database operation fails.
pub async fn list_mentors(db: &DatabaseConnection) -> Result<Vec<mentor::Model>> {
    Ok(Mentor::find()
        .order_by_asc(mentor::Column::Name)
        .order_by_asc(mentor::Column::Id)
        .all(db)
        .await?)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(Error::Validation {
            message: "A valid email is required".to_string(),
        });
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation {
            message: format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation {
            message: format!("{field} is required"),
        });
    }
    Ok(value.to_string())
}

fn email_conflict(err: DbErr) -> Error {
    if is_unique_violation(&err) {
        Error::EmailTaken
    } else {
        err.into()
    }
}
