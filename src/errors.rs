//! Unified error type for the ledger, booking and HTTP layers.
//!
//! Every business-rule violation has its own variant so callers can match on it;
//! [`Error::kind`] folds the variants into the coarse taxonomy the HTTP layer
//! turns into status codes.

use crate::entities::booking::BookingStatus;
use thiserror::Error;

/// Coarse classification of an [`Error`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input
    Validation,
    /// A referenced entity does not exist
    NotFound,
    /// The request collides with existing state (duplicates, replays, self-referral)
    Conflict,
    /// The points balance cannot cover a debit
    InsufficientBalance,
    /// A booking status change that the state machine forbids
    InvalidTransition,
    /// No valid credentials were presented
    Unauthorized,
    /// Credentials are valid but do not grant access to the resource
    Forbidden,
    /// Anything unexpected (database down, hashing failure, ...)
    Internal,
}

/// All errors produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("Invalid amount: {amount}. Amount must be a positive integer")]
    InvalidAmount { amount: i64 },

    #[error("User not found: {id}")]
    UserNotFound { id: i64 },

    #[error("Mentor not found: {id}")]
    MentorNotFound { id: i64 },

    #[error("Booking not found: {id}")]
    BookingNotFound { id: i64 },

    #[error("Invalid referral code: {code}")]
    InvalidReferralCode { code: String },

    #[error("Cannot refer yourself")]
    SelfReferral,

    #[error("Referral already exists for this pair of users")]
    DuplicateReferral,

    #[error("User {id} has already been referred")]
    AlreadyReferred { id: i64 },

    #[error("No referral found for user {id}")]
    NoReferralFound { id: i64 },

    #[error("Referral already completed")]
    AlreadyCompleted,

    #[error("Could not allocate a unique referral code after {attempts} attempts")]
    ReferralCodeExhausted { attempts: usize },

    #[error("Could not allocate a unique order id after {attempts} attempts")]
    OrderIdExhausted { attempts: usize },

    #[error("Insufficient points: balance {current}, required {required}")]
    InsufficientBalance { current: i64, required: i64 },

    #[error("Idempotency key already used by another request")]
    IdempotencyConflict,

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Email already exists")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("You do not have access to this resource")]
    Forbidden,

    #[error("Password hashing error: {message}")]
    PasswordHash { message: String },

    #[error("Token error: {message}")]
    Token { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies the error for the response layer.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InvalidAmount { .. } => ErrorKind::Validation,
            Self::UserNotFound { .. }
            | Self::MentorNotFound { .. }
            | Self::BookingNotFound { .. }
            | Self::InvalidReferralCode { .. }
            | Self::NoReferralFound { .. } => ErrorKind::NotFound,
            Self::SelfReferral
            | Self::DuplicateReferral
            | Self::AlreadyReferred { .. }
            | Self::AlreadyCompleted
            | Self::IdempotencyConflict
            | Self::EmailTaken
            | Self::InvalidCredentials => ErrorKind::Conflict,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Unauthorized { .. } | Self::Token { .. } => ErrorKind::Unauthorized,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Config { .. }
            | Self::ReferralCodeExhausted { .. }
            | Self::OrderIdExhausted { .. }
            | Self::PasswordHash { .. }
            | Self::Database(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Returns true when a database error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
