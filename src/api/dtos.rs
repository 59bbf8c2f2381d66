//! Request bodies. Field names are camelCase on the wire.

use crate::{
    core::{
        booking::{BookingUpdate, NewBooking},
        identity::{MentorSignup, StudentSignup},
    },
    entities::booking::BookingStatus,
};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

/// `POST /api/auth/signup`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub grade: Option<String>,
    pub school: Option<String>,
    pub referral_code: Option<String>,
}

impl From<SignupRequest> for StudentSignup {
    fn from(req: SignupRequest) -> Self {
        Self {
            email: req.email,
            password: req.password,
            full_name: req.full_name,
            phone: req.phone,
            city: req.city,
            grade: req.grade,
            school: req.school,
            referral_code: req.referral_code,
        }
    }
}

/// `POST /api/auth/mentor/signup`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MentorSignupRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    pub title: Option<String>,
    pub company: Option<String>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: Option<i64>,
}

impl From<MentorSignupRequest> for MentorSignup {
    fn from(req: MentorSignupRequest) -> Self {
        Self {
            email: req.email,
            password: req.password,
            name: req.name,
            title: req.title,
            company: req.company,
            price: req.price,
        }
    }
}

/// Student and mentor login
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// `POST /api/referrals/apply`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReferralRequest {
    #[validate(length(min = 1, max = 32, message = "Referral code is required"))]
    pub referral_code: String,
    pub new_user_id: i64,
}

/// `POST /api/referrals/complete`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteReferralRequest {
    pub referred_user_id: i64,
}

/// `POST /api/referrals/redeem`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub points: i64,
    pub booking_id: Option<i64>,
    /// Used when no `Idempotency-Key` header is sent
    #[validate(length(min = 1, max = 128, message = "Idempotency key must be 1-128 characters"))]
    pub idempotency_key: Option<String>,
}

/// `POST /api/bookings`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub user_id: i64,
    pub mentor_id: i64,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 32, message = "Time is required"))]
    pub time: String,
    #[validate(length(min = 1, max = 500, message = "Topic is required"))]
    pub topic: String,
    pub duration: i32,
    pub amount: i64,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(req: CreateBookingRequest) -> Self {
        Self {
            user_id: req.user_id,
            mentor_id: req.mentor_id,
            date: req.date,
            time: req.time,
            topic: req.topic,
            duration: req.duration,
            amount: req.amount,
        }
    }
}

/// `PATCH /api/bookings/:id`
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    pub status: Option<BookingStatus>,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 32, message = "Time must not be empty"))]
    pub time: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Topic must not be empty"))]
    pub topic: Option<String>,
    pub duration: Option<i32>,
}

impl From<UpdateBookingRequest> for BookingUpdate {
    fn from(req: UpdateBookingRequest) -> Self {
        Self {
            status: req.status,
            date: req.date,
            time: req.time,
            topic: req.topic,
            duration: req.duration,
        }
    }
}
