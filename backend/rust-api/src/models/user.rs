use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// User model stored in MongoDB "users" collection. Identity is the
/// normalized email; there are no passwords, login goes through one-time
/// codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "createdAt", with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "lastLoginAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::bson_datetime_as_chrono_option"
    )]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Player,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Player => "player",
            UserRole::Admin => "admin",
        }
    }
}

/// User as returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email,
            role: user.role,
        }
    }
}

/// Body of `POST /auth/request-otp`.
#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Body of `POST /auth/verify-otp`.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 4, max = 8, message = "Code must be between 4 and 8 digits"))]
    pub code: String,
}

/// Response after successful OTP verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}
