use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::{OTP_CODES_ISSUED_TOTAL, OTP_VERIFICATIONS_TOTAL};
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{AuthResponse, UserProfile, UserRole, VerifyOtpRequest};
use crate::services::otp_store::{OtpSender, OtpStore, OtpVerification};
use crate::stores::UserStore;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

pub struct AuthService {
    users: Arc<dyn UserStore>,
    otp_store: OtpStore,
    otp_sender: Arc<dyn OtpSender>,
    jwt: Arc<JwtService>,
    config: Config,
    access_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        otp_store: OtpStore,
        otp_sender: Arc<dyn OtpSender>,
        jwt: Arc<JwtService>,
        config: Config,
    ) -> Self {
        // Allow overriding the access token TTL via env JWT_ACCESS_TOKEN_TTL_SECONDS
        let access_token_ttl_seconds = std::env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECONDS);

        Self {
            users,
            otp_store,
            otp_sender,
            jwt,
            config,
            access_token_ttl_seconds,
        }
    }

    /// Issue a one-time code for the address and hand it to the sender.
    /// Succeeds whether or not the address has logged in before; the account
    /// is created on first successful verification.
    pub async fn request_otp(&self, email_raw: &str) -> Result<(), ApiError> {
        let email = normalize_email(email_raw);

        let code = generate_code();
        self.otp_store.issue(&email, &code).await?;

        if let Err(e) = self.otp_sender.send_code(&email, &code).await {
            tracing::error!(email = %email, "Failed to deliver OTP: {}", e);
            return Err(ApiError::internal("Failed to deliver the one-time code"));
        }

        OTP_CODES_ISSUED_TOTAL.inc();
        tracing::info!(email = %email, "OTP issued");
        Ok(())
    }

    /// Verify a code, upsert the user record and mint an access token.
    pub async fn verify_otp(&self, req: VerifyOtpRequest) -> Result<AuthResponse, ApiError> {
        let email = normalize_email(&req.email);

        match self.otp_store.verify(&email, &req.code).await? {
            OtpVerification::Valid => {}
            OtpVerification::Invalid => {
                OTP_VERIFICATIONS_TOTAL.with_label_values(&["invalid"]).inc();
                tracing::warn!(email = %email, "OTP verification failed: wrong code");
                return Err(ApiError::unauthorized("Invalid verification code"));
            }
            OtpVerification::Expired => {
                OTP_VERIFICATIONS_TOTAL.with_label_values(&["expired"]).inc();
                return Err(ApiError::unauthorized(
                    "Verification code expired or not found",
                ));
            }
            OtpVerification::TooManyAttempts => {
                OTP_VERIFICATIONS_TOTAL.with_label_values(&["throttled"]).inc();
                return Err(ApiError::too_many_requests(
                    "Too many verification attempts. Request a new code.",
                ));
            }
        }

        let role = if self.config.is_admin_email(&email) {
            UserRole::Admin
        } else {
            UserRole::Player
        };

        let user = self.users.upsert_by_email(&email, role, Utc::now()).await?;
        let user_id = user
            .id
            .ok_or_else(|| ApiError::internal("User record missing id after upsert"))?;

        let access_token = self.generate_access_token(&user_id.to_hex(), &email, &user.role)?;

        OTP_VERIFICATIONS_TOTAL.with_label_values(&["valid"]).inc();
        tracing::info!(
            user_id = %user_id.to_hex(),
            email = %email,
            role = %user.role.as_str(),
            "Successful OTP login"
        );

        Ok(AuthResponse {
            access_token,
            user: UserProfile::from(user),
        })
    }

    /// Generate JWT access token
    fn generate_access_token(
        &self,
        user_id: &str,
        email: &str,
        role: &UserRole,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt
            .generate_token(claims)
            .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}
