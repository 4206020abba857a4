use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::OtpSettings;
use crate::stores::{CacheStore, StoreError, StoreResult};

/// Delivery seam for one-time codes. The production default logs the code;
/// deployments plug a real mailer in behind this trait.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

pub struct TracingOtpSender;

#[async_trait]
impl OtpSender for TracingOtpSender {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!("OTP code for {}: {}", email, code);
        Ok(())
    }
}

/// Stored per email. Only the SHA-256 of the code is kept.
#[derive(Debug, Serialize, Deserialize)]
struct OtpRecord {
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerification {
    Valid,
    /// Wrong code; one attempt consumed.
    Invalid,
    /// Expired, already used, or never issued.
    Expired,
    TooManyAttempts,
}

/// One-time-code bookkeeping over the cache store: hashed codes, explicit
/// expiry checked on read, a capped attempt counter, single use.
pub struct OtpStore {
    cache: Arc<dyn CacheStore>,
    settings: OtpSettings,
}

impl OtpStore {
    pub fn new(cache: Arc<dyn CacheStore>, settings: OtpSettings) -> Self {
        Self { cache, settings }
    }

    fn key(email: &str) -> String {
        format!("otp:{}", email)
    }

    fn hash_code(code: &str) -> String {
        hex::encode(Sha256::digest(code.as_bytes()))
    }

    pub async fn issue(&self, email: &str, code: &str) -> StoreResult<()> {
        let record = OtpRecord {
            code_hash: Self::hash_code(code),
            expires_at: Utc::now() + Duration::seconds(self.settings.ttl_seconds as i64),
            attempts: 0,
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| StoreError::Unavailable(format!("otp record encode: {}", e)))?;
        self.cache
            .set_ex(&Self::key(email), &payload, self.settings.ttl_seconds)
            .await
    }

    pub async fn verify(&self, email: &str, code: &str) -> StoreResult<OtpVerification> {
        let key = Self::key(email);
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(OtpVerification::Expired);
        };

        let Ok(mut record) = serde_json::from_str::<OtpRecord>(&raw) else {
            // Unreadable record is as good as no record
            self.cache.del(&key).await?;
            return Ok(OtpVerification::Expired);
        };

        let now = Utc::now();
        if record.expires_at <= now {
            self.cache.del(&key).await?;
            return Ok(OtpVerification::Expired);
        }
        if record.attempts >= self.settings.max_attempts {
            self.cache.del(&key).await?;
            return Ok(OtpVerification::TooManyAttempts);
        }

        if record.code_hash == Self::hash_code(code) {
            // Single use
            self.cache.del(&key).await?;
            return Ok(OtpVerification::Valid);
        }

        record.attempts += 1;
        if record.attempts >= self.settings.max_attempts {
            self.cache.del(&key).await?;
            return Ok(OtpVerification::TooManyAttempts);
        }

        let remaining = (record.expires_at - now).num_seconds().max(1) as u64;
        let payload = serde_json::to_string(&record)
            .map_err(|e| StoreError::Unavailable(format!("otp record encode: {}", e)))?;
        self.cache.set_ex(&key, &payload, remaining).await?;
        Ok(OtpVerification::Invalid)
    }
}
