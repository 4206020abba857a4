use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::puzzle::{ImagePair, PuzzleDay};
use crate::models::session::PlayerSession;
use crate::models::stats::UserStats;
use crate::models::user::{User, UserRole};
use crate::models::DateKey;

pub mod memory;
pub mod mongo;
pub mod redis_cache;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures the persistence collaborators can surface. `Unavailable` is
/// transient from the caller's point of view and maps to HTTP 503;
/// `Conflict` means a versioned write lost a race and should be retried
/// against a fresh read.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("concurrent update conflict")]
    Conflict,
}

/// Daily puzzle documents, keyed by date.
#[async_trait]
pub trait PuzzleStore: Send + Sync {
    async fn get(&self, date: DateKey) -> StoreResult<Option<PuzzleDay>>;

    /// Write one pair slot, creating the five-slot skeleton on first touch.
    /// Idempotent per `(date, index)`: re-scheduling overwrites in place.
    async fn upsert_pair(
        &self,
        date: DateKey,
        index: usize,
        pair: ImagePair,
        now: DateTime<Utc>,
    ) -> StoreResult<PuzzleDay>;

    async fn list(&self, from: DateKey, to: DateKey) -> StoreResult<Vec<PuzzleDay>>;

    /// Returns whether a document existed.
    async fn delete(&self, date: DateKey) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Per-user statistics with optimistic concurrency.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>>;

    /// Compare-and-set write. `expected_version == 0` inserts a new document;
    /// otherwise the stored version must still match. The store bumps the
    /// version and returns the persisted record.
    async fn put_versioned(&self, stats: &UserStats, expected_version: i64)
        -> StoreResult<UserStats>;

    async fn delete(&self, user_id: &str) -> StoreResult<bool>;
}

/// Authenticated players' daily sessions, keyed `"{owner}:{date}"`.
/// Guest sessions live in the cache store instead.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<PlayerSession>>;

    /// Same CAS contract as [`StatsStore::put_versioned`].
    async fn put_versioned(
        &self,
        session: &PlayerSession,
        expected_version: i64,
    ) -> StoreResult<PlayerSession>;
}

/// User identities, keyed by normalized email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Create on first login, update `lastLoginAt` afterwards. An `Admin`
    /// role argument upgrades an existing record (allowlist promotion);
    /// `Player` never downgrades one.
    async fn upsert_by_email(
        &self,
        email: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;
}

/// Volatile keyed strings with TTLs: one-time codes, guest sessions and the
/// rate-limit windows all ride on this.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Fixed-window counter: increment and return the new count, arming the
    /// window TTL on the first increment.
    async fn incr_window(&self, key: &str, window_seconds: u64) -> StoreResult<i64>;

    async fn ping(&self) -> StoreResult<()>;
}
