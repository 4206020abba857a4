use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::puzzle::{ImagePair, PuzzleDay, PAIRS_PER_PUZZLE};
use crate::models::session::PlayerSession;
use crate::models::stats::UserStats;
use crate::models::user::{User, UserRole};
use crate::models::DateKey;

use super::{CacheStore, PuzzleStore, SessionStore, StatsStore, StoreError, StoreResult, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

/// Process-local puzzle repository. Backs the integration tests and local
/// runs without a database; semantics match the Mongo implementation.
#[derive(Default)]
pub struct MemoryPuzzleStore {
    days: Mutex<HashMap<String, PuzzleDay>>,
}

impl MemoryPuzzleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PuzzleStore for MemoryPuzzleStore {
    async fn get(&self, date: DateKey) -> StoreResult<Option<PuzzleDay>> {
        Ok(lock(&self.days)?.get(&date.to_string()).cloned())
    }

    async fn upsert_pair(
        &self,
        date: DateKey,
        index: usize,
        pair: ImagePair,
        now: DateTime<Utc>,
    ) -> StoreResult<PuzzleDay> {
        if index >= PAIRS_PER_PUZZLE {
            return Err(StoreError::Unavailable(format!(
                "pair index {index} out of range"
            )));
        }
        let mut days = lock(&self.days)?;
        let day = days
            .entry(date.to_string())
            .or_insert_with(|| PuzzleDay::skeleton(date, now));
        day.pairs[index] = pair;
        day.updated_at = now;
        Ok(day.clone())
    }

    async fn list(&self, from: DateKey, to: DateKey) -> StoreResult<Vec<PuzzleDay>> {
        let days = lock(&self.days)?;
        let mut selected: Vec<PuzzleDay> = days
            .values()
            .filter(|day| day.date >= from && day.date <= to)
            .cloned()
            .collect();
        selected.sort_by_key(|day| day.date);
        Ok(selected)
    }

    async fn delete(&self, date: DateKey) -> StoreResult<bool> {
        Ok(lock(&self.days)?.remove(&date.to_string()).is_some())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStatsStore {
    records: Mutex<HashMap<String, UserStats>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>> {
        Ok(lock(&self.records)?.get(user_id).cloned())
    }

    async fn put_versioned(
        &self,
        stats: &UserStats,
        expected_version: i64,
    ) -> StoreResult<UserStats> {
        let mut records = lock(&self.records)?;
        match records.get(&stats.user_id) {
            None if expected_version != 0 => return Err(StoreError::Conflict),
            Some(current) if current.version != expected_version => {
                return Err(StoreError::Conflict)
            }
            _ => {}
        }
        let mut next = stats.clone();
        next.version = expected_version + 1;
        records.insert(next.user_id.clone(), next.clone());
        Ok(next)
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        Ok(lock(&self.records)?.remove(user_id).is_some())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, PlayerSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str) -> StoreResult<Option<PlayerSession>> {
        Ok(lock(&self.sessions)?.get(id).cloned())
    }

    async fn put_versioned(
        &self,
        session: &PlayerSession,
        expected_version: i64,
    ) -> StoreResult<PlayerSession> {
        let mut sessions = lock(&self.sessions)?;
        match sessions.get(&session.id) {
            None if expected_version != 0 => return Err(StoreError::Conflict),
            Some(current) if current.version != expected_version => {
                return Err(StoreError::Conflict)
            }
            _ => {}
        }
        let mut next = session.clone();
        next.version = expected_version + 1;
        sessions.insert(next.id.clone(), next.clone());
        Ok(next)
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(lock(&self.users)?.get(email).cloned())
    }

    async fn upsert_by_email(
        &self,
        email: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut users = lock(&self.users)?;
        let user = users
            .entry(email.to_string())
            .and_modify(|user| {
                user.last_login_at = Some(now);
                if role == UserRole::Admin {
                    user.role = UserRole::Admin;
                }
            })
            .or_insert_with(|| User {
                id: Some(mongodb::bson::oid::ObjectId::new()),
                email: email.to_string(),
                role,
                created_at: now,
                last_login_at: Some(now),
            });
        Ok(user.clone())
    }
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = lock(&self.entries)?;
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(now) {
                entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()> {
        let mut entries = lock(&self.entries)?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    async fn incr_window(&self, key: &str, window_seconds: u64) -> StoreResult<i64> {
        let mut entries = lock(&self.entries)?;
        let now = Instant::now();
        let fresh_window = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => None,
            _ => Some(now + Duration::from_secs(window_seconds)),
        };
        match fresh_window {
            Some(expires_at) => {
                entries.insert(
                    key.to_string(),
                    CacheEntry {
                        value: "1".to_string(),
                        expires_at,
                    },
                );
                Ok(1)
            }
            None => {
                let entry = entries
                    .get_mut(key)
                    .ok_or_else(|| StoreError::Unavailable("window entry vanished".to_string()))?;
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                Ok(count)
            }
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
