use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::puzzle::{ImagePair, PuzzleDay, PAIRS_PER_PUZZLE};
use crate::models::session::PlayerSession;
use crate::models::stats::UserStats;
use crate::models::user::{User, UserRole};
use crate::models::DateKey;

use super::{PuzzleStore, SessionStore, StatsStore, StoreError, StoreResult, UserStore};

const PUZZLES: &str = "puzzles";
const USER_STATS: &str = "user_stats";
const GAME_SESSIONS: &str = "game_sessions";
const USERS: &str = "users";

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) =
        &*err.kind
    {
        return we.code == 11000;
    }
    false
}

fn bson_now(now: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(now.timestamp_millis())
}

pub struct MongoPuzzleStore {
    database: Database,
    collection: Collection<PuzzleDay>,
}

impl MongoPuzzleStore {
    pub fn new(database: &Database) -> Self {
        Self {
            database: database.clone(),
            collection: database.collection(PUZZLES),
        }
    }
}

#[async_trait]
impl PuzzleStore for MongoPuzzleStore {
    async fn get(&self, date: DateKey) -> StoreResult<Option<PuzzleDay>> {
        track_db_operation("find_one", PUZZLES, async {
            self.collection
                .find_one(doc! { "_id": date.to_string() })
                .await
                .map_err(StoreError::from)
        })
        .await
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
        track_db_operation("upsert_pair", PUZZLES, async {
            let filter = doc! { "_id": date.to_string() };

            // First touch creates the five empty slots, so a concurrent
            // writer to another slot always finds the full skeleton.
            let mut skeleton = bson::to_document(&PuzzleDay::skeleton(date, now))
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            skeleton.remove("_id");
            self.collection
                .update_one(filter.clone(), doc! { "$setOnInsert": skeleton })
                .upsert(true)
                .await?;

            let pair_bson =
                bson::to_bson(&pair).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let mut set = bson::Document::new();
            set.insert(format!("pairs.{index}"), pair_bson);
            set.insert("updatedAt", bson_now(now));
            self.collection
                .update_one(filter.clone(), doc! { "$set": set })
                .await?;

            self.collection
                .find_one(filter)
                .await?
                .ok_or_else(|| StoreError::Unavailable("puzzle vanished mid-upsert".to_string()))
        })
        .await
    }

    async fn list(&self, from: DateKey, to: DateKey) -> StoreResult<Vec<PuzzleDay>> {
        track_db_operation("find", PUZZLES, async {
            let cursor = self
                .collection
                .find(doc! { "_id": { "$gte": from.to_string(), "$lte": to.to_string() } })
                .sort(doc! { "_id": 1 })
                .await?;
            cursor.try_collect().await.map_err(StoreError::from)
        })
        .await
    }

    async fn delete(&self, date: DateKey) -> StoreResult<bool> {
        track_db_operation("delete_one", PUZZLES, async {
            let result = self
                .collection
                .delete_one(doc! { "_id": date.to_string() })
                .await?;
            Ok(result.deleted_count > 0)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }
}

pub struct MongoStatsStore {
    collection: Collection<UserStats>,
}

impl MongoStatsStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(USER_STATS),
        }
    }
}

#[async_trait]
impl StatsStore for MongoStatsStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>> {
        track_db_operation("find_one", USER_STATS, async {
            self.collection
                .find_one(doc! { "_id": user_id })
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn put_versioned(
        &self,
        stats: &UserStats,
        expected_version: i64,
    ) -> StoreResult<UserStats> {
        let mut next = stats.clone();
        next.version = expected_version + 1;
        track_db_operation("put_versioned", USER_STATS, async {
            if expected_version == 0 {
                match self.collection.insert_one(&next).await {
                    Ok(_) => Ok(()),
                    Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict),
                    Err(e) => Err(e.into()),
                }
            } else {
                let filter = doc! { "_id": &next.user_id, "version": expected_version };
                let result = self.collection.replace_one(filter, &next).await?;
                if result.matched_count == 0 {
                    Err(StoreError::Conflict)
                } else {
                    Ok(())
                }
            }
        })
        .await?;
        Ok(next)
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        track_db_operation("delete_one", USER_STATS, async {
            let result = self.collection.delete_one(doc! { "_id": user_id }).await?;
            Ok(result.deleted_count > 0)
        })
        .await
    }
}

pub struct MongoSessionStore {
    collection: Collection<PlayerSession>,
}

impl MongoSessionStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(GAME_SESSIONS),
        }
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn get(&self, id: &str) -> StoreResult<Option<PlayerSession>> {
        track_db_operation("find_one", GAME_SESSIONS, async {
            self.collection
                .find_one(doc! { "_id": id })
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn put_versioned(
        &self,
        session: &PlayerSession,
        expected_version: i64,
    ) -> StoreResult<PlayerSession> {
        let mut next = session.clone();
        next.version = expected_version + 1;
        track_db_operation("put_versioned", GAME_SESSIONS, async {
            if expected_version == 0 {
                match self.collection.insert_one(&next).await {
                    Ok(_) => Ok(()),
                    Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict),
                    Err(e) => Err(e.into()),
                }
            } else {
                let filter = doc! { "_id": &next.id, "version": expected_version };
                let result = self.collection.replace_one(filter, &next).await?;
                if result.matched_count == 0 {
                    Err(StoreError::Conflict)
                } else {
                    Ok(())
                }
            }
        })
        .await?;
        Ok(next)
    }
}

pub struct MongoUserStore {
    collection: Collection<User>,
}

impl MongoUserStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(USERS),
        }
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        track_db_operation("find_one", USERS, async {
            self.collection
                .find_one(doc! { "email": email })
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn upsert_by_email(
        &self,
        email: &str,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        track_db_operation("upsert_by_email", USERS, async {
            let mut set = doc! { "lastLoginAt": bson_now(now) };
            let mut set_on_insert = doc! { "email": email, "createdAt": bson_now(now) };
            if role == UserRole::Admin {
                set.insert("role", role.as_str());
            } else {
                set_on_insert.insert("role", role.as_str());
            }
            self.collection
                .find_one_and_update(
                    doc! { "email": email },
                    doc! { "$set": set, "$setOnInsert": set_on_insert },
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await?
                .ok_or_else(|| StoreError::Unavailable("user upsert returned nothing".to_string()))
        })
        .await
    }
}
