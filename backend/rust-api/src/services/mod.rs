use std::sync::Arc;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::middlewares::auth::JwtService;
use crate::services::object_storage::ObjectStorageClient;
use crate::services::otp_store::{OtpSender, TracingOtpSender};
use crate::stores::mongo::{MongoPuzzleStore, MongoSessionStore, MongoStatsStore, MongoUserStore};
use crate::stores::redis_cache::RedisCacheStore;
use crate::stores::{CacheStore, PuzzleStore, SessionStore, StatsStore, UserStore};

pub mod auth_service;
pub mod object_storage;
pub mod otp_store;
pub mod puzzle_service;
pub mod session_service;
pub mod stats_service;

/// The persistence collaborators behind the API, bundled so tests can swap
/// the in-memory implementations in without touching the handler wiring.
pub struct StoreSet {
    pub puzzles: Arc<dyn PuzzleStore>,
    pub stats: Arc<dyn StatsStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub cache: Arc<dyn CacheStore>,
}

pub struct AppState {
    pub config: Config,
    pub puzzles: Arc<dyn PuzzleStore>,
    pub stats: Arc<dyn StatsStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserStore>,
    pub cache: Arc<dyn CacheStore>,
    pub jwt: Arc<JwtService>,
    pub otp_sender: Arc<dyn OtpSender>,
    pub object_storage: Option<ObjectStorageClient>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let database = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let stores = StoreSet {
            puzzles: Arc::new(MongoPuzzleStore::new(&database)),
            stats: Arc::new(MongoStatsStore::new(&database)),
            sessions: Arc::new(MongoSessionStore::new(&database)),
            users: Arc::new(MongoUserStore::new(&database)),
            cache: Arc::new(RedisCacheStore::new(redis)),
        };

        Self::with_stores(config, stores, Arc::new(TracingOtpSender))
    }

    /// Assemble the state on top of explicit stores. Production goes through
    /// [`AppState::new`]; tests hand in memory stores and a recording sender.
    pub fn with_stores(
        config: Config,
        stores: StoreSet,
        otp_sender: Arc<dyn OtpSender>,
    ) -> anyhow::Result<Self> {
        let jwt = Arc::new(JwtService::new(&config.jwt_secret));
        let object_storage = config
            .object_storage
            .clone()
            .map(ObjectStorageClient::new)
            .transpose()?;
        if object_storage.is_none() {
            tracing::warn!("Object storage is not configured; image uploads are disabled");
        }

        Ok(Self {
            config,
            puzzles: stores.puzzles,
            stats: stores.stats,
            sessions: stores.sessions,
            users: stores.users,
            cache: stores.cache,
            jwt,
            otp_sender,
            object_storage,
        })
    }
}
