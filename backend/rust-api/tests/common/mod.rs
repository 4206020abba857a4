#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use artalyze_api::config::{Config, ObjectStorageSettings, OtpSettings};
use artalyze_api::create_router;
use artalyze_api::models::puzzle::{ImagePair, PairStatus, PAIRS_PER_PUZZLE};
use artalyze_api::models::DateKey;
use artalyze_api::services::otp_store::OtpSender;
use artalyze_api::services::{AppState, StoreSet};
use artalyze_api::stores::memory::{
    MemoryCacheStore, MemoryPuzzleStore, MemorySessionStore, MemoryStatsStore, MemoryUserStore,
};
use artalyze_api::utils::clock;

/// One-time codes captured instead of delivered, keyed by recipient.
pub type SentCodes = Arc<Mutex<HashMap<String, String>>>;

pub struct RecordingOtpSender {
    pub codes: SentCodes,
}

#[async_trait]
impl OtpSender for RecordingOtpSender {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.codes
            .lock()
            .unwrap()
            .insert(email.to_string(), code.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub sent_codes: SentCodes,
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        redis_uri: "redis://127.0.0.1:6379/0".to_string(),
        mongo_database: "artalyze_test".to_string(),
        jwt_secret: "test-secret".to_string(),
        http_port: 0,
        admin_emails: vec!["admin@artalyze.test".to_string()],
        otp: OtpSettings {
            ttl_seconds: 300,
            max_attempts: 5,
        },
        object_storage: None,
    }
}

pub fn object_storage_fixture() -> ObjectStorageSettings {
    ObjectStorageSettings {
        bucket: "artalyze-images".to_string(),
        region: "us-east-1".to_string(),
        endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
        access_key: "AKIDEXAMPLE".to_string(),
        secret_key: "test-secret-key".to_string(),
        public_base_url: "https://images.artalyze.test".to_string(),
    }
}

/// Full application over in-memory stores; no external services involved.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(test_config()).await
}

pub async fn create_test_app_with(config: Config) -> TestApp {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let stores = StoreSet {
        puzzles: Arc::new(MemoryPuzzleStore::new()),
        stats: Arc::new(MemoryStatsStore::new()),
        sessions: Arc::new(MemorySessionStore::new()),
        users: Arc::new(MemoryUserStore::new()),
        cache: Arc::new(MemoryCacheStore::new()),
    };

    let sent_codes: SentCodes = Arc::new(Mutex::new(HashMap::new()));
    let sender = Arc::new(RecordingOtpSender {
        codes: sent_codes.clone(),
    });

    let state =
        Arc::new(AppState::with_stores(config, stores, sender).expect("failed to build app state"));

    TestApp {
        router: create_router(state.clone()),
        state,
        sent_codes,
    }
}

pub fn disable_rate_limit() {
    std::env::set_var("RATE_LIMIT_DISABLED", "1");
}

/// Schedule all five pairs for the current puzzle day straight through the
/// store. Returns `(human_url, ai_url)` per pair, which doubles as the
/// grading key in game tests.
pub async fn seed_todays_puzzle(app: &TestApp) -> (DateKey, Vec<(String, String)>) {
    seed_puzzle_for(app, clock::today()).await
}

pub async fn seed_puzzle_for(app: &TestApp, date: DateKey) -> (DateKey, Vec<(String, String)>) {
    let mut urls = Vec::new();
    for index in 0..PAIRS_PER_PUZZLE {
        let human = format!("https://images.artalyze.test/{}/human-{}.webp", date, index);
        let ai = format!("https://images.artalyze.test/{}/ai-{}.webp", date, index);
        let pair = ImagePair {
            human_image_url: Some(human.clone()),
            ai_image_url: Some(ai.clone()),
            status: PairStatus::Approved,
        };
        app.state
            .puzzles
            .upsert_pair(date, index, pair, Utc::now())
            .await
            .expect("failed to seed puzzle pair");
        urls.push((human, ai));
    }
    (date, urls)
}

/// Run the OTP flow end to end and hand back `(user_id, bearer_token)`.
pub async fn login(app: &TestApp, email: &str) -> (String, String) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/request-otp")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "email": email }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let code = app
        .sent_codes
        .lock()
        .unwrap()
        .get(email)
        .cloned()
        .expect("no OTP code recorded for email");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/verify-otp")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "email": email, "code": code }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    let token = body["accessToken"].as_str().unwrap().to_string();
    (user_id, token)
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "response body is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&bytes)
        )
    })
}

pub fn days_after(date: DateKey, days: u64) -> DateKey {
    DateKey::new(date.as_date() + chrono::Days::new(days))
}

/// Pull one cookie value out of the response's Set-Cookie headers.
pub fn extract_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|header| header.starts_with(&prefix))
        .and_then(|header| header.split(';').next())
        .and_then(|pair| pair.split('=').nth(1))
        .map(str::to_string)
}
