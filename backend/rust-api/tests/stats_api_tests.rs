use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn stats_routes_require_a_token() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/stats/someone")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn a_new_player_reads_zeroed_stats() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (user_id, token) = common::login(&app, "fresh@player.test").await;

    let body = get_stats(&app, &token, &user_id).await;
    assert_eq!(body["userId"], user_id.as_str());
    assert_eq!(body["gamesPlayed"], 0);
    assert_eq!(body["winPercentage"], 0);
    assert_eq!(body["currentStreak"], 0);
    assert_eq!(body["mistakeDistribution"], json!([0, 0, 0, 0, 0, 0]));
    assert!(body["mostRecentScore"].is_null());
    assert!(body["lastPlayedDate"].is_null());
}

#[tokio::test]
async fn players_cannot_read_someone_elses_stats() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, token) = common::login(&app, "snoop@player.test").await;
    let (other_id, _) = common::login(&app, "target@player.test").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/stats/{}", other_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_can_read_any_players_stats() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (player_id, _) = common::login(&app, "watched@player.test").await;
    let (_, admin_token) = common::login(&app, "admin@artalyze.test").await;

    let body = get_stats(&app, &admin_token, &player_id).await;
    assert_eq!(body["userId"], player_id.as_str());
}

#[tokio::test]
async fn recording_a_completion_is_idempotent_per_day() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (user_id, token) = common::login(&app, "recorder@player.test").await;

    let body = record(&app, &token, &user_id, 4, 5).await;
    assert_eq!(body["gamesPlayed"], 1);
    assert_eq!(body["perfectPuzzles"], 0);
    assert_eq!(body["currentStreak"], 1);
    assert_eq!(body["mistakeDistribution"], json!([0, 1, 0, 0, 0, 0]));
    assert_eq!(body["mostRecentScore"], 1);

    // The same day records only once.
    let body = record(&app, &token, &user_id, 5, 5).await;
    assert_eq!(body["gamesPlayed"], 1);
    assert_eq!(body["perfectPuzzles"], 0);
}

#[tokio::test]
async fn completion_payloads_are_validated() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (user_id, token) = common::login(&app, "validator@player.test").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/stats/{}", user_id))
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({ "correctAnswers": 3, "totalQuestions": 0 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_zeroes_the_record() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (user_id, token) = common::login(&app, "resetter@player.test").await;

    record(&app, &token, &user_id, 5, 5).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/stats/{}/reset", user_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["gamesPlayed"], 0);
    assert_eq!(body["currentStreak"], 0);

    let body = get_stats(&app, &token, &user_id).await;
    assert_eq!(body["gamesPlayed"], 0);
}

#[tokio::test]
async fn delete_reports_whether_anything_existed() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (user_id, token) = common::login(&app, "deleter@player.test").await;

    record(&app, &token, &user_id, 4, 5).await;

    let response = delete_stats(&app, &token, &user_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["deleted"], true);

    let response = delete_stats(&app, &token, &user_id).await;
    let body = common::read_json(response).await;
    assert_eq!(body["deleted"], false);
}

#[tokio::test]
async fn tries_can_be_decremented_and_reset() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    common::seed_todays_puzzle(&app).await;
    let (_, token) = common::login(&app, "tries@player.test").await;

    let body = put_tries(&app, &token, "/stats/tries/decrement").await;
    assert_eq!(body["triesRemaining"], 2);
    assert_eq!(body["status"], "in_progress");

    let body = put_tries(&app, &token, "/stats/tries/decrement").await;
    assert_eq!(body["triesRemaining"], 1);

    let body = put_tries(&app, &token, "/stats/tries/reset").await;
    assert_eq!(body["triesRemaining"], 3);
}

#[tokio::test]
async fn running_out_of_tries_ends_the_session() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    common::seed_todays_puzzle(&app).await;
    let (user_id, token) = common::login(&app, "burned@player.test").await;

    for _ in 0..2 {
        put_tries(&app, &token, "/stats/tries/decrement").await;
    }
    let body = put_tries(&app, &token, "/stats/tries/decrement").await;
    assert_eq!(body["triesRemaining"], 0);
    assert_eq!(body["status"], "lost");

    // The forfeit counts as a completed (and lost) game.
    let body = get_stats(&app, &token, &user_id).await;
    assert_eq!(body["gamesPlayed"], 1);
    assert_eq!(body["perfectPuzzles"], 0);
}

async fn get_stats(app: &common::TestApp, token: &str, user_id: &str) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/stats/{}", user_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    common::read_json(response).await
}

async fn record(
    app: &common::TestApp,
    token: &str,
    user_id: &str,
    correct: u32,
    total: u32,
) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/stats/{}", user_id))
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({ "correctAnswers": correct, "totalQuestions": total }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    common::read_json(response).await
}

async fn delete_stats(app: &common::TestApp, token: &str, user_id: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/stats/{}", user_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn put_tries(app: &common::TestApp, token: &str, uri: &str) -> Value {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    common::read_json(response).await
}
