use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn guest_gets_a_cookie_and_a_fresh_board() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    common::seed_todays_puzzle(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = common::extract_cookie(&response, "guest_token").expect("guest cookie issued");
    assert!(!cookie.is_empty());

    let body = common::read_json(response).await;
    assert_eq!(body["status"], "not_started");
    assert_eq!(body["triesRemaining"], 3);
    assert_eq!(body["submitEnabled"], false);
    assert_eq!(body["imagePairs"].as_array().unwrap().len(), 5);
    assert!(body["selections"]
        .as_array()
        .unwrap()
        .iter()
        .all(|slot| slot.is_null()));
    // The board never labels which side is the human work.
    assert!(body["imagePairs"][0].get("left").is_some());
    assert!(body["imagePairs"][0].get("human").is_none());
}

#[tokio::test]
async fn guest_cookie_pins_the_same_session() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let guest = common::extract_cookie(&response, "guest_token").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/game/session/select")
                .header("content-type", "application/json")
                .header("cookie", format!("guest_token={}", guest))
                .body(Body::from(
                    json!({ "pairIndex": 0, "selectedImageUrl": pairs[0].0 }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Reloading with the same cookie sees the recorded pick.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .header("cookie", format!("guest_token={}", guest))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = common::read_json(response).await;
    assert_eq!(body["selections"][0]["selectedImageUrl"], pairs[0].0);
    assert!(body["selections"][1].is_null());
}

#[tokio::test]
async fn perfect_board_wins_and_fills_stats() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (date, pairs) = common::seed_todays_puzzle(&app).await;
    let (user_id, token) = common::login(&app, "winner@player.test").await;

    for (index, (human, _)) in pairs.iter().enumerate() {
        let response = select(&app, &token, index, human).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = submit(&app, &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "won");
    assert_eq!(body["correctCount"], 5);
    assert_eq!(body["triesRemaining"], 3);

    let stats = fetch_stats(&app, &token, &user_id).await;
    assert_eq!(stats["gamesPlayed"], 1);
    assert_eq!(stats["perfectPuzzles"], 1);
    assert_eq!(stats["winPercentage"], 100);
    assert_eq!(stats["currentStreak"], 1);
    assert_eq!(stats["maxStreak"], 1);
    assert_eq!(stats["mistakeDistribution"], json!([1, 0, 0, 0, 0, 0]));
    assert_eq!(stats["mostRecentScore"], 0);
    assert_eq!(stats["lastPlayedDate"], date.to_string());
}

#[tokio::test]
async fn wrong_board_burns_a_try() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;
    let (_, token) = common::login(&app, "struggler@player.test").await;

    for (index, (_, ai)) in pairs.iter().enumerate() {
        select(&app, &token, index, ai).await;
    }

    let response = submit(&app, &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["correctCount"], 0);
    assert_eq!(body["triesRemaining"], 2);
}

#[tokio::test]
async fn three_wrong_submits_lose_the_day() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (date, pairs) = common::seed_todays_puzzle(&app).await;
    let (user_id, token) = common::login(&app, "loser@player.test").await;

    for (index, (_, ai)) in pairs.iter().enumerate() {
        select(&app, &token, index, ai).await;
    }

    for _ in 0..2 {
        let response = submit(&app, &token).await;
        let body = common::read_json(response).await;
        assert_eq!(body["status"], "in_progress");
    }
    let response = submit(&app, &token).await;
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "lost");
    assert_eq!(body["triesRemaining"], 0);

    // Losing still counts the completion, with all five mistakes.
    let stats = fetch_stats(&app, &token, &user_id).await;
    assert_eq!(stats["gamesPlayed"], 1);
    assert_eq!(stats["perfectPuzzles"], 0);
    assert_eq!(stats["mistakeDistribution"], json!([0, 0, 0, 0, 0, 1]));
    assert_eq!(stats["mostRecentScore"], 5);
    assert_eq!(stats["lastPlayedDate"], date.to_string());

    // Submitting again replays the frozen outcome and records nothing new.
    let response = submit(&app, &token).await;
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "lost");
    assert_eq!(body["triesRemaining"], 0);
    let stats = fetch_stats(&app, &token, &user_id).await;
    assert_eq!(stats["gamesPlayed"], 1);
}

#[tokio::test]
async fn incomplete_board_cannot_submit() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;
    let (_, token) = common::login(&app, "hasty@player.test").await;

    select(&app, &token, 0, &pairs[0].0).await;
    select(&app, &token, 1, &pairs[1].0).await;

    let response = submit(&app, &token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_range_pair_index_is_rejected() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;
    let (_, token) = common::login(&app, "fumbler@player.test").await;

    let response = select(&app, &token, 7, &pairs[0].0).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_selections_feed_the_game_view() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;
    let (_, token) = common::login(&app, "restorer@player.test").await;

    // The client restores a half-filled board through the bulk endpoint.
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/stats/selections")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({
                        "selections": [
                            { "selectedImageUrl": pairs[0].0 },
                            null,
                            { "selectedImageUrl": pairs[2].1 },
                            null,
                            null
                        ]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = common::read_json(response).await;
    assert_eq!(body["selections"][0]["selectedImageUrl"], pairs[0].0);
    assert!(body["selections"][1].is_null());
    assert_eq!(body["selections"][2]["selectedImageUrl"], pairs[2].1);
}

#[tokio::test]
async fn guests_play_without_leaving_stats_behind() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    let (_, pairs) = common::seed_todays_puzzle(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let guest = common::extract_cookie(&response, "guest_token").unwrap();

    for (index, (human, _)) in pairs.iter().enumerate() {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/game/session/select")
                    .header("content-type", "application/json")
                    .header("cookie", format!("guest_token={}", guest))
                    .body(Body::from(
                        json!({ "pairIndex": index, "selectedImageUrl": human }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/game/session/submit")
                .header("cookie", format!("guest_token={}", guest))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::read_json(response).await;
    assert_eq!(body["status"], "won");

    // No statistics row appears for the guest id.
    let recorded = app.state.stats.get(&guest).await.unwrap();
    assert!(recorded.is_none());
}

#[tokio::test]
async fn an_invalid_bearer_token_falls_back_to_guest_play() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;
    common::seed_todays_puzzle(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .header("authorization", "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(common::extract_cookie(&response, "guest_token").is_some());
}

#[tokio::test]
async fn session_is_unavailable_without_a_scheduled_puzzle() {
    common::disable_rate_limit();
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/game/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

async fn select(
    app: &common::TestApp,
    token: &str,
    pair_index: usize,
    url: &str,
) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/game/session/select")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(
                    json!({ "pairIndex": pair_index, "selectedImageUrl": url }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn submit(app: &common::TestApp, token: &str) -> Response<Body> {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/game/session/submit")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn fetch_stats(app: &common::TestApp, token: &str, user_id: &str) -> serde_json::Value {
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
