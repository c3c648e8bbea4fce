// tests/http_api.rs

//! Black-box tests over the HTTP control plane's axum router, covering
//! the literal end-to-end scenarios enumerated for the scoreboard and
//! login surface.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kothctl::core::model::{Container, Team};
use kothctl::server::http::router;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn empty_environment_yields_empty_summary() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::get("/api/public/summary.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn summary_reflects_a_freshly_created_team() {
    let state = common::test_state().await;
    state
        .environment
        .push(Container::new(Team::new("Team 1".to_string(), "10.0.0.2".to_string(), 101), "running".to_string()));
    let app = router(state);

    let response = app
        .oneshot(Request::get("/api/public/summary.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["team"]["name"], "Team 1");
    assert_eq!(entries[0]["team"]["score"], 0);
    assert_eq!(entries[0]["team"]["uptime"], 1.0);
    assert_eq!(entries[0]["team"]["checks"]["total"], 0);
}

#[tokio::test]
async fn scoring_json_lists_every_static_check_without_probe_functions() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::get("/api/public/scoring.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body.as_array().unwrap();
    assert!(entries.iter().any(|e| e["name"] == "Ping"));
    assert!(entries.iter().any(|e| e["name"] == "Team Claim"));
    for entry in entries {
        assert!(entry.get("probe").is_none());
        assert!(entry.get("name").is_some());
        assert!(entry.get("reward").is_some());
        assert!(entry.get("penalty").is_some());
    }
}

#[tokio::test]
async fn login_rejects_wrong_credentials() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(
            Request::post("/api/login")
                .header(axum::http::header::CONTENT_TYPE, "text/plain")
                .body(Body::from(r#"{"username":"admin","password":"wrong"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_non_text_plain_content_type() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(
            Request::post("/api/login")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"username":"admin","password":"hunter2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn login_then_check_login_round_trips_the_session_cookie() {
    let state = common::test_state().await;
    let app = router(state);

    let login_response = app
        .clone()
        .oneshot(
            Request::post("/api/login")
                .header(axum::http::header::CONTENT_TYPE, "text/plain")
                .body(Body::from(r#"{"username":"admin","password":"hunter2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login_response.status(), StatusCode::OK);

    let set_cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    let check_response = app
        .oneshot(Request::get("/api/checkLogin").header(axum::http::header::COOKIE, cookie).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(check_response.status(), StatusCode::OK);
}

#[tokio::test]
async fn check_login_rejects_a_missing_cookie() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::get("/api/checkLogin").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_without_a_session_is_unauthorized() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(
            Request::post("/api/create")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"Team 1","ip":"10.0.0.2"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn every_response_carries_no_cache_headers() {
    let state = common::test_state().await;
    let app = router(state);

    let response = app
        .oneshot(Request::get("/api/public/summary.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let cache_control = response.headers().get(axum::http::header::CACHE_CONTROL).unwrap();
    assert_eq!(cache_control, "no-cache, no-store, must-revalidate");
}
