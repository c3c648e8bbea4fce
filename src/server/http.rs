// src/server/http.rs

//! The HTTP control plane: login/session endpoints, the authenticated
//! create endpoint, the public scoreboard, and the init-script
//! bootstrap fetch.

use super::state::ServerState;
use crate::core::errors::KothError;
use crate::core::model::{Container, validate_ipv4, validate_team_name};
use crate::core::net;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, warn};

const SESSION_COOKIE: &str = "token";

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/init_script.sh", get(init_script))
        .route("/api/login", post(login))
        .route("/api/checkLogin", get(check_login))
        .route("/api/logout", delete(logout))
        .route("/api/create", post(create_team))
        .route("/api/public/summary.json", get(summary))
        .route("/api/public/scoring.json", get(scoring))
        .fallback_service(ServeDir::new("public"))
        .layer(axum::middleware::from_fn(no_cache))
        .layer(cors)
        .with_state(state)
}

/// Applies `Cache-Control`/`Pragma` to every response, matching the
/// original's blanket no-cache policy.
async fn no_cache(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    resp.headers_mut().insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    resp
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Maps a [`KothError`] to its HTTP status code; anything not called out
/// explicitly becomes a 500.
fn kotherror_status(e: &KothError) -> StatusCode {
    match e {
        KothError::BadInput(_) => StatusCode::BAD_REQUEST,
        KothError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// --- GET /init_script.sh?token=T ---

#[derive(Deserialize)]
struct InitScriptQuery {
    token: String,
}

async fn init_script(State(state): State<ServerState>, Query(q): Query<InitScriptQuery>) -> Response {
    if !state.bootstrap_tokens.consume(&q.token) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let path = if Path::new("init_script.sh").exists() {
        "init_script.sh"
    } else {
        "init_script.example.sh"
    };

    match tokio::fs::read_to_string(path).await {
        Ok(contents) => ([(header::CONTENT_TYPE, "text/x-shellscript")], contents).into_response(),
        Err(e) => {
            error!("failed to read init script '{path}': {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// --- POST /api/login ---

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(State(state): State<ServerState>, headers: HeaderMap, body: String) -> Response {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    if content_type != Some("text/plain") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let Ok(req) = serde_json::from_str::<LoginRequest>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if req.username != state.config.web_server.username || req.password != state.config.web_server.password {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let token = state.sessions.create();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"))
            .expect("cookie value is a valid header value"),
    );
    (StatusCode::OK, headers).into_response()
}

// --- GET /api/checkLogin ---

async fn check_login(headers: HeaderMap, State(state): State<ServerState>) -> StatusCode {
    match cookie_value(&headers, SESSION_COOKIE) {
        Some(token) if state.sessions.touch(&token) => StatusCode::OK,
        _ => StatusCode::UNAUTHORIZED,
    }
}

// --- DELETE /api/logout ---

async fn logout(headers: HeaderMap, State(state): State<ServerState>) -> Response {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        state.sessions.revoke(&token);
    }

    let mut out = HeaderMap::new();
    out.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!("{SESSION_COOKIE}=; Path=/; Max-Age=0"))
            .expect("cookie value is a valid header value"),
    );
    (StatusCode::OK, out).into_response()
}

// --- POST /api/create ---

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    ip: String,
}

async fn create_team(headers: HeaderMap, State(state): State<ServerState>, Json(req): Json<CreateRequest>) -> Response {
    match cookie_value(&headers, SESSION_COOKIE) {
        Some(token) if state.sessions.touch(&token) => {}
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    }

    if let Err(e) = validate_team_name(&req.name).and_then(|_| validate_ipv4(&req.ip)) {
        return (kotherror_status(&e), e.to_string()).into_response();
    }

    if net::ping_once(&req.ip).await {
        warn!("[{}][{}]: IP already reachable, refusing to create", req.name, req.ip);
        return StatusCode::IM_USED.into_response();
    }

    match state.provisioner.create_single(&req.name, &req.ip).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// --- GET /api/public/summary.json ---

#[derive(Serialize)]
struct ContainerSummary {
    pve_id: i64,
    ipv4: String,
    status: String,
}

#[derive(Serialize)]
struct NamedChecks {
    passed: Vec<String>,
    failed: Vec<String>,
}

#[derive(Serialize)]
struct ChecksSummary {
    total: i64,
    passed: i64,
    failed: i64,
    named: NamedChecks,
}

#[derive(Serialize)]
struct TeamSummary {
    name: String,
    score: i64,
    uptime: f64,
    checks: ChecksSummary,
}

#[derive(Serialize)]
struct ContainerSnapshot {
    container: ContainerSummary,
    team: TeamSummary,
    #[serde(rename = "lastUpdate")]
    last_update: String,
}

fn to_snapshot(c: &Container) -> ContainerSnapshot {
    ContainerSnapshot {
        container: ContainerSummary {
            pve_id: c.team.container_id,
            ipv4: c.team.container_ip.clone(),
            status: c.status.clone(),
        },
        team: TeamSummary {
            name: c.team.name.clone(),
            score: c.team.score,
            uptime: c.team.uptime_fraction(),
            checks: ChecksSummary {
                total: c.team.service_checks_total,
                passed: c.team.service_checks_passed,
                failed: c.team.service_checks_total - c.team.service_checks_passed,
                named: NamedChecks {
                    passed: c.passed_checks.clone(),
                    failed: c.failed_checks.clone(),
                },
            },
        },
        last_update: c.updated_at.to_rfc3339(),
    }
}

async fn summary(State(state): State<ServerState>) -> Json<Vec<ContainerSnapshot>> {
    Json(state.environment.snapshot().iter().map(to_snapshot).collect())
}

// --- GET /api/public/scoring.json ---

async fn scoring() -> Json<serde_json::Value> {
    let defs: Vec<_> = crate::core::scoring::checks::checks()
        .into_iter()
        .map(|c| json!({"name": c.def.name, "desc": c.def.desc, "reward": c.def.reward, "penalty": c.def.penalty}))
        .collect();
    Json(serde_json::Value::Array(defs))
}
