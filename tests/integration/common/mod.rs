//! In-process fake of the upstream check-in service.
//!
//! Each test spawns its own server on an ephemeral port and points a
//! [`Runner`] at it. The server counts hits per endpoint and records what the
//! client sent, so tests can assert on both outcome and traffic.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use checkin_imaging::RewardImage;
use checkin_mailer::MailConfig;
use checkin_orchestrator::{ApiClient, Profile, RetryPolicy, Runner};
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::{json, Value};

/// Openid the fake token endpoint refuses to issue a token for.
pub const INVALID_OPENID: &str = "o-invalid";

/// User agent configured in the test profile.
pub const TEST_USER_AGENT: &str = "checkin-test/1.0";

/// Background size served as `end.jpg`.
pub const BACKGROUND_SIZE: (u32, u32) = (200, 400);

/// How the fake upstream behaves.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// `nid` in the profile response (`None` sends JSON null).
    pub nid: Option<&'static str>,
    /// `cardNo` in the profile response.
    pub card_no: Option<&'static str>,
    /// Application status answered to the check-in.
    pub join_status: u16,
    /// Whether the image manifest answers HTTP 200.
    pub manifest_ok: bool,
    /// A reward image that is served as 404.
    pub missing_image: Option<&'static str>,
    /// Profile endpoint answers `{"result": null}`.
    pub last_info_null: bool,
    /// Course endpoint answers `{"result": null}`.
    pub course_null: bool,
    /// Score endpoint answers `{"result": null}`.
    pub score_null: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            nid: Some("N-1001"),
            card_no: Some("CARD-77"),
            join_status: 200,
            manifest_ok: true,
            missing_image: None,
            last_info_null: false,
            course_null: false,
            score_null: false,
        }
    }
}

/// Per-endpoint request counters.
#[derive(Debug, Default)]
pub struct Hits {
    pub token: AtomicUsize,
    pub last_info: AtomicUsize,
    pub course: AtomicUsize,
    pub user: AtomicUsize,
    pub join: AtomicUsize,
    pub manifest: AtomicUsize,
    pub images: AtomicUsize,
}

/// Reads a hit counter.
pub fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// What the client sent that tests want to inspect.
#[derive(Debug, Default)]
pub struct Recorded {
    pub token_user_agent: Option<String>,
    pub join_user_agent: Option<String>,
    pub join_body: Option<Value>,
    pub join_token: Option<String>,
}

struct FakeState {
    base: String,
    scenario: Scenario,
    hits: Arc<Hits>,
    recorded: Arc<Mutex<Recorded>>,
}

/// Handle to a running fake upstream.
pub struct FakeUpstream {
    pub base: String,
    pub hits: Arc<Hits>,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl FakeUpstream {
    /// Starts a server for `scenario` on an ephemeral port.
    pub async fn spawn(scenario: Scenario) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake upstream");
        let base = format!("http://{}", listener.local_addr().expect("No local addr"));

        let hits = Arc::new(Hits::default());
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = Arc::new(FakeState {
            base: base.clone(),
            scenario,
            hits: Arc::clone(&hits),
            recorded: Arc::clone(&recorded),
        });

        let app = Router::new()
            .route("/token", get(token))
            .route("/lastInfo", get(last_info))
            .route("/currentCourse", get(current_course))
            .route("/userInfo", get(user_info))
            .route("/join", post(join))
            .route("/image", get(manifest))
            .route("/h5/act/images/:file", get(reward_image))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base,
            hits,
            recorded,
        }
    }

    /// Profile whose endpoints all point at this server.
    pub fn profile(&self) -> Profile {
        profile_for(&self.base)
    }

    /// Runner for this server writing under `save_root`, with immediate retries
    /// and a pinned date.
    pub fn runner(&self, save_root: &Path) -> Runner {
        Runner::with_client(client_for(&self.profile()), save_root).with_date(test_date())
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("Recorded lock poisoned")
    }
}

/// Profile pointing every endpoint at `base`.
pub fn profile_for(base: &str) -> Profile {
    Profile::from_toml_str(&format!(
        r#"
        [profile.url]
        accessToken = "{base}/token"
        lastInfo = "{base}/lastInfo"
        currentCourse = "{base}/currentCourse"
        userInfo = "{base}/userInfo"
        join = "{base}/join"
        image = "{base}/image?accessToken="

        [profile.other]
        wxAppId = "wx-test-app"
        UA = "{TEST_USER_AGENT}"
        "#
    ))
    .expect("Test profile should parse")
}

/// API client that ignores proxy settings and retries without waiting.
pub fn client_for(profile: &Profile) -> ApiClient {
    let http = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to build HTTP client");
    ApiClient::with_http_client(profile, http).with_retry_policy(RetryPolicy::immediate(3))
}

/// Mail relay settings pointing at a local port nothing listens on.
pub async fn unreachable_relay() -> MailConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let port = listener.local_addr().expect("No local addr").port();
    drop(listener);

    MailConfig {
        port,
        ..MailConfig::new("127.0.0.1", "bot@example.com").with_password("secret")
    }
}

pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date")
}

// ============================================================================
// Handlers
// ============================================================================

async fn token(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hits.token.fetch_add(1, Ordering::SeqCst);
    state.recorded.lock().expect("lock").token_user_agent = user_agent(&headers);

    let openid = params.get("openid").cloned().unwrap_or_default();
    if params.get("appid").map(String::as_str) != Some("wx-test-app") || openid == INVALID_OPENID {
        return "<html>session expired</html>".into_response();
    }
    let token = format!("TK-{}", openid.to_uppercase());
    format!("<script>var lower = 'skip-me'; window.accessToken = \"{token}\";</script>")
        .into_response()
}

async fn last_info(State(state): State<Arc<FakeState>>) -> Json<Value> {
    state.hits.last_info.fetch_add(1, Ordering::SeqCst);
    if state.scenario.last_info_null {
        return Json(json!({"result": null}));
    }
    Json(json!({
        "result": {
            "nid": state.scenario.nid,
            "cardNo": state.scenario.card_no,
            "nodes": [{"title": "League A"}, {"title": "Branch 3"}]
        }
    }))
}

async fn current_course(State(state): State<Arc<FakeState>>) -> Json<Value> {
    state.hits.course.fetch_add(1, Ordering::SeqCst);
    if state.scenario.course_null {
        return Json(json!({"result": null}));
    }
    Json(json!({"result": {"id": "C-2026-42", "title": "Season 42"}}))
}

async fn user_info(State(state): State<Arc<FakeState>>) -> Json<Value> {
    let calls = state.hits.user.fetch_add(1, Ordering::SeqCst);
    if state.scenario.score_null {
        return Json(json!({"result": null}));
    }
    Json(json!({"result": {"score": 100 + calls}}))
}

async fn join(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    state.hits.join.fetch_add(1, Ordering::SeqCst);
    {
        let mut recorded = state.recorded.lock().expect("lock");
        recorded.join_user_agent = user_agent(&headers);
        recorded.join_body = serde_json::from_slice(&body).ok();
        recorded.join_token = params.get("accessToken").cloned();
    }

    let status = state.scenario.join_status;
    let message = if status == 200 { "ok" } else { "already checked in today" };
    Json(json!({"status": status, "message": message}))
}

async fn manifest(State(state): State<Arc<FakeState>>) -> Response {
    state.hits.manifest.fetch_add(1, Ordering::SeqCst);
    if !state.scenario.manifest_ok {
        return (StatusCode::INTERNAL_SERVER_ERROR, "unavailable").into_response();
    }
    Json(json!({"result": {"uri": format!("{}/h5/act/index.html", state.base)}})).into_response()
}

async fn reward_image(
    State(state): State<Arc<FakeState>>,
    UrlPath(file): UrlPath<String>,
) -> Response {
    state.hits.images.fetch_add(1, Ordering::SeqCst);
    if state.scenario.missing_image == Some(file.as_str()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let bytes = match RewardImage::ALL.iter().find(|image| image.file_name() == file) {
        Some(RewardImage::Background) => {
            let (w, h) = BACKGROUND_SIZE;
            encode(
                &DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([20, 40, 60]))),
                ImageFormat::Jpeg,
            )
        }
        Some(_) => encode(
            &DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 16, Rgba([250, 200, 0, 255]))),
            ImageFormat::Png,
        ),
        None => return StatusCode::NOT_FOUND.into_response(),
    };
    ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).expect("Failed to encode image");
    buf.into_inner()
}
