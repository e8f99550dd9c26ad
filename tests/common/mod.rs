//! In-process target service for the integration tests
//!
//! A small bulletin board: cookie sessions, login redirects, notes that
//! can be posted and read back, a cacheable stylesheet and a couple of
//! deliberately broken endpoints.

#![allow(dead_code)]

use anyhow::Result;
use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use loadcheck_core::{Credentials, RunContext};
use loadcheck_http::HttpSettings;
use loadcheck_metrics::{create_counters, SharedCounters};
use loadcheck_pool::{SessionSettings, UserPool};
use loadcheck_runner::{Orchestrator, RunSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const STYLESHEET_ETAG: &str = "\"app-v1\"";

#[derive(Default)]
struct Board {
    accounts: HashMap<String, String>,
    sessions: HashMap<String, String>,
    notes: Vec<String>,
}

/// Shared state of the target
#[derive(Clone, Default)]
pub struct TargetState {
    board: Arc<Mutex<Board>>,
    next_session: Arc<AtomicU64>,
    /// Requests served per path
    hits: Arc<Mutex<HashMap<String, u64>>>,
}

impl TargetState {
    pub fn with_accounts(accounts: &[(&str, &str)]) -> Self {
        let state = Self::default();
        {
            let mut board = state.board.lock().unwrap();
            for (name, secret) in accounts {
                board.accounts.insert(name.to_string(), secret.to_string());
            }
        }
        state
    }

    pub fn hits(&self, path: &str) -> u64 {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn notes(&self) -> Vec<String> {
        self.board.lock().unwrap().notes.clone()
    }

    fn hit(&self, path: &str) {
        *self.hits.lock().unwrap().entry(path.to_string()).or_default() += 1;
    }

    fn session_user(&self, headers: &HeaderMap) -> Option<String> {
        let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
        let sid = cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == "sid")
            .map(|(_, value)| value.to_string())?;
        self.board.lock().unwrap().sessions.get(&sid).cloned()
    }
}

#[derive(Deserialize)]
struct LoginForm {
    name: String,
    password: String,
}

#[derive(Deserialize)]
struct NoteForm {
    title: String,
}

async fn top_page(State(state): State<TargetState>, headers: HeaderMap) -> Html<String> {
    state.hit("/");
    let name = state.session_user(&headers).unwrap_or_else(|| "guest".to_string());
    let notes: String = state
        .notes()
        .iter()
        .enumerate()
        .map(|(id, title)| format!(r#"<li><a class="note" href="/notes/{}">{}</a></li>"#, id, title))
        .collect();
    Html(format!(
        r#"<html><head><link rel="stylesheet" href="/static/app.css"></head>
<body><p class="greeting">{}</p><ul class="notes">{}</ul></body></html>"#,
        name, notes
    ))
}

async fn login(State(state): State<TargetState>, Form(form): Form<LoginForm>) -> Response {
    state.hit("/login");
    let mut board = state.board.lock().unwrap();
    if board.accounts.get(&form.name) != Some(&form.password) {
        return (StatusCode::FORBIDDEN, Html("<p>bad credentials</p>")).into_response();
    }

    let sid = format!("s{}", state.next_session.fetch_add(1, Ordering::Relaxed));
    board.sessions.insert(sid.clone(), form.name);
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, format!("sid={}; Path=/", sid)),
        ],
    )
        .into_response()
}

async fn signup(State(state): State<TargetState>, Form(form): Form<LoginForm>) -> Response {
    state.hit("/signup");
    let mut board = state.board.lock().unwrap();
    if board.accounts.contains_key(&form.name) {
        return StatusCode::CONFLICT.into_response();
    }
    board.accounts.insert(form.name, form.password);
    (StatusCode::SEE_OTHER, [(header::LOCATION, "/login")]).into_response()
}

async fn post_note(
    State(state): State<TargetState>,
    headers: HeaderMap,
    Form(form): Form<NoteForm>,
) -> Response {
    state.hit("/notes");
    if state.session_user(&headers).is_none() {
        return (StatusCode::SEE_OTHER, [(header::LOCATION, "/login")]).into_response();
    }
    let id = {
        let mut board = state.board.lock().unwrap();
        board.notes.push(form.title);
        board.notes.len() - 1
    };
    (StatusCode::SEE_OTHER, [(header::LOCATION, format!("/notes/{}", id))]).into_response()
}

async fn show_note(State(state): State<TargetState>, Path(id): Path<usize>) -> Response {
    state.hit("/notes/{id}");
    match state.notes().get(id) {
        Some(title) => Html(format!("<html><body><h1>{}</h1></body></html>", title)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stylesheet(State(state): State<TargetState>, headers: HeaderMap) -> Response {
    state.hit("/static/app.css");
    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|tag| tag == STYLESHEET_ETAG);
    if fresh {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, STYLESHEET_ETAG)]).into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "text/css"),
            (header::ETAG, STYLESHEET_ETAG),
        ],
        "body { color: black; }",
    )
        .into_response()
}

/// Declares HTML but sends bytes that are not UTF-8
async fn broken() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        vec![0x3c_u8, 0x70, 0x3e, 0xff, 0xfe, 0xfd],
    )
        .into_response()
}

async fn slow() -> Html<&'static str> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Html("<p>finally</p>")
}

pub fn router(state: TargetState) -> Router {
    Router::new()
        .route("/", get(top_page))
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/notes", post(post_note))
        .route("/notes/{id}", get(show_note))
        .route("/static/app.css", get(stylesheet))
        .route("/broken", get(broken))
        .route("/slow", get(slow))
        .with_state(state)
}

/// Serve the target on an ephemeral port
pub async fn start_target(state: TargetState) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(addr)
}

pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

/// Orchestrator over `seeds` against the target at `addr`
pub fn orchestrator(addr: SocketAddr, seeds: Vec<Credentials>, settings: RunSettings) -> Orchestrator {
    let session = SessionSettings {
        timeout: Duration::from_secs(2),
        ..SessionSettings::default()
    };
    let http = HttpSettings::new(&base_url(addr))
        .unwrap()
        .with_session(session.clone());
    let pool = UserPool::seeded(seeds, session, settings.seed).unwrap();
    let counters: SharedCounters = create_counters();
    Orchestrator::new(settings, pool, counters, http)
}

pub fn short_run(workers: usize, duration: Duration) -> RunSettings {
    RunSettings {
        workers,
        duration,
        seed: 42,
        ..RunSettings::default()
    }
}

/// Cancel `ctx` after `delay`
pub fn cancel_after(ctx: &RunContext, delay: Duration) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        ctx.cancel();
    });
}
