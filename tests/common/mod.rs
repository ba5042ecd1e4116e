#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use webhelper_rs::ClientConfig;

pub const ORIGIN: &str = "https://open.spotify.com";

/// Counters and the last status query seen by the fake helper.
#[derive(Clone, Default)]
pub struct Hits {
    pub token: Arc<AtomicUsize>,
    pub csrf: Arc<AtomicUsize>,
    pub status_query: Arc<Mutex<Option<HashMap<String, String>>>>,
}

impl Hits {
    pub fn token(&self) -> usize {
        self.token.load(Ordering::SeqCst)
    }

    pub fn csrf(&self) -> usize {
        self.csrf.load(Ordering::SeqCst)
    }
}

pub struct FakeHelper {
    pub port: u16,
    pub hits: Hits,
}

impl FakeHelper {
    /// Client config reaching this fake over plain HTTP on loopback, with the
    /// token issuer served by the same process.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.port,
            token_url: format!("http://127.0.0.1:{}/token", self.port),
            scheme: "http".into(),
            fixed_host: Some("127.0.0.1".into()),
            request_timeout_ms: 2_000,
            ..ClientConfig::default()
        }
    }
}

fn origin_ok(headers: &HeaderMap) -> bool {
    headers.get("origin").and_then(|v| v.to_str().ok()) == Some(ORIGIN)
}

fn service_error(kind: &str, message: &str) -> Json<Value> {
    Json(json!({ "error": { "type": kind, "message": message } }))
}

async fn token(State(hits): State<Hits>) -> Json<Value> {
    hits.token.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "t": "OAUTH" }))
}

async fn version(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    if !origin_ok(&headers) || q.get("service").map(String::as_str) != Some("remote") {
        return service_error("4303", "Invalid origin");
    }
    Json(json!({ "version": 9, "client_version": "1.0.85.257" }))
}

async fn csrf(State(hits): State<Hits>, headers: HeaderMap) -> Json<Value> {
    if !origin_ok(&headers) {
        return service_error("4303", "Invalid origin");
    }
    hits.csrf.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    Json(json!({ "token": "CSRF" }))
}

fn authorized(q: &HashMap<String, String>) -> bool {
    q.get("oauth").map(String::as_str) == Some("OAUTH")
        && q.get("csrf").map(String::as_str) == Some("CSRF")
}

async fn status(
    State(hits): State<Hits>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    if !authorized(&q) {
        return service_error("4110", "Invalid Csrf token");
    }
    *hits.status_query.lock().unwrap() = Some(q);
    Json(json!({
        "version": 9,
        "client_version": "1.0.85.257",
        "playing": true,
        "track": {
            "track_resource": { "name": "Song", "uri": "spotify:track:1" },
            "artist_resource": { "name": "Band", "uri": "spotify:artist:1" },
            "length": 215
        }
    }))
}

async fn pause(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    if !authorized(&q) {
        return service_error("4110", "Invalid Csrf token");
    }
    let paused = q.get("pause").map(String::as_str) == Some("true");
    Json(json!({ "playing": !paused }))
}

async fn play(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    if !authorized(&q) {
        return service_error("4110", "Invalid Csrf token");
    }
    Json(json!({ "playing": true, "uri": q.get("uri"), "context": q.get("context") }))
}

fn helper_router(hits: Hits) -> Router {
    Router::new()
        .route("/token", get(token))
        .route("/service/version.json", get(version))
        .route("/simplecsrf/token.json", get(csrf))
        .route("/remote/status.json", get(status))
        .route("/remote/pause.json", get(pause))
        .route("/remote/play.json", get(play))
        .with_state(hits)
}

fn other_router() -> Router {
    Router::new().fallback(|| async { "It works!" })
}

fn serve(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Two listeners on adjacent loopback ports: the fake web helper on the
/// lower one and an unrelated HTTP server on the next.
pub async fn spawn_adjacent() -> (FakeHelper, u16) {
    for _ in 0..50 {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = first.local_addr().unwrap().port();
        if port == u16::MAX {
            continue;
        }
        if let Ok(second) = TcpListener::bind(("127.0.0.1", port + 1)).await {
            let hits = Hits::default();
            serve(first, helper_router(hits.clone()));
            serve(second, other_router());
            return (FakeHelper { port, hits }, port + 1);
        }
    }
    panic!("could not bind two adjacent loopback ports");
}

pub async fn spawn_helper() -> FakeHelper {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Hits::default();
    serve(listener, helper_router(hits.clone()));
    FakeHelper { port, hits }
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
