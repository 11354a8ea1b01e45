#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use bridge_proto::{Envelope, ProxyReply};
use bytes::Bytes;
use frame_bus::{Bus, LocalBus, TOPIC_EXTENSION_REPLY, TOPIC_EXTENSION_REQUEST};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use sidebar_bridge::session::{Session, SessionStore, UserRef};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Header the emulated privileged process adds to every request it relays.
pub const VIA_HEADER: &str = "x-relayed-by";

#[derive(Debug, Clone)]
pub struct Hit {
    pub route: String,
    pub authorization: Option<String>,
    pub via: Option<String>,
    pub body: Option<Value>,
}

/// In-process stand-in for the job tracker backend.
#[derive(Clone, Default)]
pub struct Backend {
    hits: Arc<Mutex<Vec<Hit>>>,
    profile_created: Arc<AtomicBool>,
}

impl Backend {
    fn record(&self, route: &str, headers: &HeaderMap, body: Option<Value>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.hits.lock().push(Hit {
            route: route.to_string(),
            authorization: header("authorization"),
            via: header(VIA_HEADER),
            body,
        });
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().clone()
    }

    pub fn hits_for(&self, route: &str) -> Vec<Hit> {
        self.hits
            .lock()
            .iter()
            .filter(|hit| hit.route == route)
            .cloned()
            .collect()
    }
}

/// Serves the fake backend on an ephemeral port and returns its API base URL.
pub async fn spawn_backend() -> (Backend, String) {
    let backend = Backend::default();
    let router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/profile", get(profile))
        .route("/api/profile/create", post(create_profile))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/extract", post(extract_job))
        .route("/api/jobs/apply/:id", post(apply_job))
        .route("/api/jobs/:id", get(show_job).delete(delete_job))
        .route("/api/jobs/status/:id", patch(update_job_status))
        .with_state(backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    (backend, format!("http://{addr}/api"))
}

async fn login(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record("POST /auth/login", &headers, Some(body.clone()));
    if body["password"] == "pw" {
        (
            StatusCode::OK,
            Json(json!({
                "token": "tok-1",
                "user": { "userId": "u-1", "name": "Ada", "email": body["email"] }
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid email or password" })),
        )
    }
}

async fn profile(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    backend.record("GET /profile", &headers, None);
    let authorized =
        headers.get("authorization").and_then(|value| value.to_str().ok()) == Some("Bearer tok-1");
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        );
    }
    if backend.profile_created.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "profile": { "userId": "u-1" } })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Profile not found" })),
        )
    }
}

async fn create_profile(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record("POST /profile/create", &headers, Some(body.clone()));
    backend.profile_created.store(true, Ordering::SeqCst);
    (StatusCode::CREATED, Json(json!({ "profile": body })))
}

async fn list_jobs(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    backend.record("GET /jobs", &headers, None);
    Json(json!({ "jobs": [] }))
}

async fn extract_job(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record("POST /jobs/extract", &headers, Some(body.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    match body.get("title").and_then(Value::as_str) {
        Some(title) => (
            StatusCode::CREATED,
            Json(json!({ "job": { "_id": "j1", "title": title } })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Missing job title" })),
        ),
    }
}

async fn apply_job(State(backend): State<Backend>, headers: HeaderMap) -> StatusCode {
    backend.record("POST /jobs/apply", &headers, None);
    StatusCode::NO_CONTENT
}

async fn show_job(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    backend.record("GET /jobs/:id", &headers, None);
    (StatusCode::OK, "OK")
}

async fn update_job_status(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.record("PATCH /jobs/status", &headers, Some(body));
    (StatusCode::UNAUTHORIZED, Json(json!("Unauthorized")))
}

async fn delete_job(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    backend.record("DELETE /jobs", &headers, None);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

/// Emulates the extension's privileged process: performs each `API_REQUEST`
/// with plain HTTP and answers on the reply topic.
pub fn spawn_privileged_process(bus: Arc<LocalBus>) -> JoinHandle<()> {
    let mut rx = bus.subscribe(TOPIC_EXTENSION_REQUEST);
    let http = reqwest::Client::new();
    tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            let Ok(envelope) = Envelope::decode(&msg.payload) else {
                continue;
            };
            let bus = Arc::clone(&bus);
            let http = http.clone();
            tokio::spawn(async move {
                let mut reply = relay(&http, &envelope).await;
                reply.correlation_id = envelope.correlation_id.clone();
                let bytes = serde_json::to_vec(&reply).expect("encode reply");
                bus.publish(TOPIC_EXTENSION_REPLY, Bytes::from(bytes)).ok();
            });
        }
    })
}

async fn relay(http: &reqwest::Client, envelope: &Envelope) -> ProxyReply {
    let (Some(url), Some(method)) = (&envelope.url, &envelope.method) else {
        return ProxyReply::failed("request is missing url or method");
    };
    let Ok(method) = reqwest::Method::from_bytes(method.as_bytes()) else {
        return ProxyReply::failed("unsupported method");
    };
    let mut request = http.request(method, url).header(VIA_HEADER, "extension");
    for (name, value) in envelope.headers.iter().flatten() {
        request = request.header(name, value);
    }
    if let Some(body) = &envelope.body {
        request = request.body(body.to_string());
    }
    match request.send().await {
        Ok(res) => {
            let success = res.status().is_success();
            let data: Value = res.json().await.unwrap_or(Value::Null);
            if success {
                ProxyReply::ok(data)
            } else {
                ProxyReply {
                    success: false,
                    data: None,
                    error: data.get("message").and_then(Value::as_str).map(str::to_string),
                    correlation_id: None,
                }
            }
        }
        Err(err) => ProxyReply::failed(err.to_string()),
    }
}

pub fn session(token: &str) -> Session {
    Session {
        token: token.to_string(),
        user: UserRef {
            user_id: "u-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            extra: Map::new(),
        },
    }
}

pub fn signed_in(token: &str) -> Arc<SessionStore> {
    let store = SessionStore::ephemeral();
    store.sign_in(session(token)).expect("sign in");
    Arc::new(store)
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
