//! Fake broker management API

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::TestServer;

/// A password update the broker accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    /// User the request authenticated as
    pub auth_username: String,
    pub username: String,
    pub password: String,
    pub tags: String,
}

#[derive(Default)]
struct BrokerState {
    users: DashMap<String, String>,
    logins: AtomicUsize,
    update_attempts: AtomicUsize,
    updates: Mutex<Vec<UpdateCall>>,
    reject_updates: AtomicBool,
}

impl BrokerState {
    /// The user named by the basic auth header, if the password matches
    fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let (username, password) = basic_auth(headers)?;
        let stored = self.users.get(&username)?;
        (*stored == password).then_some(username)
    }
}

#[derive(Debug, Deserialize)]
struct UserBody {
    username: String,
    password: String,
    #[serde(default)]
    tags: String,
}

/// In-process stand-in for the broker's `/api/users/{name}` endpoint.
///
/// Any existing user may read or update any user.
pub struct FakeBroker {
    state: Arc<BrokerState>,
    server: TestServer,
}

impl FakeBroker {
    /// Start on a random local port with no users
    pub async fn start() -> Self {
        let state = Arc::new(BrokerState::default());
        let router = Router::new()
            .route("/api/users/:username", get(get_user).put(put_user))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let server = TestServer::start(router)
            .await
            .expect("failed to start fake broker");
        Self { state, server }
    }

    pub fn url(&self) -> &str {
        self.server.url()
    }

    /// Create or overwrite a user without going through HTTP
    pub fn add_user(&self, username: &str, password: &str) {
        self.state
            .users
            .insert(username.to_string(), password.to_string());
    }

    pub fn password_of(&self, username: &str) -> Option<String> {
        self.state.users.get(username).map(|p| p.clone())
    }

    pub fn accepts(&self, username: &str, password: &str) -> bool {
        self.password_of(username).as_deref() == Some(password)
    }

    /// Number of GET logins received
    pub fn login_count(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// Number of PUT requests received, accepted or not
    pub fn update_attempts(&self) -> usize {
        self.state.update_attempts.load(Ordering::SeqCst)
    }

    /// Accepted password updates, oldest first
    pub fn updates(&self) -> Vec<UpdateCall> {
        self.state.updates.lock().clone()
    }

    /// Make every authenticated PUT fail with 403
    pub fn set_reject_updates(&self, reject: bool) {
        self.state.reject_updates.store(reject, Ordering::SeqCst);
    }
}

async fn get_user(
    State(state): State<Arc<BrokerState>>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.logins.fetch_add(1, Ordering::SeqCst);

    if state.authenticate(&headers).is_none() {
        return unauthorized();
    }
    if !state.users.contains_key(&username) {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Object Not Found"})))
            .into_response();
    }

    Json(serde_json::json!({ "name": username, "tags": [] })).into_response()
}

async fn put_user(
    State(state): State<Arc<BrokerState>>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UserBody>,
) -> Response {
    state.update_attempts.fetch_add(1, Ordering::SeqCst);

    let Some(auth_username) = state.authenticate(&headers) else {
        return unauthorized();
    };
    if state.reject_updates.load(Ordering::SeqCst) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if body.username != username {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let created = state
        .users
        .insert(username.clone(), body.password.clone())
        .is_none();
    state.updates.lock().push(UpdateCall {
        auth_username,
        username,
        password: body.password,
        tags: body.tags,
    });

    if created {
        StatusCode::CREATED.into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"management\"")],
        Json(serde_json::json!({"error": "not_authorized", "reason": "Login failed"})),
    )
        .into_response()
}

fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_basic_auth_parsing() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("svc:pa:ss");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );

        assert_eq!(
            basic_auth(&headers),
            Some(("svc".to_string(), "pa:ss".to_string()))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(basic_auth(&headers), None);
    }

    #[tokio::test]
    async fn test_broker_bookkeeping() {
        let broker = FakeBroker::start().await;
        broker.add_user("svc", "old");

        assert!(broker.accepts("svc", "old"));
        assert!(!broker.accepts("svc", "new"));
        assert!(broker.password_of("other").is_none());
        assert_eq!(broker.login_count(), 0);
        assert!(broker.updates().is_empty());
    }
}
