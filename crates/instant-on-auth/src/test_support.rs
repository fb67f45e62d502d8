//! Local mock of the identity provider for unit tests.
//!
//! One axum server answers all four endpoints (SSO and portal share a host),
//! counts hits per endpoint, and checks the PKCE verifier against the
//! challenge it received during authorization, like the real provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::endpoints::{AUTHORIZE_PATH, AuthEndpoints, DEFAULT_SCOPE, SESSION_PATH, SETTINGS_PATH, TOKEN_PATH};
use crate::http::build_http_client;
use crate::pkce::compute_challenge;

pub const USERNAME: &str = "admin@example.com";
pub const PASSWORD: &str = "correct-horse";
pub const CLIENT_ID: &str = "portal-client-123";

pub fn test_client() -> reqwest::Client {
    build_http_client(Duration::from_secs(5)).unwrap()
}

/// Base URL of a server that accepts connections and never answers.
pub async fn spawn_stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    url
}

/// Knobs for the mock's responses. Defaults describe a healthy provider.
#[derive(Clone)]
pub struct MockBehavior {
    pub session_body: Option<serde_json::Value>,
    pub settings_status: u16,
    pub authorize_status: u16,
    pub authorize_location: Option<String>,
    pub authorize_omit_location: bool,
    /// Redirect to `/landing` on the mock itself so a followed redirect is counted
    pub authorize_self_redirect: bool,
    pub token_status: u16,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            session_body: None,
            settings_status: 200,
            authorize_status: 302,
            authorize_location: None,
            authorize_omit_location: false,
            authorize_self_redirect: false,
            token_status: 200,
        }
    }
}

#[derive(Default)]
pub struct Hits {
    pub session: AtomicUsize,
    pub settings: AtomicUsize,
    pub authorize: AtomicUsize,
    pub token: AtomicUsize,
    pub landing: AtomicUsize,
}

struct MockState {
    behavior: MockBehavior,
    base_url: String,
    hits: Arc<Hits>,
    challenge: Mutex<Option<String>>,
    states: Mutex<Vec<String>>,
}

pub struct MockIdp {
    pub base_url: String,
    pub hits: Arc<Hits>,
    state: Arc<MockState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockIdp {
    pub async fn spawn(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Hits::default());

        let state = Arc::new(MockState {
            behavior,
            base_url: base_url.clone(),
            hits: hits.clone(),
            challenge: Mutex::new(None),
            states: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(SESSION_PATH, post(session_handler))
            .route(SETTINGS_PATH, get(settings_handler))
            .route(AUTHORIZE_PATH, get(authorize_handler))
            .route(TOKEN_PATH, post(token_handler))
            .route("/landing", get(landing_handler))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            hits,
            state,
            _server: server,
        }
    }

    pub fn endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            sso_url: self.base_url.clone(),
            portal_url: self.base_url.clone(),
            redirect_uri: "https://portal.example".into(),
            scope: DEFAULT_SCOPE.into(),
        }
    }

    /// Pretend an authorization request already carried `challenge`.
    pub fn register_challenge(&self, challenge: &str) {
        *self.state.challenge.lock().unwrap() = Some(challenge.to_owned());
    }

    /// `state` values received by the authorization endpoint, in order.
    pub fn seen_states(&self) -> Vec<String> {
        self.state.states.lock().unwrap().clone()
    }
}

fn oauth_error(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn session_handler(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.hits.session.fetch_add(1, Ordering::SeqCst);
    let valid = form.get("username").map(String::as_str) == Some(USERNAME)
        && form.get("password").map(String::as_str) == Some(PASSWORD);
    if !valid {
        return oauth_error(StatusCode::UNAUTHORIZED, "invalid_credentials");
    }
    let body = state
        .behavior
        .session_body
        .clone()
        .unwrap_or_else(|| json!({ "access_token": "S1", "token_type": "Bearer" }));
    Json(body).into_response()
}

async fn settings_handler(State(state): State<Arc<MockState>>) -> Response {
    state.hits.settings.fetch_add(1, Ordering::SeqCst);
    let code = status(state.behavior.settings_status);
    if !code.is_success() {
        return oauth_error(code, "unavailable");
    }
    Json(json!({ "ssoClientIdAuthZ": CLIENT_ID, "ssoBaseUrl": state.base_url })).into_response()
}

async fn authorize_handler(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hits.authorize.fetch_add(1, Ordering::SeqCst);
    let behavior = &state.behavior;

    let param = |key: &str| params.get(key).map(String::as_str).unwrap_or_default();
    if param("sessionToken") != "S1"
        || param("client_id") != CLIENT_ID
        || param("code_challenge_method") != "S256"
        || param("response_type") != "code"
    {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_request");
    }
    state.states.lock().unwrap().push(param("state").to_owned());
    *state.challenge.lock().unwrap() = Some(param("code_challenge").to_owned());

    let code = status(behavior.authorize_status);
    if !code.is_redirection() {
        return oauth_error(code, "unauthorized_client");
    }
    if behavior.authorize_omit_location {
        return code.into_response();
    }

    let location = if behavior.authorize_self_redirect {
        format!("{}/landing?code=LOCAL", state.base_url)
    } else {
        behavior.authorize_location.clone().unwrap_or_else(|| {
            format!("https://portal.example/?code=ABC123&state={}", param("state"))
        })
    };
    (code, [(header::LOCATION, location)]).into_response()
}

async fn token_handler(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.hits.token.fetch_add(1, Ordering::SeqCst);
    let code = status(state.behavior.token_status);
    if !code.is_success() {
        return oauth_error(code, "unauthorized_client");
    }

    let field = |key: &str| form.get(key).map(String::as_str).unwrap_or_default();
    if field("grant_type") != "authorization_code"
        || field("client_id") != CLIENT_ID
        || field("redirect_uri") != "https://portal.example"
        || !matches!(field("code"), "ABC123" | "LOCAL")
    {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant");
    }

    let expected = state.challenge.lock().unwrap().clone();
    if expected.as_deref() != Some(compute_challenge(field("code_verifier")).as_str()) {
        return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant");
    }

    Json(json!({
        "access_token": "BEARER-XYZ",
        "token_type": "Bearer",
        "expires_in": 7199,
    }))
    .into_response()
}

async fn landing_handler(State(state): State<Arc<MockState>>) -> Response {
    state.hits.landing.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK.into_response()
}
