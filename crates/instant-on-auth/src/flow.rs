//! Token orchestration
//!
//! Runs the four network steps in a fixed order and hands back the bearer
//! token. The sequence is a straight line:
//!
//! `Start → VerifierGenerated → SessionAuthenticated → ClientIdResolved →
//! AuthCodeObtained → TokenObtained`
//!
//! with a single exit to `Failed` from any step. The first error aborts the
//! run and is returned unchanged; nothing is retried or cached, so every
//! `get_token()` call performs the whole sequence.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::{debug, info, instrument, warn};

use crate::endpoints::AuthEndpoints;
use crate::error::Result;
use crate::http::build_http_client;
use crate::pkce::generate_verifier_and_challenge;
use crate::{authorize, client_id, session, token};

/// Position within one token flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Start,
    VerifierGenerated,
    SessionAuthenticated,
    ClientIdResolved,
    AuthCodeObtained,
    /// Terminal success
    TokenObtained,
    /// Terminal failure
    Failed,
}

impl FlowState {
    /// State reached when the step leaving `self` succeeds.
    /// Terminal states map to themselves.
    pub fn advance(self) -> FlowState {
        match self {
            FlowState::Start => FlowState::VerifierGenerated,
            FlowState::VerifierGenerated => FlowState::SessionAuthenticated,
            FlowState::SessionAuthenticated => FlowState::ClientIdResolved,
            FlowState::ClientIdResolved => FlowState::AuthCodeObtained,
            FlowState::AuthCodeObtained => FlowState::TokenObtained,
            FlowState::TokenObtained => FlowState::TokenObtained,
            FlowState::Failed => FlowState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::TokenObtained | FlowState::Failed)
    }

    /// Apply a step outcome: advance on success, drop to `Failed` on error.
    fn record<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                let next = self.advance();
                debug!(from = ?*self, to = ?next, "token flow transition");
                *self = next;
                Ok(value)
            }
            Err(e) => {
                warn!(from = ?*self, kind = e.kind(), error = %e, "token flow failed");
                *self = FlowState::Failed;
                Err(e)
            }
        }
    }
}

/// Account credentials for session authentication.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

/// Something that can produce a bearer token on demand.
///
/// Uses `Pin<Box<dyn Future>>` so the relay can hold an `Arc<dyn TokenSource>`.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Sequences PKCE generation, session auth, client id lookup, authorization
/// and token exchange into one call.
pub struct TokenOrchestrator {
    client: reqwest::Client,
    endpoints: AuthEndpoints,
    credentials: Credentials,
}

impl TokenOrchestrator {
    /// Build an orchestrator with its own redirect-free client.
    pub fn new(endpoints: AuthEndpoints, credentials: Credentials, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(
            build_http_client(timeout)?,
            endpoints,
            credentials,
        ))
    }

    /// Use a caller-supplied client. It must not follow redirects.
    pub fn with_client(
        client: reqwest::Client,
        endpoints: AuthEndpoints,
        credentials: Credentials,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
        }
    }

    /// Run the full flow and return a fresh bearer token.
    #[instrument(skip_all, fields(username = %self.credentials.username))]
    pub async fn get_token(&self) -> Result<String> {
        let mut state = FlowState::Start;
        let outcome = self.run(&mut state).await;

        match &outcome {
            Ok(_) => {
                metrics::counter!("token_acquisitions_total", "outcome" => "success").increment(1);
                info!("bearer token acquired");
            }
            Err(e) => {
                metrics::counter!("token_acquisitions_total", "outcome" => e.kind()).increment(1);
            }
        }
        outcome
    }

    async fn run(&self, state: &mut FlowState) -> Result<String> {
        let client = &self.client;
        let endpoints = &self.endpoints;

        let pkce = state.record(Ok(generate_verifier_and_challenge()))?;

        let session_token = state.record(
            session::authenticate(
                client,
                endpoints,
                &self.credentials.username,
                &self.credentials.password,
            )
            .await,
        )?;

        let client_id = state.record(client_id::get_client_id(client, endpoints).await)?;

        let auth_code = state.record(
            authorize::get_auth_code(
                client,
                endpoints,
                &client_id,
                &session_token,
                &pkce.challenge,
            )
            .await,
        )?;

        state.record(
            token::get_bearer_token(client, endpoints, &client_id, &auth_code, &pkce.verifier)
                .await,
        )
    }
}

impl TokenSource for TokenOrchestrator {
    fn bearer_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.get_token())
    }
}
