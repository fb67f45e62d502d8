//! Instant On single-sign-on client
//!
//! Acquires a bearer token for the Instant On cloud API by driving the
//! vendor's OAuth2 authorization-code flow with PKCE, without a browser.
//! Each token request runs the whole flow; nothing is cached.
//!
//! Token flow:
//! 1. `pkce::generate_verifier_and_challenge()` creates the verifier pair
//! 2. `session::authenticate()` trades username/password for a session token
//! 3. `client_id::get_client_id()` reads the OAuth client id from `settings.json`
//! 4. `authorize::get_auth_code()` presents session token + challenge and
//!    pulls the code out of the (unfollowed) redirect
//! 5. `token::get_bearer_token()` redeems code + verifier for the bearer token
//!
//! `flow::TokenOrchestrator` sequences the steps and is the entry point
//! used by the relay service.

pub mod authorize;
pub mod client_id;
pub mod endpoints;
pub mod error;
pub mod flow;
pub mod http;
pub mod pkce;
pub mod session;
pub mod token;

#[cfg(test)]
mod test_support;

pub use endpoints::AuthEndpoints;
pub use error::{Error, Result};
pub use flow::{Credentials, FlowState, TokenOrchestrator, TokenSource};
pub use http::build_http_client;
pub use pkce::{PkcePair, compute_challenge, generate_verifier, generate_verifier_and_challenge};
