//! Authorization code redemption
//!
//! Last step of the flow: POST the code together with the PKCE verifier to
//! the token endpoint. The identity provider checks the verifier against the
//! challenge it saw during authorization and answers with the bearer token.

use serde::Deserialize;
use tracing::debug;

use crate::endpoints::AuthEndpoints;
use crate::error::{Error, Result};
use crate::http::failure_detail;

/// Token endpoint response. Only `access_token` is used; the token is
/// never refreshed, so refresh fields are ignored.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Redeem an authorization code for a bearer token.
pub async fn get_bearer_token(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    client_id: &str,
    auth_code: &str,
    code_verifier: &str,
) -> Result<String> {
    let response = client
        .post(endpoints.token_url())
        .form(&[
            ("client_id", client_id),
            ("redirect_uri", endpoints.redirect_uri.as_str()),
            ("code", auth_code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {}",
            failure_detail(response).await
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

    debug!(
        token_type = token.token_type.as_deref().unwrap_or("unknown"),
        expires_in = token.expires_in,
        "bearer token issued"
    );
    Ok(token.access_token)
}
