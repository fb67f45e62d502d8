//! Username/password session authentication
//!
//! First network step of the flow. The identity provider's MFA validation
//! endpoint accepts the account credentials as a form post and answers with
//! a short-lived session token, which the authorization endpoint then accepts
//! in place of an interactive login.

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::endpoints::AuthEndpoints;
use crate::error::{Error, Result};
use crate::http::failure_detail;

#[derive(Debug, Deserialize)]
struct SessionResponse {
    access_token: String,
}

/// Exchange username/password for a session token.
///
/// Any non-2xx answer is a `Credential` error; there is no retry here.
pub async fn authenticate(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    username: &str,
    password: &Secret<String>,
) -> Result<String> {
    let response = client
        .post(endpoints.session_url())
        .form(&[
            ("username", username),
            ("password", password.expose().as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("session request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Credential(format!(
            "session endpoint returned {}",
            failure_detail(response).await
        )));
    }

    let session = response
        .json::<SessionResponse>()
        .await
        .map_err(|e| Error::Credential(format!("invalid session response: {e}")))?;

    debug!(username, "session token issued");
    Ok(session.access_token)
}
