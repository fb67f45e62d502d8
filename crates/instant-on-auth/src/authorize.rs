//! Authorization code request
//!
//! Presents the session token and PKCE challenge to the authorization
//! endpoint. A successful request answers with a 3xx whose `Location` points
//! at the portal with `?code=...`; the redirect is never followed, the code is
//! read straight from the header.

use reqwest::header::LOCATION;
use tracing::debug;
use url::Url;

use crate::endpoints::AuthEndpoints;
use crate::error::{Error, Result};
use crate::http::failure_detail;
use crate::pkce::generate_state;

/// Build the authorization URL for one request.
pub fn build_authorization_url(
    endpoints: &AuthEndpoints,
    client_id: &str,
    session_token: &str,
    code_challenge: &str,
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(&endpoints.authorize_url())
        .map_err(|e| Error::Endpoint(format!("{}: {e}", endpoints.authorize_url())))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", &endpoints.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &endpoints.scope)
        .append_pair("state", state)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", code_challenge)
        .append_pair("sessionToken", session_token);
    Ok(url)
}

/// Request an authorization code. A fresh state value is drawn per call.
///
/// Errors:
/// - `RedirectProtocol` when the response is not a redirect or its
///   `Location` is absent or unparseable
/// - `MissingAuthCode` when the redirect has no `code` parameter
pub async fn get_auth_code(
    client: &reqwest::Client,
    endpoints: &AuthEndpoints,
    client_id: &str,
    session_token: &str,
    code_challenge: &str,
) -> Result<String> {
    let state = generate_state();
    let url = build_authorization_url(endpoints, client_id, session_token, code_challenge, &state)?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::Http(format!("authorization request failed: {e}")))?;

    let status = response.status();
    if !status.is_redirection() {
        return Err(Error::RedirectProtocol(format!(
            "expected redirect, authorization endpoint returned {}",
            failure_detail(response).await
        )));
    }

    let location = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| Error::RedirectProtocol(format!("{status} without Location header")))?
        .to_str()
        .map_err(|e| Error::RedirectProtocol(format!("Location header is not valid text: {e}")))?;

    let code = extract_code(&url, location)?;
    debug!(%status, "authorization code received");
    Ok(code)
}

/// Pull the first non-empty `code` query value out of a redirect target.
///
/// Relative locations resolve against the authorization URL.
pub fn extract_code(base: &Url, location: &str) -> Result<String> {
    let target = base
        .join(location)
        .map_err(|e| Error::RedirectProtocol(format!("unparseable Location {location:?}: {e}")))?;

    if let Some((_, code)) = target
        .query_pairs()
        .find(|(key, value)| key == "code" && !value.is_empty())
    {
        return Ok(code.into_owned());
    }

    let reason = target
        .query_pairs()
        .find(|(key, _)| key == "error")
        .map(|(_, value)| format!("provider error {value:?}"))
        .unwrap_or_else(|| String::from("no code parameter"));
    Err(Error::MissingAuthCode(format!("{reason} in {}", redact_query(&target))))
}

/// Location minus its query string, for error messages.
fn redact_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
