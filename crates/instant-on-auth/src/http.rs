//! Shared HTTP client for the token flow

use std::time::Duration;

use crate::error::{Error, Result};

/// Build the client used by every step of the flow.
///
/// Redirects must stay disabled: the authorization code is read from the
/// `Location` header of the 3xx response, which a following client would
/// swallow.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))
}

/// `"<status>: <body>"` for a non-success response.
pub(crate) async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    format!("{status}: {body}")
}
