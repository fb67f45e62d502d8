//! OAuth client id lookup
//!
//! The portal publishes its public configuration as `settings.json`; the
//! client id used for the authorization request is read from it on every
//! flow run rather than hardcoded.

use serde::Deserialize;
use tracing::debug;

use crate::endpoints::AuthEndpoints;
use crate::error::{Error, Result};
use crate::http::failure_detail;

#[derive(Debug, Deserialize)]
struct PortalSettings {
    #[serde(rename = "ssoClientIdAuthZ")]
    sso_client_id_auth_z: String,
}

/// Fetch the portal's OAuth client id. No fallback value.
pub async fn get_client_id(client: &reqwest::Client, endpoints: &AuthEndpoints) -> Result<String> {
    let response = client
        .get(endpoints.settings_url())
        .send()
        .await
        .map_err(|e| Error::Http(format!("settings request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::ConfigFetch(format!(
            "settings.json returned {}",
            failure_detail(response).await
        )));
    }

    let settings = response
        .json::<PortalSettings>()
        .await
        .map_err(|e| Error::ConfigFetch(format!("invalid settings.json: {e}")))?;

    debug!(client_id = %settings.sso_client_id_auth_z, "resolved OAuth client id");
    Ok(settings.sso_client_id_auth_z)
}
