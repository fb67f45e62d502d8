//! Sites API relay
//!
//! Fetches site data from the Instant On cloud API with a freshly acquired
//! bearer token per upstream call, and reshapes the site list into the
//! problem-site summary served at `/sites`.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use instant_on_auth::TokenSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{RelayError, truncate_body};

/// Per-site resources proxied from `/sites/{id}/<segment>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteEndpoint {
    Details,
    Dashboard,
    DeviceStacks,
    Capabilities,
    Inventory,
    GraphTopology,
    Alerts,
}

impl SiteEndpoint {
    pub const ALL: [SiteEndpoint; 7] = [
        SiteEndpoint::Details,
        SiteEndpoint::Dashboard,
        SiteEndpoint::DeviceStacks,
        SiteEndpoint::Capabilities,
        SiteEndpoint::Inventory,
        SiteEndpoint::GraphTopology,
        SiteEndpoint::Alerts,
    ];

    /// Upstream path segment after `/sites/{id}`; empty for the site itself.
    pub fn segment(self) -> &'static str {
        match self {
            SiteEndpoint::Details => "",
            SiteEndpoint::Dashboard => "dashboard",
            SiteEndpoint::DeviceStacks => "deviceStacks",
            SiteEndpoint::Capabilities => "capabilities",
            SiteEndpoint::Inventory => "inventory",
            SiteEndpoint::GraphTopology => "graphTopology",
            SiteEndpoint::Alerts => "alerts",
        }
    }

    /// First path component of the local route.
    pub fn route_name(self) -> &'static str {
        match self {
            SiteEndpoint::Details => "sites",
            other => other.segment(),
        }
    }

    /// Local link for a site, e.g. `/dashboard/abc`.
    pub fn link(self, site_id: &str) -> String {
        format!("/{}/{site_id}", self.route_name())
    }
}

/// Request counters surfaced by `/health`.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Everything needed to call the sites API.
#[derive(Clone)]
pub struct RelayState {
    pub client: reqwest::Client,
    pub api_url: String,
    pub timeout: Duration,
    pub tokens: Arc<dyn TokenSource>,
}

/// Site listing. Elements stay untyped until the health filter has run:
/// only problem sites are required to carry an id and a name.
#[derive(Debug, Deserialize)]
struct SitesPage {
    #[serde(default)]
    elements: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Site {
    id: String,
    name: String,
    #[serde(rename = "configuredLocation", default)]
    configured_location: serde_json::Value,
}

/// Entry of the `/sites` listing: a problem site plus links to its resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub configured_location: serde_json::Value,
    pub dashboard: String,
    pub device_stacks: String,
    pub capabilities: String,
    pub inventory: String,
    pub graph_topology: String,
    pub details: String,
    pub alerts: String,
}

impl SiteSummary {
    fn from_site(site: Site) -> Self {
        let id = site.id;
        Self {
            dashboard: SiteEndpoint::Dashboard.link(&id),
            device_stacks: SiteEndpoint::DeviceStacks.link(&id),
            capabilities: SiteEndpoint::Capabilities.link(&id),
            inventory: SiteEndpoint::Inventory.link(&id),
            graph_topology: SiteEndpoint::GraphTopology.link(&id),
            details: SiteEndpoint::Details.link(&id),
            alerts: SiteEndpoint::Alerts.link(&id),
            name: site.name,
            configured_location: site.configured_location,
            id,
        }
    }
}

/// Site ids go into the upstream path; accept only URL-safe identifiers.
pub fn validate_site_id(site_id: &str) -> Result<(), RelayError> {
    let valid = !site_id.is_empty()
        && site_id.len() <= 128
        && site_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RelayError::InvalidSiteId(site_id.to_owned()))
    }
}

impl RelayState {
    /// GET `{api_url}{path}` with a fresh bearer token and parse the JSON body.
    #[instrument(skip(self))]
    pub async fn fetch_json(&self, path: &str) -> Result<serde_json::Value, RelayError> {
        let token = self.tokens.bearer_token().await?;
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout(self.timeout)
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(RelayError::Upstream {
                status,
                body: truncate_body(body),
            });
        }

        debug!(%status, "upstream call succeeded");
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| RelayError::InvalidResponse(e.to_string()))
    }

    /// One site's resource, relayed as-is.
    pub async fn fetch_site_data(
        &self,
        site_id: &str,
        endpoint: SiteEndpoint,
    ) -> Result<serde_json::Value, RelayError> {
        validate_site_id(site_id)?;
        let path = match endpoint.segment() {
            "" => format!("/sites/{site_id}"),
            segment => format!("/sites/{site_id}/{segment}"),
        };
        self.fetch_json(&path).await
    }

    /// Sites whose health is `problem`, with links to their resources.
    pub async fn problem_sites(&self) -> Result<Vec<SiteSummary>, RelayError> {
        let page: SitesPage = serde_json::from_value(self.fetch_json("/sites").await?)
            .map_err(|e| RelayError::InvalidResponse(format!("site list: {e}")))?;
        filter_problem_sites(page)
    }

    pub async fn global_alerts(&self) -> Result<serde_json::Value, RelayError> {
        self.fetch_json("/globalAlerts").await
    }
}

fn filter_problem_sites(page: SitesPage) -> Result<Vec<SiteSummary>, RelayError> {
    page.elements
        .into_iter()
        .filter(|site| site.get("health").and_then(|h| h.as_str()) == Some("problem"))
        .map(|site| {
            serde_json::from_value::<Site>(site)
                .map(SiteSummary::from_site)
                .map_err(|e| RelayError::InvalidResponse(format!("problem site: {e}")))
        })
        .collect()
}
