//! Periodic problem-alert snapshots
//!
//! A background task that, every `interval`, collects the alerts of every
//! problem site and overwrites a single JSON snapshot file. Failures never
//! stop the loop: each one is appended as a line to a plain-text error log
//! and the next cycle tries again.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::metrics;
use crate::relay::{RelayState, SiteEndpoint};

/// Contents of the snapshot file.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub generated_at_ms: u64,
    pub sites: Vec<SiteAlerts>,
}

#[derive(Debug, Serialize)]
pub struct SiteAlerts {
    pub id: String,
    pub name: String,
    pub alerts: serde_json::Value,
}

/// Where the task writes its output.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub snapshot: PathBuf,
    pub error_log: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("writing snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Spawn the snapshot loop. The first cycle runs immediately.
pub fn spawn_snapshot_task(
    relay: RelayState,
    paths: SnapshotPaths,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            snapshot_cycle(&relay, &paths).await;
        }
    })
}

/// Run one cycle: build and write a snapshot, or log why not.
pub async fn snapshot_cycle(relay: &RelayState, paths: &SnapshotPaths) {
    let outcome = match build_snapshot(relay).await {
        Ok(snapshot) => write_snapshot(&paths.snapshot, &snapshot)
            .await
            .map(|()| snapshot.sites.len()),
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(sites) => {
            metrics::record_snapshot("success");
            info!(sites, path = %paths.snapshot.display(), "alert snapshot written");
        }
        Err(e) => {
            metrics::record_snapshot("failure");
            warn!(error = %e, "alert snapshot failed");
            if let Err(log_err) = append_error_log(&paths.error_log, &e.to_string()).await {
                warn!(
                    error = %log_err,
                    path = %paths.error_log.display(),
                    "failed to append to snapshot error log"
                );
            }
        }
    }
}

/// Alerts of every problem site. Any failed fetch fails the whole snapshot.
pub async fn build_snapshot(relay: &RelayState) -> Result<Snapshot, RelayError> {
    let problem_sites = relay.problem_sites().await?;
    let mut sites = Vec::with_capacity(problem_sites.len());

    for site in problem_sites {
        let alerts = relay.fetch_site_data(&site.id, SiteEndpoint::Alerts).await?;
        debug!(site_id = %site.id, "collected site alerts");
        sites.push(SiteAlerts {
            id: site.id,
            name: site.name,
            alerts,
        });
    }

    Ok(Snapshot {
        generated_at_ms: now_millis(),
        sites,
    })
}

/// Replace the snapshot file atomically (temp file + rename).
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(snapshot)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("snapshot"));
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), "persisted snapshot");
    Ok(())
}

/// Append `<unix_ms> <message>` to the error log, creating it if needed.
pub async fn append_error_log(path: &Path, message: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let line = format!("{} {}\n", now_millis(), message.replace('\n', " "));
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::test_support::StaticTokens;
    use axum::extract::Path as UrlPath;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Upstream with one problem site (`s1`) and one nameless healthy site.
    async fn start_sites_api() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route(
                "/sites",
                get(|| async {
                    Json(json!({
                        "elements": [
                            {"id": "s1", "name": "HQ", "health": "problem"},
                            {"id": "s2", "health": "good"},
                        ]
                    }))
                }),
            )
            .route(
                "/sites/{id}/alerts",
                get(|UrlPath(id): UrlPath<String>| async move {
                    Json(json!({ "elements": [{ "site": id, "severity": "major" }] }))
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        url
    }

    fn relay(api_url: &str, tokens: StaticTokens) -> RelayState {
        RelayState {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            timeout: Duration::from_secs(5),
            tokens: Arc::new(tokens),
        }
    }

    fn paths(dir: &tempfile::TempDir) -> SnapshotPaths {
        SnapshotPaths {
            snapshot: dir.path().join("alerts.json"),
            error_log: dir.path().join("errors.log"),
        }
    }

    #[tokio::test]
    async fn cycle_writes_problem_site_alerts() {
        let api = start_sites_api().await;
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);

        snapshot_cycle(&relay(&api, StaticTokens::ok("t")), &paths).await;

        let contents = tokio::fs::read_to_string(&paths.snapshot).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let sites = json["sites"].as_array().unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0]["id"], "s1");
        assert_eq!(sites[0]["alerts"]["elements"][0]["site"], "s1");
        assert!(json["generated_at_ms"].as_u64().unwrap() > 0);
        assert!(!paths.error_log.exists());
    }

    #[tokio::test]
    async fn later_cycle_replaces_snapshot() {
        let api = start_sites_api().await;
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        tokio::fs::write(&paths.snapshot, "stale").await.unwrap();

        snapshot_cycle(&relay(&api, StaticTokens::ok("t")), &paths).await;

        let contents = tokio::fs::read_to_string(&paths.snapshot).await.unwrap();
        assert!(contents.contains("\"sites\""));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp file must be renamed away");
    }

    #[tokio::test]
    async fn failures_append_to_error_log_and_keep_old_snapshot() {
        let api = start_sites_api().await;
        let dir = tempfile::tempdir().unwrap();
        let paths = paths(&dir);
        tokio::fs::write(&paths.snapshot, "previous").await.unwrap();

        let failing = relay(&api, StaticTokens::failing());
        snapshot_cycle(&failing, &paths).await;
        snapshot_cycle(&failing, &paths).await;

        let log = tokio::fs::read_to_string(&paths.error_log).await.unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("token acquisition failed"), "got: {}", lines[0]);
        let (stamp, _) = lines[0].split_once(' ').unwrap();
        assert!(stamp.parse::<u64>().is_ok());

        let snapshot = tokio::fs::read_to_string(&paths.snapshot).await.unwrap();
        assert_eq!(snapshot, "previous");
    }

    #[tokio::test]
    async fn error_log_lines_stay_single_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.log");
        append_error_log(&path, "first\nsecond").await.unwrap();
        let log = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.ends_with("first second\n"));
    }
}
