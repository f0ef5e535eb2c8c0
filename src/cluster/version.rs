//! Cluster version gate.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MigrationError;
use crate::oc::{CommandExecutor, OcCommand, PollConfig, sleep_or_cancel, until_cancelled};

/// First minor release of 4.x that can suppress automatic feature migration.
const AUTO_DISABLE_MIN_MINOR: u32 = 12;
const SUPPORTED_MAJOR: u32 = 4;

/// Parsed `major.minor` of the most recent cluster version history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterVersion {
    pub major: u32,
    pub minor: u32,
}

impl ClusterVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One `status.history[]` entry of the `ClusterVersion` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterVersionObject {
    #[serde(default)]
    status: ClusterVersionStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterVersionStatus {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// Parse a version string that must start with `<digits>.<digits>`.
///
/// Anything after the minor component (patch level, pre-release tags) is ignored.
pub fn parse_version_string(version: &str) -> Result<ClusterVersion, MigrationError> {
    let invalid = || MigrationError::UnsupportedVersion(format!("malformed version '{}'", version));

    let (major, rest) = split_leading_digits(version).ok_or_else(invalid)?;
    let rest = rest.strip_prefix('.').ok_or_else(invalid)?;
    let (minor, _) = split_leading_digits(rest).ok_or_else(invalid)?;

    Ok(ClusterVersion {
        major: major.parse().map_err(|_| invalid())?,
        minor: minor.parse().map_err(|_| invalid())?,
    })
}

fn split_leading_digits(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s.split_at(end))
}

/// Derive the current version from the history; the first entry is the most recent.
pub fn version_from_history(history: &[HistoryEntry]) -> Result<ClusterVersion, MigrationError> {
    let latest = history.first().ok_or_else(|| {
        MigrationError::VersionUnavailable(
            "no version history found in cluster version object".to_string(),
        )
    })?;
    parse_version_string(&latest.version)
}

/// Parse the JSON output of `oc get clusterversion version -o json`.
pub fn parse_cluster_version(json: &str) -> Result<ClusterVersion, MigrationError> {
    let object: ClusterVersionObject = serde_json::from_str(json).map_err(|e| {
        MigrationError::VersionUnavailable(format!("unreadable cluster version object: {}", e))
    })?;
    version_from_history(&object.status.history)
}

/// Whether automatic migration of legacy SDN features can be disabled.
///
/// Only 4.x is understood; any other major version is an error rather than a guess.
pub fn is_migration_auto_disable_supported(
    version: &ClusterVersion,
) -> Result<bool, MigrationError> {
    if version.major != SUPPORTED_MAJOR {
        return Err(MigrationError::UnsupportedVersion(format!(
            "{} (only {}.x clusters are supported)",
            version, SUPPORTED_MAJOR
        )));
    }
    Ok(version.minor >= AUTO_DISABLE_MIN_MINOR)
}

/// Query the cluster version, retrying failed queries until `poll.timeout` elapses.
///
/// Parse failures are not retried.
pub async fn current_version(
    executor: &dyn CommandExecutor,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<ClusterVersion, MigrationError> {
    let command = OcCommand::get_json("clusterversion", Some("version"), None);
    let start = Instant::now();
    let mut last_error = String::from("query never attempted");

    while start.elapsed() < poll.timeout {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        match until_cancelled(executor.execute(&command), cancel).await {
            Ok(output) if output.is_success() => {
                let version = parse_cluster_version(&output.stdout)?;
                info!(version = %version, "Detected cluster version");
                return Ok(version);
            }
            Ok(output) => last_error = output.stderr,
            Err(e) if e.is_transient() => last_error = e.to_string(),
            Err(e) => return Err(e),
        }

        warn!(error = %last_error, "Failed to get cluster version, retrying");
        sleep_or_cancel(poll.interval.max(Duration::from_millis(1)), cancel).await?;
    }

    debug!(
        elapsed_secs = start.elapsed().as_secs(),
        "Cluster version query timed out"
    );
    Err(MigrationError::VersionUnavailable(format!(
        "query did not succeed within {}s: {}",
        poll.timeout.as_secs(),
        last_error
    )))
}
