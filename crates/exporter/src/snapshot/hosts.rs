//! Host gauges — `host_state` and `host_agent_state`.

use serde::Deserialize;
use tracing::warn;

use crate::metrics::ExporterMetrics;
use crate::state::SharedState;

pub(crate) const HOST_STATES: &[&str] = &[
    "activating",
    "active",
    "deactivating",
    "error",
    "erroring",
    "inactive",
    "provisioned",
    "purged",
    "purging",
    "registering",
    "removed",
    "removing",
    "requested",
    "restoring",
    "updating_active",
    "updating_inactive",
];

pub(crate) const AGENT_STATES: &[&str] = &[
    "activating",
    "active",
    "reconnecting",
    "disconnected",
    "disconnecting",
    "finishing-reconnect",
    "reconnected",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostRow {
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub id: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub name: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub hostname: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub agent_state: String,
}

pub(super) async fn collect(state: &SharedState) {
    let metrics = &state.metrics;
    let result = state
        .client
        .for_each_collection::<HostRow, _>(
            &state.project.id,
            "hosts",
            state.config.hide_sys,
            |row| apply(metrics, row),
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to collect host metrics");
    }
}

fn apply(metrics: &ExporterMetrics, row: HostRow) {
    // Hosts registered without a display name fall back to their hostname.
    let name = if row.name.is_empty() {
        row.hostname.as_str()
    } else {
        row.name.as_str()
    };

    for known in HOST_STATES {
        let active = if row.state == *known { 1.0 } else { 0.0 };
        metrics
            .host_state
            .with_label_values(&[row.id.as_str(), name, *known])
            .set(active);
    }
    for known in AGENT_STATES {
        let active = if row.agent_state == *known { 1.0 } else { 0.0 };
        metrics
            .host_agent_state
            .with_label_values(&[row.id.as_str(), name, *known])
            .set(active);
    }
}
