//! Instance gauges, startup latency, and the instance half of the startup
//! aggregation.

use serde::Deserialize;
use tracing::warn;

use crate::metrics::sink::{CounterSink, InitOutcome};
use crate::metrics::{ExporterMetrics, UNKNOWN_TAG};
use crate::names::NameCache;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceRow {
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub id: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub name: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub system: bool,
    #[serde(rename = "type", deserialize_with = "crate::rancher::nullable")]
    pub kind: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub service_ids: Vec<String>,
    /// Orchestrator-supplied timestamps in epoch milliseconds; zero when
    /// the instance never reached running.
    #[serde(rename = "firstRunningTS", deserialize_with = "crate::rancher::nullable")]
    pub first_running_ts: i64,
    #[serde(rename = "createdTS", deserialize_with = "crate::rancher::nullable")]
    pub created_ts: i64,
}

pub(super) async fn collect(state: &SharedState) {
    let result = state
        .client
        .for_each_collection::<InstanceRow, _>(
            &state.project.id,
            "instances",
            state.config.hide_sys,
            |row| {
                let (stack_name, service_name) = ancestry(&state.names, &row);
                apply(&state.metrics, &state.project.name, &stack_name, &service_name, row);
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to collect instance metrics");
    }
}

/// Resolve an instance's stack and service names through the service map
/// the snapshot pass recorded just before this one.
fn ancestry(names: &NameCache, row: &InstanceRow) -> (String, String) {
    match row.service_ids.first().and_then(|id| names.service(id)) {
        Some(service) => (service.stack_name, service.service_name),
        None => {
            warn!(instance = %row.id, "no service recorded for instance");
            (UNKNOWN_TAG.to_string(), UNKNOWN_TAG.to_string())
        }
    }
}

fn apply(
    metrics: &ExporterMetrics,
    project: &str,
    stack_name: &str,
    service_name: &str,
    row: InstanceRow,
) {
    let system = row.system.to_string();
    let labels: [&str; 6] = [project, stack_name, service_name, &row.name, &system, &row.kind];

    metrics.instance_heartbeat.with_label_values(&labels).set(1.0);

    if row.first_running_ts != 0 {
        metrics
            .instance_bootstrap_ms
            .with_label_values(&labels)
            .set((row.first_running_ts - row.created_ts) as f64);
    }
}

pub(super) async fn seed(state: &SharedState, sink: &CounterSink) {
    let result = state
        .client
        .for_each_collection::<InstanceRow, _>(
            &state.project.id,
            "instances",
            state.config.hide_sys,
            |row| {
                let (stack_name, service_name) = ancestry(&state.names, &row);
                seed_row(
                    &state.metrics,
                    &state.project.name,
                    sink,
                    &stack_name,
                    &service_name,
                    &row,
                );
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to seed instance counters");
    }
}

fn seed_row(
    metrics: &ExporterMetrics,
    project: &str,
    sink: &CounterSink,
    stack_name: &str,
    service_name: &str,
    row: &InstanceRow,
) {
    sink.touch_instance(stack_name, service_name, &row.name);

    // An instance that reached stopped or running has initialized.
    if matches!(row.state.as_str(), "stopped" | "running") {
        sink.instance_initialized(stack_name, service_name, &row.name, InitOutcome::Success);

        if row.first_running_ts != 0 {
            let system = row.system.to_string();
            metrics
                .instance_bootstrap_ms
                .with_label_values(&[
                    project,
                    stack_name,
                    service_name,
                    &row.name,
                    &system,
                    &row.kind,
                ])
                .set((row.first_running_ts - row.created_ts) as f64);
        }
    }
}
