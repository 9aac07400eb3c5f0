//! Service gauges and the service half of the startup aggregation.

use serde::Deserialize;
use tracing::warn;

use crate::metrics::sink::{CounterSink, InitOutcome};
use crate::metrics::{ExporterMetrics, UNKNOWN_TAG};
use crate::names::ServiceNames;
use crate::state::SharedState;

use super::HEALTH_STATES;

pub(crate) const SERVICE_STATES: &[&str] = &[
    "activating",
    "active",
    "canceled_upgrade",
    "canceling_upgrade",
    "deactivating",
    "finishing_upgrade",
    "inactive",
    "registering",
    "removed",
    "removing",
    "requested",
    "restarting",
    "rolling_back",
    "updating_active",
    "updating_inactive",
    "upgraded",
    "upgrading",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceRow {
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub id: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub name: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub stack_id: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub health_state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub system: bool,
    #[serde(rename = "type", deserialize_with = "crate::rancher::nullable")]
    pub kind: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub scale: i64,
}

pub(super) async fn collect(state: &SharedState) {
    let result = state
        .client
        .for_each_collection::<ServiceRow, _>(
            &state.project.id,
            "services",
            state.config.hide_sys,
            |row| {
                let stack_name = resolve_stack(state, &row.stack_id);
                state.names.record_service(
                    &row.id,
                    ServiceNames {
                        stack_name: stack_name.clone(),
                        service_name: row.name.clone(),
                    },
                );
                apply(&state.metrics, &state.project.name, &stack_name, row);
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to collect service metrics");
    }
}

fn resolve_stack(state: &SharedState, stack_id: &str) -> String {
    state
        .names
        .stack_name(stack_id)
        .unwrap_or_else(|| UNKNOWN_TAG.to_string())
}

fn apply(metrics: &ExporterMetrics, project: &str, stack_name: &str, row: ServiceRow) {
    let system = row.system.to_string();

    metrics
        .service_scale
        .with_label_values(&[&row.name, stack_name, &system])
        .set(row.scale as f64);

    for known in HEALTH_STATES {
        let active = if row.health_state == *known { 1.0 } else { 0.0 };
        metrics
            .service_health
            .with_label_values(&[&row.id, &row.stack_id, &row.name, stack_name, known, &system])
            .set(active);
    }
    for known in SERVICE_STATES {
        let active = if row.state == *known { 1.0 } else { 0.0 };
        metrics
            .service_state
            .with_label_values(&[&row.id, &row.stack_id, &row.name, stack_name, known, &system])
            .set(active);
    }
    metrics
        .service_heartbeat
        .with_label_values(&[project, stack_name, &row.name, &system, &row.kind])
        .set(1.0);
}

pub(super) async fn seed(state: &SharedState, sink: &CounterSink) {
    let result = state
        .client
        .for_each_collection::<ServiceRow, _>(
            &state.project.id,
            "services",
            state.config.hide_sys,
            |row| {
                let stack_name = resolve_stack(state, &row.stack_id);
                state.names.record_service(
                    &row.id,
                    ServiceNames {
                        stack_name: stack_name.clone(),
                        service_name: row.name.clone(),
                    },
                );
                seed_row(sink, &stack_name, &row);
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to seed service counters");
    }
}

fn seed_row(sink: &CounterSink, stack_name: &str, row: &ServiceRow) {
    sink.touch_service(stack_name, &row.name);
    match row.state.as_str() {
        "active" => match row.health_state.as_str() {
            "healthy" => sink.service_initialized(stack_name, &row.name, InitOutcome::Success),
            "unhealthy" => sink.service_initialized(stack_name, &row.name, InitOutcome::Failure),
            _ => sink.service_initialized(stack_name, &row.name, InitOutcome::Pending),
        },
        "error" => sink.service_initialized(stack_name, &row.name, InitOutcome::Failure),
        _ => {}
    }
}
