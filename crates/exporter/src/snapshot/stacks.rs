//! Stack gauges and the stack half of the startup aggregation.

use serde::Deserialize;
use tracing::warn;

use crate::metrics::sink::{CounterSink, InitOutcome};
use crate::metrics::ExporterMetrics;
use crate::state::SharedState;

use super::HEALTH_STATES;

pub(crate) const STACK_STATES: &[&str] = &[
    "activating",
    "active",
    "canceled_upgrade",
    "canceling_upgrade",
    "error",
    "erroring",
    "finishing_upgrade",
    "removed",
    "removing",
    "requested",
    "restarting",
    "rolling_back",
    "updating_active",
    "upgraded",
    "upgrading",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StackRow {
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub id: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub name: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub health_state: String,
    #[serde(deserialize_with = "crate::rancher::nullable")]
    pub system: bool,
    #[serde(rename = "type", deserialize_with = "crate::rancher::nullable")]
    pub kind: String,
}

pub(super) async fn collect(state: &SharedState) {
    let result = state
        .client
        .for_each_collection::<StackRow, _>(
            &state.project.id,
            "stacks",
            state.config.hide_sys,
            |row| {
                state.names.record_stack(&row.id, &row.name);
                apply(&state.metrics, &state.project.name, row);
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to collect stack metrics");
    }
}

fn apply(metrics: &ExporterMetrics, project: &str, row: StackRow) {
    let system = row.system.to_string();

    for known in HEALTH_STATES {
        let active = if row.health_state == *known { 1.0 } else { 0.0 };
        metrics
            .stack_health
            .with_label_values(&[row.id.as_str(), row.name.as_str(), *known, system.as_str()])
            .set(active);
    }
    for known in STACK_STATES {
        let active = if row.state == *known { 1.0 } else { 0.0 };
        metrics
            .stack_state
            .with_label_values(&[row.id.as_str(), row.name.as_str(), *known, system.as_str()])
            .set(active);
    }
    metrics
        .stack_heartbeat
        .with_label_values(&[project, &row.name, &system, &row.kind])
        .set(1.0);
}

pub(super) async fn seed(state: &SharedState, sink: &CounterSink) {
    let result = state
        .client
        .for_each_collection::<StackRow, _>(
            &state.project.id,
            "stacks",
            state.config.hide_sys,
            |row| {
                state.names.record_stack(&row.id, &row.name);
                seed_row(sink, &row);
            },
        )
        .await;
    if let Err(e) = result {
        warn!(error = %e, "failed to seed stack counters");
    }
}

fn seed_row(sink: &CounterSink, row: &StackRow) {
    sink.touch_stack(&row.name);
    match (row.state.as_str(), row.health_state.as_str()) {
        ("active", "healthy") => sink.stack_initialized(&row.name, InitOutcome::Success),
        ("active", "unhealthy") => sink.stack_initialized(&row.name, InitOutcome::Failure),
        ("error", _) => sink.stack_initialized(&row.name, InitOutcome::Failure),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::family_value;
    use crate::metrics::ALL_TAG;
    use std::sync::Arc;

    #[test]
    fn gauges_fan_out_over_states_and_health() {
        let metrics = ExporterMetrics::new().unwrap();
        apply(
            &metrics,
            "Default",
            StackRow {
                id: "1st1".to_string(),
                name: "web".to_string(),
                state: "upgrading".to_string(),
                health_state: "healthy".to_string(),
                system: false,
                kind: "stack".to_string(),
            },
        );

        assert_eq!(
            family_value(
                &metrics,
                "rancher_stack_state",
                &[("id", "1st1"), ("name", "web"), ("state", "upgrading"), ("system", "false")],
            ),
            Some(1.0)
        );
        assert_eq!(
            family_value(
                &metrics,
                "rancher_stack_state",
                &[("id", "1st1"), ("name", "web"), ("state", "active"), ("system", "false")],
            ),
            Some(0.0)
        );
        assert_eq!(
            family_value(
                &metrics,
                "rancher_stack_health_status",
                &[("id", "1st1"), ("name", "web"), ("health_state", "healthy"), ("system", "false")],
            ),
            Some(1.0)
        );
        assert_eq!(
            family_value(
                &metrics,
                "rancher_stack_heartbeat",
                &[
                    ("environment_name", "Default"),
                    ("name", "web"),
                    ("system", "false"),
                    ("type", "stack"),
                ],
            ),
            Some(1.0)
        );
    }

    #[test]
    fn seed_counts_current_state_and_touches_bootstrap_rows() {
        let metrics = Arc::new(ExporterMetrics::new().unwrap());
        let sink = CounterSink::new(Arc::clone(&metrics), "Default".to_string());

        seed_row(
            &sink,
            &StackRow {
                name: "web".to_string(),
                state: "active".to_string(),
                health_state: "healthy".to_string(),
                ..StackRow::default()
            },
        );
        seed_row(
            &sink,
            &StackRow {
                name: "jobs".to_string(),
                state: "activating".to_string(),
                ..StackRow::default()
            },
        );

        let labels = |name| [("environment_name", "Default"), ("name", name)];
        assert_eq!(
            family_value(&metrics, "rancher_stacks_initialization_success_total", &labels("web")),
            Some(1.0)
        );
        // A stack still activating contributes no initialization outcome…
        assert_eq!(
            family_value(&metrics, "rancher_stacks_initialization_total", &labels("jobs")),
            None
        );
        // …but its bootstrap rows exist at zero for scrape visibility.
        assert_eq!(
            family_value(&metrics, "rancher_stacks_bootstrap_total", &labels("jobs")),
            Some(0.0)
        );
        assert_eq!(
            family_value(&metrics, "rancher_stacks_initialization_total", &labels(ALL_TAG)),
            Some(1.0)
        );
    }
}
