//! Snapshot pass — per-scrape refresh of the current-state gauges, plus
//! the one-shot startup aggregation that seeds the counter families.
//!
//! Distinct from the event-driven classifier: this pass paginates the REST
//! collections on every scrape and rewrites gauges wholesale. A failed
//! collection logs a warning and leaves that family sparse for the scrape;
//! it is never fatal.

pub mod hosts;
pub mod instances;
pub mod services;
pub mod stacks;

use crate::metrics::sink::CounterSink;
use crate::state::SharedState;

/// Health states every stack/service health gauge fans out over.
pub(crate) const HEALTH_STATES: &[&str] = &["healthy", "unhealthy"];

/// Refresh all current-state gauges from the orchestrator.
///
/// Hosts are independent of the name hierarchy and collected concurrently;
/// stacks, services and instances chain because each level resolves names
/// recorded by the previous one.
pub async fn refresh(state: &SharedState) {
    let _gate = state.snapshot_gate.lock().await;
    state.metrics.reset_snapshot();

    let host_pass = hosts::collect(state);
    let hierarchy_pass = async {
        stacks::collect(state).await;
        services::collect(state).await;
        instances::collect(state).await;
    };
    tokio::join!(host_pass, hierarchy_pass);
}

/// Boot-time aggregation: zero-materialize the bootstrap counter rows of
/// every known entity, derive the initialization counter families from
/// current REST state, and warm the name cache.
pub async fn seed(state: &SharedState, sink: &CounterSink) {
    stacks::seed(state, sink).await;
    services::seed(state, sink).await;
    instances::seed(state, sink).await;
}
