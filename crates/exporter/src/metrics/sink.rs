//! Counter sink — write-through from classifier outcomes to the registry.
//!
//! Every outcome lands on all aggregation levels of its class: stacks get a
//! wildcard row plus a named row, services three rows, instances four. A
//! `started` outcome additionally touches (creates at zero) the matching
//! success and error rows, so a scrape always sees the three families of a
//! tuple together.

use std::sync::Arc;

use prometheus::IntCounterVec;
use tracing::info;

use super::{ExporterMetrics, ALL_TAG};

/// Outcome of a one-shot initialization observation (startup aggregation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Success,
    Failure,
    /// Still initializing at observation time: counted in the total family
    /// only, with the success/error rows materialized at zero.
    Pending,
}

#[derive(Clone)]
pub struct CounterSink {
    metrics: Arc<ExporterMetrics>,
    project: String,
}

impl CounterSink {
    pub fn new(metrics: Arc<ExporterMetrics>, project: String) -> Self {
        Self { metrics, project }
    }

    fn stack_rows<'a>(&'a self, stack: &'a str) -> [[&'a str; 2]; 2] {
        [[&self.project, ALL_TAG], [&self.project, stack]]
    }

    fn service_rows<'a>(&'a self, stack: &'a str, service: &'a str) -> [[&'a str; 3]; 3] {
        [
            [&self.project, ALL_TAG, ALL_TAG],
            [&self.project, stack, ALL_TAG],
            [&self.project, stack, service],
        ]
    }

    fn instance_rows<'a>(
        &'a self,
        stack: &'a str,
        service: &'a str,
        instance: &'a str,
    ) -> [[&'a str; 4]; 4] {
        [
            [&self.project, ALL_TAG, ALL_TAG, ALL_TAG],
            [&self.project, stack, ALL_TAG, ALL_TAG],
            [&self.project, stack, service, ALL_TAG],
            [&self.project, stack, service, instance],
        ]
    }

    fn inc<const N: usize>(vec: &IntCounterVec, rows: &[[&str; N]]) {
        for row in rows {
            vec.with_label_values(row).inc();
        }
    }

    fn touch<const N: usize>(vec: &IntCounterVec, rows: &[[&str; N]]) {
        for row in rows {
            vec.with_label_values(row);
        }
    }

    // --- bootstrap attempts (event-driven) ---

    pub fn stack_started(&self, stack: &str) {
        let rows = self.stack_rows(stack);
        Self::inc(&self.metrics.stack_bootstrap_total, &rows);
        Self::touch(&self.metrics.stack_bootstrap_success, &rows);
        Self::touch(&self.metrics.stack_bootstrap_error, &rows);
        info!(stack, "stack bootstrap started");
    }

    pub fn stack_succeeded(&self, stack: &str) {
        Self::inc(&self.metrics.stack_bootstrap_success, &self.stack_rows(stack));
        info!(stack, "stack bootstrap succeeded");
    }

    pub fn stack_failed(&self, stack: &str) {
        Self::inc(&self.metrics.stack_bootstrap_error, &self.stack_rows(stack));
        info!(stack, "stack bootstrap failed");
    }

    pub fn service_started(&self, stack: &str, service: &str) {
        let rows = self.service_rows(stack, service);
        Self::inc(&self.metrics.service_bootstrap_total, &rows);
        Self::touch(&self.metrics.service_bootstrap_success, &rows);
        Self::touch(&self.metrics.service_bootstrap_error, &rows);
        info!(stack, service, "service bootstrap started");
    }

    pub fn service_succeeded(&self, stack: &str, service: &str) {
        Self::inc(
            &self.metrics.service_bootstrap_success,
            &self.service_rows(stack, service),
        );
        info!(stack, service, "service bootstrap succeeded");
    }

    pub fn service_failed(&self, stack: &str, service: &str) {
        Self::inc(
            &self.metrics.service_bootstrap_error,
            &self.service_rows(stack, service),
        );
        info!(stack, service, "service bootstrap failed");
    }

    pub fn instance_started(&self, stack: &str, service: &str, instance: &str) {
        let rows = self.instance_rows(stack, service, instance);
        Self::inc(&self.metrics.instance_bootstrap_total, &rows);
        Self::touch(&self.metrics.instance_bootstrap_success, &rows);
        Self::touch(&self.metrics.instance_bootstrap_error, &rows);
        info!(stack, service, instance, "instance bootstrap started");
    }

    pub fn instance_succeeded(&self, stack: &str, service: &str, instance: &str) {
        Self::inc(
            &self.metrics.instance_bootstrap_success,
            &self.instance_rows(stack, service, instance),
        );
        info!(stack, service, instance, "instance bootstrap succeeded");
    }

    pub fn instance_failed(&self, stack: &str, service: &str, instance: &str) {
        Self::inc(
            &self.metrics.instance_bootstrap_error,
            &self.instance_rows(stack, service, instance),
        );
        info!(stack, service, instance, "instance bootstrap failed");
    }

    // --- zero-materialization for entities known at startup ---

    pub fn touch_stack(&self, stack: &str) {
        let rows = self.stack_rows(stack);
        Self::touch(&self.metrics.stack_bootstrap_total, &rows);
        Self::touch(&self.metrics.stack_bootstrap_success, &rows);
        Self::touch(&self.metrics.stack_bootstrap_error, &rows);
    }

    pub fn touch_service(&self, stack: &str, service: &str) {
        let rows = self.service_rows(stack, service);
        Self::touch(&self.metrics.service_bootstrap_total, &rows);
        Self::touch(&self.metrics.service_bootstrap_success, &rows);
        Self::touch(&self.metrics.service_bootstrap_error, &rows);
    }

    pub fn touch_instance(&self, stack: &str, service: &str, instance: &str) {
        let rows = self.instance_rows(stack, service, instance);
        Self::touch(&self.metrics.instance_bootstrap_total, &rows);
        Self::touch(&self.metrics.instance_bootstrap_success, &rows);
        Self::touch(&self.metrics.instance_bootstrap_error, &rows);
    }

    // --- initialization counters (startup aggregation, one shot) ---

    pub fn stack_initialized(&self, stack: &str, outcome: InitOutcome) {
        let rows = self.stack_rows(stack);
        Self::inc(&self.metrics.stack_init_total, &rows);
        match outcome {
            InitOutcome::Success => {
                Self::inc(&self.metrics.stack_init_success, &rows);
                Self::touch(&self.metrics.stack_init_error, &rows);
            }
            InitOutcome::Failure => {
                Self::touch(&self.metrics.stack_init_success, &rows);
                Self::inc(&self.metrics.stack_init_error, &rows);
            }
            InitOutcome::Pending => {
                Self::touch(&self.metrics.stack_init_success, &rows);
                Self::touch(&self.metrics.stack_init_error, &rows);
            }
        }
    }

    pub fn service_initialized(&self, stack: &str, service: &str, outcome: InitOutcome) {
        let rows = self.service_rows(stack, service);
        Self::inc(&self.metrics.service_init_total, &rows);
        match outcome {
            InitOutcome::Success => {
                Self::inc(&self.metrics.service_init_success, &rows);
                Self::touch(&self.metrics.service_init_error, &rows);
            }
            InitOutcome::Failure => {
                Self::touch(&self.metrics.service_init_success, &rows);
                Self::inc(&self.metrics.service_init_error, &rows);
            }
            InitOutcome::Pending => {
                Self::touch(&self.metrics.service_init_success, &rows);
                Self::touch(&self.metrics.service_init_error, &rows);
            }
        }
    }

    pub fn instance_initialized(
        &self,
        stack: &str,
        service: &str,
        instance: &str,
        outcome: InitOutcome,
    ) {
        let rows = self.instance_rows(stack, service, instance);
        Self::inc(&self.metrics.instance_init_total, &rows);
        match outcome {
            InitOutcome::Success => {
                Self::inc(&self.metrics.instance_init_success, &rows);
                Self::touch(&self.metrics.instance_init_error, &rows);
            }
            InitOutcome::Failure => {
                Self::touch(&self.metrics.instance_init_success, &rows);
                Self::inc(&self.metrics.instance_init_error, &rows);
            }
            InitOutcome::Pending => {
                Self::touch(&self.metrics.instance_init_success, &rows);
                Self::touch(&self.metrics.instance_init_error, &rows);
            }
        }
    }
}
