//! Lifecycle classifier — turns the raw resource-change stream into
//! bootstrap attempt outcomes.
//!
//! Rancher reports only `(state, healthState)` transitions; there is no
//! explicit "attempt" on the wire. The classifier reconstructs attempts by
//! tracking one phase record per entity and firing a transition table per
//! class. Everything the tables do not recognize is absorbed: upstream adds
//! states over time and an unknown transition must never take the process
//! down.
//!
//! All maps are owned by the single consumer task; nothing else touches
//! them, which is what keeps this lock-free.

mod instance;
mod service;
mod stack;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::event::{EntityClass, Event};
use crate::metrics::sink::CounterSink;
use crate::names::NameCache;

/// Capacity of the ingress → classifier channel. Sized for the burst a
/// large multi-service upgrade produces; the ingress blocks (never drops)
/// if it fills up regardless.
pub const EVENT_BUFFER: usize = 1 << 20;

/// Phase of the single in-flight attempt tracked per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptPhase {
    StackActiveInitializing,
    StackActiveUnhealthy,
    ServiceActivatingHealthy,
    ServiceActiveInitializing,
    ServiceRestarting,
    ServiceUpgrading,
    InstanceStarting,
    InstanceStopping,
    InstanceStopped,
    InstanceRunningReinitializing,
}

/// Marker that a child service of the keyed stack is mid-restart or
/// mid-upgrade. While set, the stack's own healthy report is premature and
/// its success is withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentFlag {
    Restarting,
    Upgrading,
}

pub struct Classifier {
    sink: CounterSink,
    names: Arc<NameCache>,
    stacks: HashMap<String, AttemptPhase>,
    services: HashMap<String, AttemptPhase>,
    instances: HashMap<String, AttemptPhase>,
    parent_flags: HashMap<String, ParentFlag>,
}

impl Classifier {
    pub fn new(sink: CounterSink, names: Arc<NameCache>) -> Self {
        Self {
            sink,
            names,
            stacks: HashMap::new(),
            services: HashMap::new(),
            instances: HashMap::new(),
            parent_flags: HashMap::new(),
        }
    }

    /// Consume events in arrival order until the channel closes.
    ///
    /// Every event is classified behind a recover boundary: a panic in one
    /// handler is logged and must not terminate the consumer.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            if catch_unwind(AssertUnwindSafe(|| self.handle(&event))).is_err() {
                error!(id = %event.id, "classification panicked, event skipped");
            }
        }
        debug!("event channel closed, classifier exiting");
    }

    pub fn handle(&mut self, event: &Event) {
        debug!(
            class = ?event.class,
            id = %event.id,
            state = ?event.state,
            health = ?event.health,
            "classifying change"
        );
        match event.class {
            EntityClass::Stack => stack::apply(self, event),
            EntityClass::Service => service::apply(self, event),
            EntityClass::Instance => instance::apply(self, event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Health, ResourceState};
    use crate::metrics::testing::family_value;
    use crate::metrics::{ExporterMetrics, ALL_TAG};

    fn classifier() -> (Arc<ExporterMetrics>, Classifier) {
        let metrics = Arc::new(ExporterMetrics::new().unwrap());
        let sink = CounterSink::new(Arc::clone(&metrics), "Default".to_string());
        (metrics, Classifier::new(sink, Arc::new(NameCache::new())))
    }

    fn stack(id: &str, name: &str, state: &str, health: &str) -> Event {
        Event {
            class: EntityClass::Stack,
            id: id.to_string(),
            name: name.to_string(),
            state: ResourceState::parse(state),
            health: Health::parse(health),
            parent_id: String::new(),
            stack_name: String::new(),
            service_name: String::new(),
        }
    }

    fn service(id: &str, name: &str, stack_name: &str, parent: &str, state: &str, health: &str) -> Event {
        Event {
            class: EntityClass::Service,
            id: id.to_string(),
            name: name.to_string(),
            state: ResourceState::parse(state),
            health: Health::parse(health),
            parent_id: parent.to_string(),
            stack_name: stack_name.to_string(),
            service_name: String::new(),
        }
    }

    fn instance(id: &str, name: &str, stack_name: &str, service_name: &str, state: &str, health: &str) -> Event {
        Event {
            class: EntityClass::Instance,
            id: id.to_string(),
            name: name.to_string(),
            state: ResourceState::parse(state),
            health: Health::parse(health),
            parent_id: String::new(),
            stack_name: stack_name.to_string(),
            service_name: service_name.to_string(),
        }
    }

    fn stack_counts(metrics: &ExporterMetrics, name: &str) -> (f64, f64, f64) {
        let labels = [("environment_name", "Default"), ("name", name)];
        (
            family_value(metrics, "rancher_stacks_bootstrap_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_stacks_bootstrap_success_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_stacks_bootstrap_error_total", &labels).unwrap_or(0.0),
        )
    }

    fn service_counts(metrics: &ExporterMetrics, stack: &str, name: &str) -> (f64, f64, f64) {
        let labels = [
            ("environment_name", "Default"),
            ("stack_name", stack),
            ("name", name),
        ];
        (
            family_value(metrics, "rancher_services_bootstrap_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_services_bootstrap_success_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_services_bootstrap_error_total", &labels).unwrap_or(0.0),
        )
    }

    fn instance_counts(metrics: &ExporterMetrics, stack: &str, svc: &str, name: &str) -> (f64, f64, f64) {
        let labels = [
            ("environment_name", "Default"),
            ("stack_name", stack),
            ("service_name", svc),
            ("name", name),
        ];
        (
            family_value(metrics, "rancher_instances_bootstrap_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_instances_bootstrap_success_total", &labels).unwrap_or(0.0),
            family_value(metrics, "rancher_instances_bootstrap_error_total", &labels).unwrap_or(0.0),
        )
    }

    #[test]
    fn full_bootstrap_counts_one_success_per_level() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st1", "web", "active", "initializing"));
        c.handle(&service("1s1", "app", "web", "1st1", "activating", "healthy"));
        c.handle(&instance("1i1", "app-1", "web", "app", "starting", ""));
        c.handle(&instance("1i1", "app-1", "web", "app", "running", "healthy"));
        c.handle(&service("1s1", "app", "web", "1st1", "active", "healthy"));
        c.handle(&stack("1st1", "web", "active", "healthy"));

        assert_eq!(stack_counts(&metrics, "web"), (1.0, 1.0, 0.0));
        assert_eq!(stack_counts(&metrics, ALL_TAG), (1.0, 1.0, 0.0));
        assert_eq!(service_counts(&metrics, "web", "app"), (1.0, 1.0, 0.0));
        assert_eq!(instance_counts(&metrics, "web", "app", "app-1"), (1.0, 1.0, 0.0));
    }

    #[test]
    fn sibling_restart_suppresses_stack_success() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st1", "web", "active", "initializing"));
        c.handle(&service("1s1", "app", "web", "1st1", "restarting", "degraded"));
        // The stack reports healthy while its service is still restarting.
        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 0.0, 0.0));

        // The service comes back, which releases the suppression.
        c.handle(&service("1s1", "app", "web", "1st1", "active", "healthy"));
        assert_eq!(service_counts(&metrics, "web", "app"), (1.0, 1.0, 0.0));

        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 1.0, 0.0));
    }

    #[test]
    fn instance_restart_counts_one_attempt() {
        let (metrics, mut c) = classifier();

        c.handle(&instance("1i2", "db-1", "web", "db", "stopping", "healthy"));
        c.handle(&instance("1i2", "db-1", "web", "db", "stopped", "healthy"));
        c.handle(&instance("1i2", "db-1", "web", "db", "running", "reinitializing"));
        c.handle(&instance("1i2", "db-1", "web", "db", "running", "healthy"));

        assert_eq!(instance_counts(&metrics, "web", "db", "db-1"), (1.0, 1.0, 0.0));
    }

    #[test]
    fn stack_error_fails_the_open_attempt() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st2", "db", "active", "initializing"));
        c.handle(&stack("1st2", "db", "error", ""));
        assert_eq!(stack_counts(&metrics, "db"), (1.0, 0.0, 1.0));

        // The record is gone, so a second error is absorbed.
        c.handle(&stack("1st2", "db", "error", ""));
        assert_eq!(stack_counts(&metrics, "db"), (1.0, 0.0, 1.0));
    }

    #[test]
    fn service_removed_mid_attempt_fails() {
        let (metrics, mut c) = classifier();

        c.handle(&service("1s3", "cache", "web", "1st1", "active", "initializing"));
        c.handle(&service("1s3", "cache", "web", "1st1", "removed", "initializing"));

        assert_eq!(service_counts(&metrics, "web", "cache"), (1.0, 0.0, 1.0));
    }

    #[test]
    fn unhealthy_probe_never_counts() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st3", "jobs", "active", "unhealthy"));
        c.handle(&stack("1st3", "jobs", "active", "initializing"));
        c.handle(&stack("1st3", "jobs", "active", "healthy"));

        assert_eq!(stack_counts(&metrics, "jobs"), (0.0, 0.0, 0.0));
        assert_eq!(stack_counts(&metrics, ALL_TAG), (0.0, 0.0, 0.0));
    }

    #[test]
    fn repeated_initializing_keeps_one_attempt_in_flight() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st1", "web", "active", "initializing"));
        c.handle(&stack("1st1", "web", "active", "initializing"));
        c.handle(&stack("1st1", "web", "active", "initializing"));

        assert_eq!(stack_counts(&metrics, "web"), (1.0, 0.0, 0.0));

        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 1.0, 0.0));

        // Attempt closed; a lone healthy report is absorbed.
        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 1.0, 0.0));
    }

    #[test]
    fn service_upgrade_path_succeeds_on_upgraded() {
        let (metrics, mut c) = classifier();

        c.handle(&service("1s1", "app", "web", "1st1", "upgrading", "degraded"));
        assert_eq!(service_counts(&metrics, "web", "app"), (1.0, 0.0, 0.0));

        // Stack healthy while the upgrade runs: suppressed.
        c.handle(&stack("1st1", "web", "active", "initializing"));
        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 0.0, 0.0));

        c.handle(&service("1s1", "app", "web", "1st1", "upgraded", "healthy"));
        assert_eq!(service_counts(&metrics, "web", "app"), (1.0, 1.0, 0.0));

        c.handle(&stack("1st1", "web", "active", "healthy"));
        assert_eq!(stack_counts(&metrics, "web"), (1.0, 1.0, 0.0));
    }

    #[test]
    fn instance_error_fails_even_without_an_attempt() {
        let (metrics, mut c) = classifier();

        c.handle(&instance("1i9", "app-9", "web", "app", "error", ""));
        assert_eq!(instance_counts(&metrics, "web", "app", "app-9"), (0.0, 0.0, 1.0));
    }

    #[test]
    fn stack_removed_without_attempt_records_nothing() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st9", "gone", "removed", ""));
        assert_eq!(stack_counts(&metrics, "gone"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn removed_stack_mid_attempt_fails_and_evicts_its_name() {
        let (metrics, mut c) = classifier();
        c.names.record_stack("1st4", "tmp");

        c.handle(&stack("1st4", "tmp", "active", "initializing"));
        c.handle(&stack("1st4", "tmp", "removed", ""));

        assert_eq!(stack_counts(&metrics, "tmp"), (1.0, 0.0, 1.0));
        assert!(c.names.stack_name("1st4").is_none());
    }

    #[test]
    fn started_materializes_all_three_families() {
        let (metrics, mut c) = classifier();

        c.handle(&stack("1st1", "web", "active", "initializing"));

        let labels = [("environment_name", "Default"), ("name", "web")];
        assert_eq!(
            family_value(&metrics, "rancher_stacks_bootstrap_success_total", &labels),
            Some(0.0)
        );
        assert_eq!(
            family_value(&metrics, "rancher_stacks_bootstrap_error_total", &labels),
            Some(0.0)
        );
    }

    #[test]
    fn empty_health_is_absorbed_for_stateful_rows() {
        let (metrics, mut c) = classifier();

        // Starting with empty health still opens an attempt…
        c.handle(&instance("1i1", "app-1", "web", "app", "starting", ""));
        assert_eq!(instance_counts(&metrics, "web", "app", "app-1"), (1.0, 0.0, 0.0));

        // …but a running report without health is a no-op.
        c.handle(&instance("1i1", "app-1", "web", "app", "running", ""));
        assert_eq!(instance_counts(&metrics, "web", "app", "app-1"), (1.0, 0.0, 0.0));

        c.handle(&instance("1i1", "app-1", "web", "app", "running", "healthy"));
        assert_eq!(instance_counts(&metrics, "web", "app", "app-1"), (1.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn run_drains_the_channel_in_order() {
        let (metrics, c) = classifier();
        let (tx, rx) = mpsc::channel(8);
        let consumer = tokio::spawn(c.run(rx));

        tx.send(stack("1st2", "db", "active", "initializing")).await.unwrap();
        tx.send(stack("1st2", "db", "error", "")).await.unwrap();
        drop(tx);

        consumer.await.unwrap();
        assert_eq!(stack_counts(&metrics, "db"), (1.0, 0.0, 1.0));
    }
}
