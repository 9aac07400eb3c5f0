//! Metrics — every family the exporter exposes, owned by one registry.
//!
//! Two kinds of families live here: snapshot gauges rebuilt on every scrape
//! from the REST collections, and monotonic lifecycle counters fed by the
//! classifier. Counter rows are never reset; the snapshot gauges are.

pub mod sink;

use prometheus::{
    Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::Result;

/// Metric namespace prefix.
pub const NAMESPACE: &str = "rancher";

/// Reserved wildcard label for the aggregated counter rows. Rancher names
/// must match `[a-zA-Z0-9][a-zA-Z0-9_.-]*`, so this can never collide with
/// a real stack/service/instance name.
pub const ALL_TAG: &str = "__rancher__";

/// Reserved label substituted when an ancestor name cannot be resolved,
/// so a failed lookup never corrupts a real name's counter row.
pub const UNKNOWN_TAG: &str = "__unknown__";

pub struct ExporterMetrics {
    registry: Registry,

    // Snapshot gauges, reset on every scrape.
    pub host_state: GaugeVec,
    pub host_agent_state: GaugeVec,
    pub stack_health: GaugeVec,
    pub stack_state: GaugeVec,
    pub service_scale: GaugeVec,
    pub service_health: GaugeVec,
    pub service_state: GaugeVec,
    pub stack_heartbeat: GaugeVec,
    pub service_heartbeat: GaugeVec,
    pub instance_heartbeat: GaugeVec,

    // Startup latency, keyed per instance. Deliberately not reset.
    pub instance_bootstrap_ms: GaugeVec,

    // Lifecycle counters fed by the classifier (bootstrap) and the
    // one-shot startup aggregation pass (initialization).
    pub stack_bootstrap_total: IntCounterVec,
    pub stack_bootstrap_success: IntCounterVec,
    pub stack_bootstrap_error: IntCounterVec,
    pub service_bootstrap_total: IntCounterVec,
    pub service_bootstrap_success: IntCounterVec,
    pub service_bootstrap_error: IntCounterVec,
    pub instance_bootstrap_total: IntCounterVec,
    pub instance_bootstrap_success: IntCounterVec,
    pub instance_bootstrap_error: IntCounterVec,

    pub stack_init_total: IntCounterVec,
    pub stack_init_success: IntCounterVec,
    pub stack_init_error: IntCounterVec,
    pub service_init_total: IntCounterVec,
    pub service_init_success: IntCounterVec,
    pub service_init_error: IntCounterVec,
    pub instance_init_total: IntCounterVec,
    pub instance_init_success: IntCounterVec,
    pub instance_init_error: IntCounterVec,
}

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let vec = GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    let vec = IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

const STACK_LABELS: &[&str] = &["environment_name", "name"];
const SERVICE_LABELS: &[&str] = &["environment_name", "stack_name", "name"];
const INSTANCE_LABELS: &[&str] = &["environment_name", "stack_name", "service_name", "name"];

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let r = &registry;

        Ok(Self {
            host_state: gauge(
                r,
                "host_state",
                "State of defined host as reported by the Rancher API",
                &["id", "name", "state"],
            )?,
            host_agent_state: gauge(
                r,
                "host_agent_state",
                "State of defined host agent as reported by the Rancher API",
                &["id", "name", "state"],
            )?,
            stack_health: gauge(
                r,
                "stack_health_status",
                "HealthState of defined stack as reported by Rancher",
                &["id", "name", "health_state", "system"],
            )?,
            stack_state: gauge(
                r,
                "stack_state",
                "State of defined stack as reported by Rancher",
                &["id", "name", "state", "system"],
            )?,
            service_scale: gauge(
                r,
                "service_scale",
                "scale of defined service as reported by Rancher",
                &["name", "stack_name", "system"],
            )?,
            service_health: gauge(
                r,
                "service_health_status",
                "HealthState of the service, as reported by the Rancher API",
                &["id", "stack_id", "name", "stack_name", "health_state", "system"],
            )?,
            service_state: gauge(
                r,
                "service_state",
                "State of the service, as reported by the Rancher API",
                &["id", "stack_id", "name", "stack_name", "state", "system"],
            )?,
            stack_heartbeat: gauge(
                r,
                "stack_heartbeat",
                "The heartbeat of stacks in Rancher",
                &["environment_name", "name", "system", "type"],
            )?,
            service_heartbeat: gauge(
                r,
                "service_heartbeat",
                "The heartbeat of services in Rancher",
                &["environment_name", "stack_name", "name", "system", "type"],
            )?,
            instance_heartbeat: gauge(
                r,
                "instance_heartbeat",
                "The heartbeat of instances in Rancher",
                &["environment_name", "stack_name", "service_name", "name", "system", "type"],
            )?,
            instance_bootstrap_ms: gauge(
                r,
                "instance_bootstrap_ms",
                "The bootstrap milliseconds of instances in Rancher",
                &["environment_name", "stack_name", "service_name", "name", "system", "type"],
            )?,

            stack_bootstrap_total: counter(
                r,
                "stacks_bootstrap_total",
                "Current total number of the bootstrap stacks in Rancher",
                STACK_LABELS,
            )?,
            stack_bootstrap_success: counter(
                r,
                "stacks_bootstrap_success_total",
                "Current total number of the healthy and active bootstrap stacks in Rancher",
                STACK_LABELS,
            )?,
            stack_bootstrap_error: counter(
                r,
                "stacks_bootstrap_error_total",
                "Current total number of the unhealthy or error bootstrap stacks in Rancher",
                STACK_LABELS,
            )?,
            service_bootstrap_total: counter(
                r,
                "services_bootstrap_total",
                "Current total number of the bootstrap services in Rancher",
                SERVICE_LABELS,
            )?,
            service_bootstrap_success: counter(
                r,
                "services_bootstrap_success_total",
                "Current total number of the healthy and active bootstrap services in Rancher",
                SERVICE_LABELS,
            )?,
            service_bootstrap_error: counter(
                r,
                "services_bootstrap_error_total",
                "Current total number of the unhealthy or error bootstrap services in Rancher",
                SERVICE_LABELS,
            )?,
            instance_bootstrap_total: counter(
                r,
                "instances_bootstrap_total",
                "Current total number of the bootstrap instances in Rancher",
                INSTANCE_LABELS,
            )?,
            instance_bootstrap_success: counter(
                r,
                "instances_bootstrap_success_total",
                "Current total number of the healthy and active bootstrap instances in Rancher",
                INSTANCE_LABELS,
            )?,
            instance_bootstrap_error: counter(
                r,
                "instances_bootstrap_error_total",
                "Current total number of the unhealthy or error bootstrap instances in Rancher",
                INSTANCE_LABELS,
            )?,

            stack_init_total: counter(
                r,
                "stacks_initialization_total",
                "Current total number of the initialization stacks in Rancher",
                STACK_LABELS,
            )?,
            stack_init_success: counter(
                r,
                "stacks_initialization_success_total",
                "Current total number of the healthy and active initialization stacks in Rancher",
                STACK_LABELS,
            )?,
            stack_init_error: counter(
                r,
                "stacks_initialization_error_total",
                "Current total number of the unhealthy or error initialization stacks in Rancher",
                STACK_LABELS,
            )?,
            service_init_total: counter(
                r,
                "services_initialization_total",
                "Current total number of the initialization services in Rancher",
                SERVICE_LABELS,
            )?,
            service_init_success: counter(
                r,
                "services_initialization_success_total",
                "Current total number of the healthy and active initialization services in Rancher",
                SERVICE_LABELS,
            )?,
            service_init_error: counter(
                r,
                "services_initialization_error_total",
                "Current total number of the unhealthy or error initialization services in Rancher",
                SERVICE_LABELS,
            )?,
            instance_init_total: counter(
                r,
                "instances_initialization_total",
                "Current total number of the initialization instances in Rancher",
                INSTANCE_LABELS,
            )?,
            instance_init_success: counter(
                r,
                "instances_initialization_success_total",
                "Current total number of the healthy and active initialization instances in Rancher",
                INSTANCE_LABELS,
            )?,
            instance_init_error: counter(
                r,
                "instances_initialization_error_total",
                "Current total number of the unhealthy or error initialization instances in Rancher",
                INSTANCE_LABELS,
            )?,

            registry,
        })
    }

    /// Clear the families the snapshot pass rebuilds, so entities that
    /// disappeared since the last scrape drop out of the exposition.
    pub fn reset_snapshot(&self) {
        self.host_state.reset();
        self.host_agent_state.reset();
        self.stack_health.reset();
        self.stack_state.reset();
        self.stack_heartbeat.reset();
        self.service_scale.reset();
        self.service_health.reset();
        self.service_state.reset();
        self.service_heartbeat.reset();
        self.instance_heartbeat.reset();
    }

    /// Encode the whole registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[cfg(test)]
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ExporterMetrics;

    /// Look up one row of `family` by its full label set. Returns the
    /// counter or gauge value, or `None` when the row was never created,
    /// so tests can distinguish a zero-valued row from a missing one.
    pub fn family_value(
        metrics: &ExporterMetrics,
        family: &str,
        labels: &[(&str, &str)],
    ) -> Option<f64> {
        for mf in metrics.gather() {
            if mf.get_name() != family {
                continue;
            }
            'metric: for m in mf.get_metric() {
                let pairs = m.get_label();
                if pairs.len() != labels.len() {
                    continue;
                }
                for (name, value) in labels {
                    if !pairs
                        .iter()
                        .any(|p| p.get_name() == *name && p.get_value() == *value)
                    {
                        continue 'metric;
                    }
                }
                return Some(if m.counter.is_some() {
                    m.counter.value()
                } else {
                    m.gauge.value()
                });
            }
        }
        None
    }
}
