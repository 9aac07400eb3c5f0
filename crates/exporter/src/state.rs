use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::config::ExporterConfig;
use crate::metrics::ExporterMetrics;
use crate::names::NameCache;
use crate::rancher::client::{Project, RancherClient};

pub struct ExporterState {
    pub config: ExporterConfig,
    pub client: Arc<RancherClient>,
    pub names: Arc<NameCache>,
    pub metrics: Arc<ExporterMetrics>,
    pub project: Project,
    /// Serializes scrapes: the snapshot pass resets and rebuilds the
    /// current-state gauges, so two interleaved passes would corrupt each
    /// other's view.
    pub snapshot_gate: Mutex<()>,
    pub shutdown_tx: broadcast::Sender<()>,
}

pub type SharedState = Arc<ExporterState>;

impl ExporterState {
    pub fn new(
        config: ExporterConfig,
        client: Arc<RancherClient>,
        names: Arc<NameCache>,
        metrics: Arc<ExporterMetrics>,
        project: Project,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            client,
            names,
            metrics,
            project,
            snapshot_gate: Mutex::new(()),
            shutdown_tx,
        }
    }

    /// Signal all background tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
