use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Exporter configuration, sourced from the environment.
///
/// All variables are flat (no prefix): `CATTLE_URL`, `CATTLE_ACCESS_KEY`,
/// `CATTLE_SECRET_KEY`, `LISTEN_ADDRESS`, `METRICS_PATH`, `HIDE_SYS`,
/// `SCRAPE_TIMEOUT`, `LOG_LEVEL`. A `.env` file is honored for local runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Base URL of the Rancher API, e.g. `http://rancher:8080/v2-beta`.
    pub cattle_url: String,
    /// Basic-auth username for the Rancher API.
    pub cattle_access_key: String,
    /// Basic-auth password for the Rancher API.
    pub cattle_secret_key: String,
    /// Scrape bind address. A bare `:port` binds all interfaces.
    pub listen_address: String,
    /// URL path the metrics are served under.
    pub metrics_path: String,
    /// Exclude system stacks/services/instances from the snapshot pass.
    pub hide_sys: bool,
    /// HTTP client timeout in seconds.
    pub scrape_timeout: u64,
    /// Log level when RUST_LOG is unset: debug|info|warn|error.
    pub log_level: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            cattle_url: String::new(),
            cattle_access_key: String::new(),
            cattle_secret_key: String::new(),
            listen_address: ":9173".to_string(),
            metrics_path: "/metrics".to_string(),
            hide_sys: false,
            scrape_timeout: 30,
            log_level: "info".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration: compile-time defaults layered under the process
    /// environment (with `.env` support).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&ExporterConfig::default())
            .context("failed to serialize default configuration")?;

        config::Config::builder()
            .add_source(defaults)
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    /// Validate configuration. Violations are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.cattle_url).context("CATTLE_URL is not a valid URL")?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("CATTLE_URL must be http or https, got {}", url.scheme());
        }
        if self.cattle_access_key.is_empty() {
            anyhow::bail!("CATTLE_ACCESS_KEY is required");
        }
        if self.cattle_secret_key.is_empty() {
            anyhow::bail!("CATTLE_SECRET_KEY is required");
        }
        if !self.metrics_path.starts_with('/') {
            anyhow::bail!("METRICS_PATH must start with '/', got {:?}", self.metrics_path);
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Resolve `listen_address` to a socket address, treating a bare
    /// `:port` as all-interfaces.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };
        addr.parse()
            .with_context(|| format!("invalid LISTEN_ADDRESS {:?}", self.listen_address))
    }
}
