use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, loaded from a YAML file.
///
/// The file path comes from the `FILAMENT_CONFIG` environment variable;
/// when the variable is unset or the file is missing, defaults are used.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Server-side options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: String,
    /// Idle connections older than this are evicted by the sweeper.
    pub request_timeout_ms: u64,
    /// Sweeper tick period.
    pub sweep_interval_ms: u64,
    /// Maximum number of connections processing requests at once.
    pub max_fibers: usize,
    /// Document root served by the bundled static-file handler.
    pub root_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 10_000,
            sweep_interval_ms: 2_000,
            max_fibers: 1024,
            root_dir: PathBuf::from("."),
        }
    }
}

/// Client pool options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Keep outbound connections for reuse after a clean exchange.
    pub persistent: bool,
    /// Pooled connections older than this are dropped on next acquire.
    pub idle_timeout_ms: u64,
    /// Wrap outbound connections in TLS.
    pub ssl: bool,
    /// PEM bundle of trusted roots for the TLS client.
    pub ca_bundle: Option<PathBuf>,
    /// Verify server certificates during the TLS handshake.
    pub verify_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            idle_timeout_ms: 15_000,
            ssl: false,
            ca_bundle: None,
            verify_certs: true,
        }
    }
}

impl Config {
    /// Loads configuration, falling back to defaults when no file is
    /// configured or readable.
    pub fn load() -> Self {
        let path = match std::env::var("FILAMENT_CONFIG") {
            Ok(p) => p,
            Err(_) => return Self::default(),
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_yaml(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Unreadable config file, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl ClientConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
