//! Configuration loading

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ConfigError;

/// Default port of an Avon server
pub const DEFAULT_PORT: u16 = 8000;

/// Settings the hosting backend passes to [`Avon::init`](crate::Avon::init)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or address to bind
    pub host: String,
    pub port: u16,
    /// Directory real files (e.g. `favicon.ico`) are served from
    pub root_dir: PathBuf,
    /// Log every reply and the startup banner at info level
    pub verbose: bool,
    /// Name of the simulator or robot hosting this server
    pub backend_name: String,
    pub backend_version: String,
    /// Requests that may wait for the backend before clients are held back
    pub queue_depth: usize,
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        root_dir: impl Into<PathBuf>,
        verbose: bool,
        backend_name: impl Into<String>,
        backend_version: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            root_dir: root_dir.into(),
            verbose,
            backend_name: backend_name.into(),
            backend_version: backend_version.into(),
            queue_depth: default_queue_depth(),
        }
    }

    /// Human-readable "host:port"
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration file of the `avon` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub demo: DemoSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_dir: default_root_dir(),
            verbose: false,
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_queue_depth() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_backend_name")]
    pub name: String,
    #[serde(default = "default_backend_version")]
    pub version: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            name: default_backend_name(),
            version: default_backend_version(),
        }
    }
}

fn default_backend_name() -> String {
    "avon-demo".to_string()
}

fn default_backend_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSection {
    /// Simulation step in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Number of beams of the demo ranger
    #[serde(default = "default_beams")]
    pub beams: usize,
}

impl Default for DemoSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            beams: default_beams(),
        }
    }
}

fn default_tick_ms() -> u64 {
    100
}

fn default_beams() -> usize {
    16
}

impl Config {
    /// Settings for [`Avon::init`](crate::Avon::init)
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            root_dir: self.server.root_dir.clone(),
            verbose: self.server.verbose,
            backend_name: self.backend.name.clone(),
            backend_version: self.backend.version.clone(),
            queue_depth: self.server.queue_depth,
        }
    }
}

/// Load configuration from file, falling back to defaults when it is absent
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
