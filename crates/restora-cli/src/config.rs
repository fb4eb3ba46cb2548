use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration: defaults, then an optional TOML file, then `RESTORA_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the face service (default: http://localhost:5000).
    pub service_url: String,
    /// Directory downloaded archives are written to.
    pub output_dir: PathBuf,
    /// Whole-request timeout for service calls, in seconds.
    pub request_timeout_secs: u64,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Capacity of the engine's request queue.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:5000".to_string(),
            output_dir: PathBuf::from("."),
            request_timeout_secs: 300,
            connect_timeout_secs: 30,
            queue_depth: 16,
        }
    }
}

impl Config {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RESTORA_SERVICE_URL") {
            self.service_url = url;
        }
        if let Some(dir) = lookup("RESTORA_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        self.request_timeout_secs = parsed(
            lookup("RESTORA_REQUEST_TIMEOUT_SECS"),
            self.request_timeout_secs,
        );
        self.connect_timeout_secs = parsed(
            lookup("RESTORA_CONNECT_TIMEOUT_SECS"),
            self.connect_timeout_secs,
        );
        self.queue_depth = parsed(lookup("RESTORA_QUEUE_DEPTH"), self.queue_depth);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Unparseable values fall back to the current setting.
fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
