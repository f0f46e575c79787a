//! TOML configuration for proxyprobe.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration. Command-line flags override whatever is loaded here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::endpoint::{Defaults, DEFAULT_PATH, DEFAULT_SERVER_NAME};
use crate::probes::{ProbeConfig, DEFAULT_TEST_URL};
use crate::results::SpeedBounds;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PROXYPROBE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "proxyprobe.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckerConfig {
    #[serde(default)]
    pub probe: ProbeSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl CheckerConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Try, in order: `$PROXYPROBE_CONFIG`, `./proxyprobe.toml`, then the
    /// compiled-in defaults. A file that exists but cannot be loaded is
    /// reported and skipped.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PROXYPROBE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_secs(self.probe.timeout_secs),
            test_url: self.probe.test_url.clone(),
            verify_tls: self.probe.verify_tls,
        }
    }

    pub fn endpoint_defaults(&self) -> Defaults {
        Defaults {
            uuid: self.defaults.uuid.clone(),
            server_name: self.defaults.server_name.clone(),
            path: self.defaults.path.clone(),
        }
    }

    pub fn speed_bounds(&self) -> SpeedBounds {
        SpeedBounds {
            min_speed_mbps: self.filter.min_speed_mbps,
            max_speed_mbps: self.filter.max_speed_mbps,
        }
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    /// Per-endpoint deadline, in seconds, for each probe phase.
    pub timeout_secs: u64,
    /// Reference download used for the throughput sample.
    pub test_url: String,
    /// Check the reference server's certificate. Off by default: the
    /// download only samples path bandwidth.
    pub verify_tls: bool,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            test_url: DEFAULT_TEST_URL.to_string(),
            verify_tls: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint defaults
// ---------------------------------------------------------------------------

/// Settings stamped onto every endpoint built from a plain address list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub uuid: String,
    pub server_name: String,
    pub path: String,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    /// `false` disables the bound.
    #[serde(with = "speed_bound")]
    pub min_speed_mbps: Option<f64>,
    /// `false` disables the bound.
    #[serde(with = "speed_bound")]
    pub max_speed_mbps: Option<f64>,
}

/// A bound is written as a number, or `false` for "unbounded". A missing key
/// keeps the section default.
mod speed_bound {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Mbps(f64),
        Flag(bool),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_f64(*v),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Mbps(v) => Ok(Some(v)),
            Repr::Flag(false) => Ok(None),
            Repr::Flag(true) => Err(D::Error::custom("expected a speed in MB/s or `false`")),
        }
    }
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            min_speed_mbps: Some(0.0),
            max_speed_mbps: Some(1.5),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
    /// Prefix for the unfiltered result pair.
    pub all_prefix: String,
    /// Prefix for the filtered result pair.
    pub filtered_prefix: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            all_prefix: "all_results".to_string(),
            filtered_prefix: "filtered_servers".to_string(),
        }
    }
}

impl OutputSection {
    pub fn all_path(&self) -> PathBuf {
        self.dir.join(&self.all_prefix)
    }

    pub fn filtered_path(&self) -> PathBuf {
        self.dir.join(&self.filtered_prefix)
    }
}
