//! Harness configuration loaded from TOML.
//!
//! ```toml
//! memory_gauge = "mysql_query_rules_memory"
//! cleanup = false
//!
//! [range]
//! start = 1000
//! end = 1020
//!
//! [target]
//! principal = "root"
//! backend = { host = "127.0.0.1", port = 6030 }
//!
//! [log]
//! path = "/var/lib/proxysql/proxysql.log"
//!
//! [settle]
//! strategy = "fixed"
//! delay_ms = 100
//!
//! [[scenarios]]
//! from = "per-worker"
//! to = "global"
//! ```
//!
//! Every key is optional; missing keys take the defaults of [`HarnessConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::AlgorithmMode;
use crate::fixture::{BackendEndpoint, IdRange};
use crate::metrics::RULES_MEMORY_GAUGE;
use crate::settle::WaitStrategy;

/// Directory holding the target's log when no explicit path is configured.
pub const LOG_DIR_ENV: &str = "REGULAR_INFRA_DATADIR";

/// File name of the target's log inside [`LOG_DIR_ENV`].
pub const LOG_FILE_NAME: &str = "proxysql.log";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The id range is empty or has odd width.
	#[error("invalid id range [{start}, {end}): {reason}")]
	InvalidRange {
		/// Range start.
		start: u32,
		/// Range end.
		end: u32,
		/// What is wrong with it.
		reason: &'static str,
	},

	/// Error reading a configuration file.
	#[error("I/O error reading {}: {error}", path.display())]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Neither `log.path` nor the log directory variable is set.
	#[error("no log path configured and $REGULAR_INFRA_DATADIR is not set")]
	NoLogPath,

	/// The scenario list is empty.
	#[error("no scenarios configured")]
	NoScenarios,
}

/// One algorithm transition to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
	/// Algorithm active while rules are first loaded.
	pub from: AlgorithmMode,
	/// Algorithm switched to mid-scenario.
	pub to: AlgorithmMode,
}

/// Client identity and backend used for fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
	/// User the probe connects as; fixture rules are keyed on it.
	pub principal: String,
	/// Endpoint every fixture pool points at.
	pub backend: BackendEndpoint,
}

impl Default for TargetConfig {
	fn default() -> Self {
		Self {
			principal: "root".into(),
			backend: BackendEndpoint {
				host: "127.0.0.1".into(),
				port: 6030,
			},
		}
	}
}

/// Where the target's log lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
	/// Explicit log path.
	pub path: Option<PathBuf>,
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
	/// Fixture id range.
	pub range: IdRange,
	/// Client identity and fixture backend.
	pub target: TargetConfig,
	/// Log location.
	pub log: LogConfig,
	/// Wait before counting log evidence.
	pub settle: WaitStrategy,
	/// Gauge sampled for retained rule memory.
	pub memory_gauge: String,
	/// Transitions to verify, in order.
	pub scenarios: Vec<ScenarioSpec>,
	/// Remove fixtures after the suite.
	pub cleanup: bool,
}

impl Default for HarnessConfig {
	fn default() -> Self {
		Self {
			range: IdRange::default(),
			target: TargetConfig::default(),
			log: LogConfig::default(),
			settle: WaitStrategy::default(),
			memory_gauge: RULES_MEMORY_GAUGE.into(),
			scenarios: vec![
				ScenarioSpec {
					from: AlgorithmMode::PerWorker,
					to: AlgorithmMode::Global,
				},
				ScenarioSpec {
					from: AlgorithmMode::Global,
					to: AlgorithmMode::PerWorker,
				},
			],
			cleanup: false,
		}
	}
}

impl HarnessConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Checks constraints serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.scenarios.is_empty() {
			return Err(ConfigError::NoScenarios);
		}
		Ok(())
	}

	/// Log path from `log.path`, falling back to `$REGULAR_INFRA_DATADIR/proxysql.log`.
	pub fn resolve_log_path(&self) -> Result<PathBuf, ConfigError> {
		self.log_path_with(std::env::var_os(LOG_DIR_ENV).map(PathBuf::from))
	}

	fn log_path_with(&self, log_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
		if let Some(path) = &self.log.path {
			return Ok(path.clone());
		}
		log_dir
			.filter(|dir| !dir.as_os_str().is_empty())
			.map(|dir| dir.join(LOG_FILE_NAME))
			.ok_or(ConfigError::NoLogPath)
	}

	/// Number of checks one scenario records when nothing aborts.
	pub fn checks_per_scenario(&self) -> usize {
		// Three probe runs, three active-mode and three other-mode log counts, two memory checks.
		3 * self.range.width() + 3 + 3 + 2
	}

	/// Number of checks the whole suite records when nothing aborts.
	pub fn planned_checks(&self) -> usize {
		self.scenarios.len() * self.checks_per_scenario()
	}
}
