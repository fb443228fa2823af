use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fastroute_harness::AlgorithmMode;
use fastroute_harness::target::{AdminChannel, AdminCommand, ClientChannel, StatsQuery, TargetError};
use parking_lot::Mutex;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::faults::SimFaults;
use crate::state::ProxyState;

/// Sizing of the simulated proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimOptions {
	/// Worker threads, each holding an index copy in per-worker mode.
	pub workers: usize,
	/// Bytes per rule per index copy.
	pub rule_bytes: i64,
	/// Bytes reported with no rules loaded.
	pub base_bytes: i64,
	/// Injected misbehavior.
	pub faults: SimFaults,
}

impl Default for SimOptions {
	fn default() -> Self {
		Self {
			workers: 4,
			rule_bytes: 256,
			base_bytes: 8192,
			faults: SimFaults::default(),
		}
	}
}

impl SimOptions {
	/// Default sizing with `faults` injected.
	pub fn with_faults(faults: SimFaults) -> Self {
		Self {
			faults,
			..Self::default()
		}
	}
}

/// Errors creating a simulated proxy.
#[derive(Debug, Error)]
pub enum SimError {
	/// The search-event log could not be opened for appending.
	#[error("failed to open log {path}: {source}")]
	Log {
		/// Log path.
		path: PathBuf,
		/// Underlying I/O error.
		#[source]
		source: io::Error,
	},
}

/// A simulated proxy writing its search events to a log file.
#[derive(Clone)]
pub struct SimulatedProxy {
	state: Arc<Mutex<ProxyState>>,
	log_path: PathBuf,
}

impl SimulatedProxy {
	/// Starts a proxy appending to `log_path`, creating the file if needed.
	pub fn new(log_path: impl Into<PathBuf>, options: SimOptions) -> Result<Self, SimError> {
		let log_path = log_path.into();
		let log = OpenOptions::new()
			.create(true)
			.append(true)
			.open(&log_path)
			.map_err(|source| SimError::Log {
				path: log_path.clone(),
				source,
			})?;
		debug!(path = %log_path.display(), workers = options.workers, "simulated proxy started");
		Ok(Self {
			state: Arc::new(Mutex::new(ProxyState::new(options, log))),
			log_path,
		})
	}

	/// Log file the proxy writes to.
	pub fn log_path(&self) -> &Path {
		&self.log_path
	}

	/// Admin-port handle.
	pub fn admin(&self) -> SimAdmin {
		SimAdmin {
			state: Arc::clone(&self.state),
		}
	}

	/// Traffic-port handle authenticated as `user`.
	pub fn client(&self, user: impl Into<String>) -> SimClient {
		SimClient {
			state: Arc::clone(&self.state),
			user: user.into(),
			schema: String::new(),
			last_destination: None,
		}
	}

	/// Current value of the rule memory gauge.
	pub fn rules_memory(&self) -> i64 {
		self.state.lock().rules_memory()
	}

	/// Algorithm the live fast routing index was built under.
	pub fn index_mode(&self) -> AlgorithmMode {
		self.state.lock().index_mode()
	}

	/// Backend pools active at runtime.
	pub fn runtime_pool_count(&self) -> usize {
		self.state.lock().runtime_pool_count()
	}
}

/// Admin-port handle of a [`SimulatedProxy`].
pub struct SimAdmin {
	state: Arc<Mutex<ProxyState>>,
}

impl AdminChannel for SimAdmin {
	fn execute(&mut self, command: &AdminCommand) -> Result<(), TargetError> {
		self.state.lock().execute(command)
	}

	fn query_first(&mut self, query: &StatsQuery) -> Result<Option<String>, TargetError> {
		self.state.lock().query_first(query)
	}
}

/// Traffic-port session of a [`SimulatedProxy`].
pub struct SimClient {
	state: Arc<Mutex<ProxyState>>,
	user: String,
	schema: String,
	last_destination: Option<i64>,
}

impl ClientChannel for SimClient {
	fn select_schema(&mut self, schema: &str) -> Result<(), TargetError> {
		schema.clone_into(&mut self.schema);
		Ok(())
	}

	fn query(&mut self, sql: &str) -> Result<(), TargetError> {
		let destination = self.state.lock().route(&self.user, &self.schema, sql)?;
		self.last_destination = Some(destination);
		Ok(())
	}

	fn internal_session(&mut self) -> Result<Value, TargetError> {
		if self.state.lock().broken_introspection() {
			return Ok(json!({ "qpo": {} }));
		}
		Ok(match self.last_destination {
			Some(destination) => json!({ "qpo": { "destination_hostgroup": destination } }),
			None => json!({ "qpo": { "destination_hostgroup": -1 } }),
		})
	}
}
