use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use fastroute_harness::algorithm::{ALGORITHM_VARIABLE, AlgorithmMode};
use fastroute_harness::fixture::{BackendPool, FlagRule, RoutingRule, RuleKey};
use fastroute_harness::metrics::RULES_MEMORY_GAUGE;
use fastroute_harness::target::{AdminCommand, RuntimeModule, StatsQuery, TargetError};
use fastroute_harness::verifier::{QUERY_PROCESSOR_DEBUG_MODULE, SEARCH_EVENT_VERBOSITY};
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::faults::{GaugeFault, SimFaults};
use crate::proxy::SimOptions;

/// Pool queries land on when no fast routing rule matches.
pub(crate) const DEFAULT_DESTINATION: i64 = 0;

const MISROUTE_OFFSET: i64 = 100;

/// Fast routing index as built by the last query rule load.
#[derive(Debug)]
struct FastIndex {
	mode: AlgorithmMode,
	entries: HashMap<RuleKey, u32>,
}

/// Everything behind the admin and traffic ports.
pub(crate) struct ProxyState {
	options: SimOptions,
	log: File,
	staged_vars: HashMap<String, String>,
	runtime_vars: HashMap<String, String>,
	staged_debug: HashMap<String, u8>,
	runtime_debug: HashMap<String, u8>,
	staged_pools: BTreeMap<u32, BackendPool>,
	runtime_pools: BTreeMap<u32, BackendPool>,
	staged_flag_rules: BTreeMap<u32, FlagRule>,
	runtime_flag_rules: Vec<(Regex, u8)>,
	staged_fast_rules: Vec<RoutingRule>,
	index: FastIndex,
	admin_commands: usize,
	connected: bool,
}

impl ProxyState {
	pub(crate) fn new(options: SimOptions, log: File) -> Self {
		let mut vars = HashMap::new();
		vars.insert("admin-debug".to_owned(), "0".to_owned());
		vars.insert(
			ALGORITHM_VARIABLE.to_owned(),
			AlgorithmMode::PerWorker.variable_value().to_string(),
		);
		Self {
			options,
			log,
			staged_vars: vars.clone(),
			runtime_vars: vars,
			staged_debug: HashMap::new(),
			runtime_debug: HashMap::new(),
			staged_pools: BTreeMap::new(),
			runtime_pools: BTreeMap::new(),
			staged_flag_rules: BTreeMap::new(),
			runtime_flag_rules: Vec::new(),
			staged_fast_rules: Vec::new(),
			index: FastIndex {
				mode: AlgorithmMode::PerWorker,
				entries: HashMap::new(),
			},
			admin_commands: 0,
			connected: true,
		}
	}

	fn faults(&self) -> &SimFaults {
		&self.options.faults
	}

	fn ensure_connected(&self) -> Result<(), TargetError> {
		if self.connected {
			Ok(())
		} else {
			Err(TargetError::Connection("Lost connection to server during query".into()))
		}
	}

	/// Counts an admin round trip, dropping the link once the fault budget is spent.
	fn admin_round_trip(&mut self) -> Result<(), TargetError> {
		self.ensure_connected()?;
		self.admin_commands += 1;
		if let Some(limit) = self.faults().drop_connection_after
			&& self.admin_commands > limit
		{
			warn!(after = limit, "dropping connection");
			self.connected = false;
		}
		self.ensure_connected()
	}

	pub(crate) fn execute(&mut self, command: &AdminCommand) -> Result<(), TargetError> {
		self.admin_round_trip()?;
		trace!(%command, "admin command");
		match command {
			AdminCommand::SetVariable { name, value } => {
				self.staged_vars.insert(name.clone(), value.clone());
			}
			AdminCommand::LoadToRuntime(module) => self.load(*module)?,
			AdminCommand::SetDebugVerbosity { module, verbosity } => {
				self.staged_debug.insert(module.clone(), *verbosity);
			}
			AdminCommand::DeletePools(range) => {
				self.staged_pools.retain(|id, _| !range.contains(*id));
			}
			AdminCommand::InsertPools(pools) => {
				if let Some(pool) = pools.iter().find(|p| self.staged_pools.contains_key(&p.pool_id)) {
					return Err(TargetError::Rejected(format!(
						"UNIQUE constraint failed: mysql_servers.hostgroup_id ({})",
						pool.pool_id
					)));
				}
				for pool in pools {
					self.staged_pools.insert(pool.pool_id, pool.clone());
				}
			}
			AdminCommand::DeleteRoutingRules(None) => self.staged_fast_rules.clear(),
			AdminCommand::DeleteRoutingRules(Some(range)) => {
				self.staged_fast_rules.retain(|rule| !range.contains(rule.destination));
			}
			AdminCommand::InsertRoutingRules(rules) => {
				if self.faults().reject_rule_inserts {
					return Err(TargetError::Rejected(
						"table mysql_query_rules_fast_routing is read-only".into(),
					));
				}
				let duplicate = rules
					.iter()
					.find(|rule| self.staged_fast_rules.iter().any(|staged| staged.key == rule.key));
				if let Some(rule) = duplicate {
					return Err(TargetError::Rejected(format!(
						"UNIQUE constraint failed: mysql_query_rules_fast_routing ({}, {}, {})",
						rule.key.principal, rule.key.schema, rule.key.flag
					)));
				}
				self.staged_fast_rules.extend(rules.iter().cloned());
			}
			AdminCommand::DeleteFlagRules => self.staged_flag_rules.clear(),
			AdminCommand::InsertFlagRule(rule) => {
				if self.staged_flag_rules.contains_key(&rule.rule_id) {
					return Err(TargetError::Rejected(format!(
						"UNIQUE constraint failed: mysql_query_rules.rule_id ({})",
						rule.rule_id
					)));
				}
				self.staged_flag_rules.insert(rule.rule_id, rule.clone());
			}
		}
		Ok(())
	}

	fn load(&mut self, module: RuntimeModule) -> Result<(), TargetError> {
		match module {
			RuntimeModule::AdminVariables => self.promote_vars("admin-"),
			RuntimeModule::MysqlVariables => {
				self.promote_vars("mysql-");
				if self.faults().rebuild_on_variable_load {
					self.rebuild_index();
				}
			}
			RuntimeModule::Debug => self.runtime_debug = self.staged_debug.clone(),
			RuntimeModule::Servers => self.runtime_pools = self.staged_pools.clone(),
			RuntimeModule::QueryRules => {
				let mut compiled = Vec::with_capacity(self.staged_flag_rules.len());
				for rule in self.staged_flag_rules.values() {
					let pattern = Regex::new(&rule.match_pattern).map_err(|err| {
						TargetError::Rejected(format!("invalid match_pattern for rule {}: {err}", rule.rule_id))
					})?;
					compiled.push((pattern, rule.flag_out));
				}
				self.runtime_flag_rules = compiled;
				self.rebuild_index();
			}
		}
		Ok(())
	}

	fn promote_vars(&mut self, prefix: &str) {
		for (name, value) in &self.staged_vars {
			if name.starts_with(prefix) {
				self.runtime_vars.insert(name.clone(), value.clone());
			}
		}
	}

	fn runtime_algorithm(&self) -> AlgorithmMode {
		self.runtime_vars
			.get(ALGORITHM_VARIABLE)
			.and_then(|value| AlgorithmMode::from_variable_value(value))
			.unwrap_or(AlgorithmMode::PerWorker)
	}

	fn rebuild_index(&mut self) {
		let mode = self.runtime_algorithm();
		let entries = self
			.staged_fast_rules
			.iter()
			.map(|rule| (rule.key.clone(), rule.destination))
			.collect();
		self.index = FastIndex { mode, entries };
		debug!(%mode, rules = self.index.entries.len(), "rebuilt fast routing index");
	}

	/// Bytes retained by the fast routing index.
	pub(crate) fn rules_memory(&self) -> i64 {
		let copies = match self.index.mode {
			_ if self.faults().memory_ignores_algorithm => 1,
			AlgorithmMode::PerWorker => self.options.workers as i64,
			AlgorithmMode::Global => 1,
		};
		let rules = self.index.entries.len() as i64;
		self.options.base_bytes + rules * copies * self.options.rule_bytes
	}

	pub(crate) fn query_first(&mut self, query: &StatsQuery) -> Result<Option<String>, TargetError> {
		self.admin_round_trip()?;
		match query {
			StatsQuery::MemoryMetric(name) if name == RULES_MEMORY_GAUGE => Ok(match self.faults().gauge {
				GaugeFault::None => Some(self.rules_memory().to_string()),
				GaugeFault::Missing => None,
				GaugeFault::Garbage => Some("n/a".into()),
			}),
			StatsQuery::MemoryMetric(_) => Ok(None),
		}
	}

	fn search_tracing(&self) -> bool {
		let debug_on = self.runtime_vars.get("admin-debug").is_some_and(|v| v == "1" || v == "true");
		let verbosity = self
			.runtime_debug
			.get(QUERY_PROCESSOR_DEBUG_MODULE)
			.copied()
			.unwrap_or(0);
		debug_on && verbosity >= SEARCH_EVENT_VERBOSITY && !self.faults().suppress_search_log
	}

	/// Resolves the destination for `sql` issued by `user` in `schema`.
	pub(crate) fn route(&mut self, user: &str, schema: &str, sql: &str) -> Result<i64, TargetError> {
		self.ensure_connected()?;
		let flag = self
			.runtime_flag_rules
			.iter()
			.find(|(pattern, _)| pattern.is_match(sql))
			.map_or(0, |(_, flag)| *flag);
		let key = RuleKey {
			principal: user.to_owned(),
			schema: schema.to_owned(),
			flag,
		};

		if self.search_tracing() {
			let event = self.index.mode.search_event();
			self.write_log(&format!("Processing query for user={user} schema={schema}: {sql}"))?;
			self.write_log(&format!("{event} # user={user} schema={schema} flagIN={flag}"))?;
		}

		let destination = self
			.index
			.entries
			.get(&key)
			.map_or(DEFAULT_DESTINATION, |&id| i64::from(id));
		Ok(match self.faults().misroute {
			Some(id) if i64::from(id) == destination => destination + MISROUTE_OFFSET,
			_ => destination,
		})
	}

	pub(crate) fn broken_introspection(&self) -> bool {
		self.faults().broken_introspection
	}

	pub(crate) fn runtime_pool_count(&self) -> usize {
		self.runtime_pools.len()
	}

	pub(crate) fn index_mode(&self) -> AlgorithmMode {
		self.index.mode
	}

	fn write_log(&mut self, message: &str) -> Result<(), TargetError> {
		let now = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_or(0, |elapsed| elapsed.as_micros());
		writeln!(self.log, "{now} Query_Processor.cpp: {message}")
			.map_err(|err| TargetError::Rejected(format!("failed to write log: {err}")))
	}
}

#[cfg(test)]
mod tests;
