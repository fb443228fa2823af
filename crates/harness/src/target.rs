//! Narrow interfaces to the proxy under test.
//!
//! The harness never speaks the wire protocol itself. A driver implements
//! [`ClientChannel`] for the traffic port and [`AdminChannel`] for the admin port;
//! [`AdminCommand`] renders to the admin SQL dialect through [`Display`] so a driver
//! can send `command.to_string()` verbatim.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::fixture::{BackendPool, FlagRule, IdRange, RoutingRule};

/// Destination reported when the session document has no usable destination.
pub const UNKNOWN_DESTINATION: i64 = -2;

/// Failure reported by a target driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
	/// Link lost or never established.
	#[error("connection error: {0}")]
	Connection(String),
	/// The target refused the statement.
	#[error("statement rejected: {0}")]
	Rejected(String),
}

impl TargetError {
	/// Returns true for transport failures.
	pub const fn is_connection(&self) -> bool {
		matches!(self, Self::Connection(_))
	}
}

/// Traffic-port operations used by the routing probe.
pub trait ClientChannel {
	/// Switches the session's default schema.
	fn select_schema(&mut self, schema: &str) -> Result<(), TargetError>;

	/// Runs `sql` and discards its result set.
	fn query(&mut self, sql: &str) -> Result<(), TargetError>;

	/// Returns the session introspection document.
	fn internal_session(&mut self) -> Result<Value, TargetError>;
}

/// Admin-port operations used for configuration, fixtures and stats.
pub trait AdminChannel {
	/// Executes an administrative statement.
	fn execute(&mut self, command: &AdminCommand) -> Result<(), TargetError>;

	/// Returns the first column of the first row, or `None` for an empty result.
	fn query_first(&mut self, query: &StatsQuery) -> Result<Option<String>, TargetError>;
}

impl<T: ClientChannel + ?Sized> ClientChannel for &mut T {
	fn select_schema(&mut self, schema: &str) -> Result<(), TargetError> {
		(**self).select_schema(schema)
	}

	fn query(&mut self, sql: &str) -> Result<(), TargetError> {
		(**self).query(sql)
	}

	fn internal_session(&mut self) -> Result<Value, TargetError> {
		(**self).internal_session()
	}
}

impl<T: AdminChannel + ?Sized> AdminChannel for &mut T {
	fn execute(&mut self, command: &AdminCommand) -> Result<(), TargetError> {
		(**self).execute(command)
	}

	fn query_first(&mut self, query: &StatsQuery) -> Result<Option<String>, TargetError> {
		(**self).query_first(query)
	}
}

/// Extracts the last-resolved destination from a session document.
///
/// Returns [`UNKNOWN_DESTINATION`] when `qpo.destination_hostgroup` is missing or not
/// an integer.
pub fn session_destination(session: &Value) -> i64 {
	session
		.get("qpo")
		.and_then(|qpo| qpo.get("destination_hostgroup"))
		.and_then(Value::as_i64)
		.unwrap_or(UNKNOWN_DESTINATION)
}

/// Configuration layers that "load … to runtime" can activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeModule {
	/// Admin variables (`admin-*`).
	AdminVariables,
	/// Proxy variables (`mysql-*`).
	MysqlVariables,
	/// Regular and fast routing query rules.
	QueryRules,
	/// Backend pool definitions.
	Servers,
	/// Debug module verbosity levels.
	Debug,
}

impl RuntimeModule {
	const fn keyword(self) -> &'static str {
		match self {
			Self::AdminVariables => "ADMIN VARIABLES",
			Self::MysqlVariables => "MYSQL VARIABLES",
			Self::QueryRules => "MYSQL QUERY RULES",
			Self::Servers => "MYSQL SERVERS",
			Self::Debug => "DEBUG",
		}
	}
}

/// Administrative statements issued by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
	/// `SET name=value`.
	SetVariable {
		/// Variable name.
		name: String,
		/// New value.
		value: String,
	},
	/// Activates a staged configuration layer.
	LoadToRuntime(RuntimeModule),
	/// Sets verbosity for one debug module.
	SetDebugVerbosity {
		/// Debug module name.
		module: String,
		/// Verbosity level.
		verbosity: u8,
	},
	/// Deletes backend pools whose id lies in the range.
	DeletePools(IdRange),
	/// Inserts backend pools.
	InsertPools(Vec<BackendPool>),
	/// Deletes fast routing rules, all of them or those whose destination lies in the range.
	DeleteRoutingRules(Option<IdRange>),
	/// Inserts fast routing rules.
	InsertRoutingRules(Vec<RoutingRule>),
	/// Deletes every regular query rule.
	DeleteFlagRules,
	/// Inserts one regular query rule.
	InsertFlagRule(FlagRule),
}

impl AdminCommand {
	/// `SET name=value` for any displayable value.
	pub fn set(name: impl Into<String>, value: impl fmt::Display) -> Self {
		Self::SetVariable {
			name: name.into(),
			value: value.to_string(),
		}
	}
}

impl fmt::Display for AdminCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::SetVariable { name, value } => write!(f, "SET {name}={value}"),
			Self::LoadToRuntime(module) => write!(f, "LOAD {} TO RUNTIME", module.keyword()),
			Self::SetDebugVerbosity { module, verbosity } => write!(
				f,
				"UPDATE debug_levels SET verbosity={verbosity} WHERE module='{}'",
				quote(module)
			),
			Self::DeletePools(range) => write!(
				f,
				"DELETE FROM mysql_servers WHERE hostgroup_id BETWEEN {} AND {}",
				range.start(),
				range.last()
			),
			Self::InsertPools(pools) => {
				f.write_str("INSERT INTO mysql_servers (hostgroup_id, hostname, port) VALUES ")?;
				for (n, pool) in pools.iter().enumerate() {
					if n > 0 {
						f.write_str(",")?;
					}
					write!(f, "({},'{}',{})", pool.pool_id, quote(&pool.host), pool.port)?;
				}
				Ok(())
			}
			Self::DeleteRoutingRules(None) => f.write_str("DELETE FROM mysql_query_rules_fast_routing"),
			Self::DeleteRoutingRules(Some(range)) => write!(
				f,
				"DELETE FROM mysql_query_rules_fast_routing WHERE destination_hostgroup BETWEEN {} AND {}",
				range.start(),
				range.last()
			),
			Self::InsertRoutingRules(rules) => {
				f.write_str(
					"INSERT INTO mysql_query_rules_fast_routing \
					 (username, schemaname, flagIN, destination_hostgroup, comment) VALUES ",
				)?;
				for (n, rule) in rules.iter().enumerate() {
					if n > 0 {
						f.write_str(",")?;
					}
					write!(
						f,
						"('{}','{}',{},{},'{}')",
						quote(&rule.key.principal),
						quote(&rule.key.schema),
						rule.key.flag,
						rule.destination,
						quote(&rule.comment)
					)?;
				}
				Ok(())
			}
			Self::DeleteFlagRules => f.write_str("DELETE FROM mysql_query_rules"),
			Self::InsertFlagRule(rule) => write!(
				f,
				"INSERT INTO mysql_query_rules (rule_id, active, match_pattern, flagOUT, cache_ttl) \
				 VALUES ({},1,'{}',{},{})",
				rule.rule_id,
				quote(&rule.match_pattern),
				rule.flag_out,
				rule.cache_ttl_ms
			),
		}
	}
}

/// Stats reads issued by the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsQuery {
	/// One row of `stats_memory_metrics`.
	MemoryMetric(String),
}

impl fmt::Display for StatsQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::MemoryMetric(name) => write!(
				f,
				"SELECT variable_value FROM stats_memory_metrics WHERE variable_name='{}'",
				quote(name)
			),
		}
	}
}

fn quote(text: &str) -> String {
	text.replace('\'', "''")
}
