//! Deterministic backend pool and routing rule fixtures over an id range.
//!
//! Every unit of the range yields one pool and one rule: ids come in `(i, i + 1)`
//! pairs where `i` is the writer destination and `i + 1` the reader destination for
//! schema `randomschemaname{i}`. Provisioning deletes the range's rows before
//! inserting, so it can be repeated. It never loads anything to runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;
use crate::target::{AdminChannel, AdminCommand, RuntimeModule, TargetError};

/// Prefix of every fixture schema name.
pub const SCHEMA_PREFIX: &str = "randomschemaname";

/// Half-open, even-width range of destination ids `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct IdRange {
	start: u32,
	end: u32,
}

#[derive(Serialize, Deserialize)]
struct RawRange {
	start: u32,
	end: u32,
}

impl TryFrom<RawRange> for IdRange {
	type Error = ConfigError;

	fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
		Self::new(raw.start, raw.end)
	}
}

impl From<IdRange> for RawRange {
	fn from(range: IdRange) -> Self {
		Self {
			start: range.start,
			end: range.end,
		}
	}
}

impl IdRange {
	/// Creates a range; it must be non-empty and hold whole writer/reader pairs.
	pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
		if end <= start {
			return Err(ConfigError::InvalidRange {
				start,
				end,
				reason: "end must be greater than start",
			});
		}
		if (end - start) % 2 != 0 {
			return Err(ConfigError::InvalidRange {
				start,
				end,
				reason: "width must be even",
			});
		}
		Ok(Self { start, end })
	}

	/// First id.
	pub const fn start(self) -> u32 {
		self.start
	}

	/// One past the last id.
	pub const fn end(self) -> u32 {
		self.end
	}

	/// Last id in the range.
	pub const fn last(self) -> u32 {
		self.end - 1
	}

	/// Number of ids, which is also the number of routing observations per probe.
	pub const fn width(self) -> usize {
		(self.end - self.start) as usize
	}

	/// Returns true if `id` lies in the range.
	pub const fn contains(self, id: u32) -> bool {
		id >= self.start && id < self.end
	}

	/// Writer ids: `start, start + 2, …`.
	pub fn pair_starts(self) -> impl Iterator<Item = u32> {
		(self.start..self.end).step_by(2)
	}
}

impl Default for IdRange {
	fn default() -> Self {
		Self {
			start: 1000,
			end: 1020,
		}
	}
}

impl fmt::Display for IdRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}, {})", self.start, self.end)
	}
}

/// Which rule of a pair a query is meant to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleRole {
	/// Flag 0, destination `i`.
	Writer,
	/// Flag 1, destination `i + 1`.
	Reader,
}

impl RuleRole {
	/// Both roles in probe order.
	pub const BOTH: [Self; 2] = [Self::Writer, Self::Reader];

	/// Flag the role's rule is keyed on.
	pub const fn flag(self) -> u8 {
		match self {
			Self::Writer => 0,
			Self::Reader => 1,
		}
	}

	/// Destination for the pair starting at `pair_start`.
	pub const fn destination(self, pair_start: u32) -> u32 {
		pair_start + self.flag() as u32
	}

	/// Probe query whose shape the flag rules map onto this role.
	pub const fn probe_query(self) -> &'static str {
		match self {
			Self::Writer => "SELECT 1",
			Self::Reader => "SELECT 2",
		}
	}

	/// Lowercase role name.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Writer => "writer",
			Self::Reader => "reader",
		}
	}
}

/// Schema name embedding `id`.
pub fn schema_for(id: u32) -> String {
	format!("{SCHEMA_PREFIX}{id}")
}

/// Host and port every fixture pool points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendEndpoint {
	/// Backend host name.
	pub host: String,
	/// Backend port.
	pub port: u16,
}

/// A backend pool definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPool {
	/// Pool (hostgroup) id.
	pub pool_id: u32,
	/// Backend host.
	pub host: String,
	/// Backend port.
	pub port: u16,
}

/// Identity of a fast routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
	/// User the rule applies to.
	pub principal: String,
	/// Schema the rule applies to.
	pub schema: String,
	/// Flag set by the regular query rules.
	pub flag: u8,
}

/// A fast routing rule and its expected outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
	/// Lookup key.
	pub key: RuleKey,
	/// Destination pool id.
	pub destination: u32,
	/// Free-form comment stored with the rule.
	pub comment: String,
}

/// Regular query rule that tags a probe shape with a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRule {
	/// Rule id.
	pub rule_id: u32,
	/// Anchored pattern matched against the query text.
	pub match_pattern: String,
	/// Flag assigned on match.
	pub flag_out: u8,
	/// Result cache TTL in milliseconds.
	pub cache_ttl_ms: u64,
}

impl FlagRule {
	/// The rule routing `role`'s probe query onto its flag.
	pub fn for_role(role: RuleRole) -> Self {
		Self {
			rule_id: u32::from(role.flag()) + 1,
			match_pattern: format!("^{}$", role.probe_query()),
			flag_out: role.flag(),
			cache_ttl_ms: 600_000,
		}
	}
}

/// Fixture writes that failed part way.
#[derive(Debug, Error)]
pub enum ProvisionError {
	/// The target refused or dropped a fixture statement.
	#[error("failed to provision {what} for {range}: {source}")]
	Target {
		/// Range being provisioned.
		range: IdRange,
		/// Fixture kind.
		what: &'static str,
		/// Underlying target error.
		#[source]
		source: TargetError,
	},
	/// The flag rules could not be installed.
	#[error("failed to install flag rules: {0}")]
	FlagRules(#[source] TargetError),
}

/// Builds and writes fixtures for one client principal and backend endpoint.
#[derive(Debug, Clone)]
pub struct FixtureProvisioner {
	principal: String,
	backend: BackendEndpoint,
}

impl FixtureProvisioner {
	/// Creates a provisioner.
	pub fn new(principal: impl Into<String>, backend: BackendEndpoint) -> Self {
		Self {
			principal: principal.into(),
			backend,
		}
	}

	/// Pool definitions for `range`, in id order.
	pub fn pools(&self, range: IdRange) -> Vec<BackendPool> {
		(range.start()..range.end())
			.map(|pool_id| BackendPool {
				pool_id,
				host: self.backend.host.clone(),
				port: self.backend.port,
			})
			.collect()
	}

	/// Routing rules for `range`, writer then reader for each pair.
	pub fn rules(&self, range: IdRange) -> Vec<RoutingRule> {
		range
			.pair_starts()
			.flat_map(|i| {
				RuleRole::BOTH.map(|role| {
					let destination = role.destination(i);
					RoutingRule {
						key: RuleKey {
							principal: self.principal.clone(),
							schema: schema_for(i),
							flag: role.flag(),
						},
						destination,
						comment: format!("{}{destination}", role.name()),
					}
				})
			})
			.collect()
	}

	/// Replaces the range's backend pools. Returns the number of pools written.
	pub fn provision_pools(
		&self,
		admin: &mut impl AdminChannel,
		range: IdRange,
	) -> Result<usize, ProvisionError> {
		let fail = |source| ProvisionError::Target {
			range,
			what: "backend pools",
			source,
		};
		admin.execute(&AdminCommand::DeletePools(range)).map_err(fail)?;

		let pools = self.pools(range);
		for pair in pools.chunks(2) {
			admin
				.execute(&AdminCommand::InsertPools(pair.to_vec()))
				.map_err(fail)?;
		}
		debug!(%range, count = pools.len(), "provisioned backend pools");
		Ok(pools.len())
	}

	/// Replaces the range's fast routing rules. Returns the number of rules written.
	pub fn provision_rules(
		&self,
		admin: &mut impl AdminChannel,
		range: IdRange,
	) -> Result<usize, ProvisionError> {
		let fail = |source| ProvisionError::Target {
			range,
			what: "routing rules",
			source,
		};
		admin
			.execute(&AdminCommand::DeleteRoutingRules(Some(range)))
			.map_err(fail)?;

		let rules = self.rules(range);
		for pair in rules.chunks(2) {
			admin
				.execute(&AdminCommand::InsertRoutingRules(pair.to_vec()))
				.map_err(fail)?;
		}
		debug!(%range, count = rules.len(), "provisioned routing rules");
		Ok(rules.len())
	}

	/// Installs the regular rules mapping probe shapes to flags and clears every fast
	/// routing rule, then loads rules to runtime.
	pub fn install_flag_rules(&self, admin: &mut impl AdminChannel) -> Result<(), ProvisionError> {
		let mut commands = vec![AdminCommand::DeleteFlagRules];
		commands.extend(
			RuleRole::BOTH.map(|role| AdminCommand::InsertFlagRule(FlagRule::for_role(role))),
		);
		commands.push(AdminCommand::DeleteRoutingRules(None));
		commands.push(AdminCommand::LoadToRuntime(RuntimeModule::QueryRules));

		for command in &commands {
			admin.execute(command).map_err(ProvisionError::FlagRules)?;
		}
		Ok(())
	}

	/// Removes the range's rules and pools and loads both to runtime.
	pub fn teardown(&self, admin: &mut impl AdminChannel, range: IdRange) -> Result<(), ProvisionError> {
		let fail = |source| ProvisionError::Target {
			range,
			what: "teardown",
			source,
		};
		for command in [
			AdminCommand::DeleteRoutingRules(Some(range)),
			AdminCommand::LoadToRuntime(RuntimeModule::QueryRules),
			AdminCommand::DeletePools(range),
			AdminCommand::LoadToRuntime(RuntimeModule::Servers),
		] {
			admin.execute(&command).map_err(fail)?;
		}
		debug!(%range, "removed fixtures");
		Ok(())
	}
}

#[cfg(test)]
mod tests;
