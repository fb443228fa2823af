//! Error taxonomy for harness runs.
//!
//! Assertion mismatches are never errors; they are recorded as failed checks. The
//! variants here are the conditions that stop some part of a run, and
//! [`HarnessError::scope`] says how much.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fixture::ProvisionError;
use crate::log_tail::LogError;
use crate::metrics::MetricError;
use crate::probe::ProbeError;
use crate::target::TargetError;

/// How much of a run an error brings down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
	/// Abort every remaining scenario.
	Suite,
	/// Abort the current scenario; the suite moves on to the next one.
	Scenario,
	/// Abort the current routing range check; the scenario continues.
	RangeCheck,
}

/// Errors that stop a harness run or part of it.
#[derive(Debug, Error)]
pub enum HarnessError {
	/// The link to the target was lost or never established.
	#[error("connection to target lost during {context}: {message}")]
	Connection {
		/// What the harness was doing.
		context: String,
		/// Transport-level message.
		message: String,
	},

	/// Fixture rows could not be written; the target may hold partial state.
	#[error(transparent)]
	Provisioning(#[from] ProvisionError),

	/// The session introspection channel returned the unknown destination sentinel.
	#[error("destination introspection unavailable for schema '{schema}'")]
	IntrospectionUnavailable {
		/// Schema active when introspection failed.
		schema: String,
	},

	/// A gauge value could not be parsed as an integer.
	#[error("failed to parse gauge '{name}' as integer: {raw:?}")]
	Parse {
		/// Gauge name.
		name: String,
		/// Raw value returned by the target.
		raw: String,
	},

	/// A gauge query returned no row.
	#[error("received empty result for gauge '{name}'")]
	EmptyResult {
		/// Gauge name.
		name: String,
	},

	/// The log stream could not be opened or read.
	#[error("log stream unavailable: {0}")]
	LogAccess(#[from] LogError),

	/// The target rejected an administrative command.
	#[error("target rejected `{command}`: {source}")]
	Command {
		/// Rendered command text.
		command: String,
		/// Underlying target error.
		#[source]
		source: TargetError,
	},

	/// The harness configuration is invalid.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl HarnessError {
	/// Classifies a raw target failure that happened while running `context`.
	pub fn from_target(context: impl Into<String>, err: TargetError) -> Self {
		match err {
			TargetError::Connection(message) => Self::Connection {
				context: context.into(),
				message,
			},
			other => Self::Command {
				command: context.into(),
				source: other,
			},
		}
	}

	/// Returns true when the error leaves the target reachable, so fixture cleanup can
	/// still be attempted.
	pub fn target_reachable(&self) -> bool {
		match self {
			Self::Provisioning(
				ProvisionError::Target { source, .. } | ProvisionError::FlagRules(source),
			) => !source.is_connection(),
			Self::Connection { .. } | Self::LogAccess(_) | Self::Config(_) => false,
			_ => true,
		}
	}

	/// Returns how much of the run this error aborts.
	pub fn scope(&self) -> ErrorScope {
		match self {
			Self::Connection { .. }
			| Self::Provisioning(_)
			| Self::LogAccess(_)
			| Self::Config(_) => ErrorScope::Suite,
			Self::Parse { .. } | Self::EmptyResult { .. } | Self::Command { .. } => {
				ErrorScope::Scenario
			}
			Self::IntrospectionUnavailable { .. } => ErrorScope::RangeCheck,
		}
	}
}

impl From<MetricError> for HarnessError {
	fn from(err: MetricError) -> Self {
		match err {
			MetricError::Parse { name, raw } => Self::Parse { name, raw },
			MetricError::EmptyResult { name } => Self::EmptyResult { name },
			MetricError::Target { query, source } => Self::from_target(query, source),
		}
	}
}

impl From<ProbeError> for HarnessError {
	fn from(err: ProbeError) -> Self {
		match err {
			ProbeError::IntrospectionUnavailable { schema } => {
				Self::IntrospectionUnavailable { schema }
			}
			ProbeError::Target { action, source } => Self::from_target(action, source),
		}
	}
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests;
