//! Drives probe traffic over a range and checks where each query was routed.
//!
//! For every pair `(i, i + 1)` the probe selects schema `randomschemaname{i}`, sends
//! the writer query (expected destination `i`) and the reader query (expected
//! destination `i + 1`), and reads the resolved destination back from the session
//! document after each. A range of width `W` yields exactly `W` observations.

use thiserror::Error;
use tracing::{debug, debug_span};

use crate::fixture::{IdRange, RuleRole, schema_for};
use crate::report::CheckSink;
use crate::target::{ClientChannel, TargetError, UNKNOWN_DESTINATION, session_destination};

/// Failures that end a range check early.
#[derive(Debug, Error)]
pub enum ProbeError {
	/// The session document did not expose a destination.
	#[error("destination introspection unavailable for schema '{schema}'")]
	IntrospectionUnavailable {
		/// Schema active at the time.
		schema: String,
	},
	/// A client operation failed.
	#[error("{action} failed: {source}")]
	Target {
		/// What the probe was doing.
		action: String,
		/// Underlying target error.
		#[source]
		source: TargetError,
	},
}

/// One routed probe query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
	/// Schema the query ran under.
	pub schema: String,
	/// Rule the query was shaped to hit.
	pub role: RuleRole,
	/// Expected destination.
	pub expected: u32,
	/// Destination reported by the target.
	pub actual: i64,
}

impl Observation {
	/// Whether the query landed where expected.
	pub fn passed(&self) -> bool {
		self.actual == i64::from(self.expected)
	}
}

/// Outcome of a completed range check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
	/// Observations in probe order.
	pub observations: Vec<Observation>,
}

impl ProbeOutcome {
	/// Observations whose destination matched.
	pub fn passed(&self) -> usize {
		self.observations.iter().filter(|o| o.passed()).count()
	}

	/// Observations made.
	pub fn total(&self) -> usize {
		self.observations.len()
	}

	/// True when every observation matched.
	pub fn all_passed(&self) -> bool {
		self.passed() == self.total()
	}
}

/// Routing check over one id range.
#[derive(Debug, Clone, Copy)]
pub struct RoutingProbe {
	range: IdRange,
}

impl RoutingProbe {
	/// Probe for `range`.
	pub const fn new(range: IdRange) -> Self {
		Self { range }
	}

	/// Runs the probe, recording one check per observation into `sink`.
	///
	/// A destination of [`UNKNOWN_DESTINATION`] stops the whole range check: checks
	/// recorded up to that point stay in `sink`, the rest are never issued.
	pub fn verify_range(
		&self,
		client: &mut impl ClientChannel,
		sink: &mut dyn CheckSink,
	) -> Result<ProbeOutcome, ProbeError> {
		let _span = debug_span!("routing_probe", range = %self.range).entered();
		let mut outcome = ProbeOutcome::default();

		for i in self.range.pair_starts() {
			let schema = schema_for(i);
			debug!(%schema, "changing schema");
			client
				.select_schema(&schema)
				.map_err(|source| ProbeError::Target {
					action: format!("selecting schema '{schema}'"),
					source,
				})?;

			for role in RuleRole::BOTH {
				let observation = observe(client, &schema, role, i)?;
				sink.record(
					observation.passed(),
					format!(
						"Destination hostgroup matches expected - Exp: {}, Act: {}",
						observation.expected, observation.actual
					),
				);
				outcome.observations.push(observation);
			}
		}

		debug!(passed = outcome.passed(), total = outcome.total(), "routing probe done");
		Ok(outcome)
	}
}

fn observe(
	client: &mut impl ClientChannel,
	schema: &str,
	role: RuleRole,
	pair_start: u32,
) -> Result<Observation, ProbeError> {
	let sql = role.probe_query();
	debug!(%schema, sql, role = role.name(), "issuing probe query");
	client.query(sql).map_err(|source| ProbeError::Target {
		action: format!("query `{sql}` on '{schema}'"),
		source,
	})?;

	let session = client
		.internal_session()
		.map_err(|source| ProbeError::Target {
			action: "session introspection".into(),
			source,
		})?;
	let actual = session_destination(&session);
	if actual == UNKNOWN_DESTINATION {
		return Err(ProbeError::IntrospectionUnavailable {
			schema: schema.to_owned(),
		});
	}

	Ok(Observation {
		schema: schema.to_owned(),
		role,
		expected: role.destination(pair_start),
		actual,
	})
}
