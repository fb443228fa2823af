//! Single-shot reads of a named numeric gauge from the target's stats tables.

use thiserror::Error;
use tracing::debug;

use crate::target::{AdminChannel, StatsQuery, TargetError};

/// Gauge holding the memory retained by query rules.
pub const RULES_MEMORY_GAUGE: &str = "mysql_query_rules_memory";

/// Failures reading a gauge.
#[derive(Debug, Error)]
pub enum MetricError {
	/// The value is not an integer.
	#[error("failed to parse gauge '{name}' as integer: {raw:?}")]
	Parse {
		/// Gauge name.
		name: String,
		/// Raw value.
		raw: String,
	},
	/// The query returned no row, or a NULL value.
	#[error("received empty result for gauge '{name}'")]
	EmptyResult {
		/// Gauge name.
		name: String,
	},
	/// The stats query itself failed.
	#[error("stats query `{query}` failed: {source}")]
	Target {
		/// Rendered query.
		query: String,
		/// Underlying target error.
		#[source]
		source: TargetError,
	},
}

/// Reads one gauge from `stats_memory_metrics`.
#[derive(Debug, Clone)]
pub struct MetricSampler {
	name: String,
}

impl MetricSampler {
	/// Sampler for the gauge called `name`.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}

	/// Gauge name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Reads the gauge once.
	pub fn read_gauge(&self, admin: &mut impl AdminChannel) -> Result<i64, MetricError> {
		let query = StatsQuery::MemoryMetric(self.name.clone());
		let raw = admin
			.query_first(&query)
			.map_err(|source| MetricError::Target {
				query: query.to_string(),
				source,
			})?
			.ok_or_else(|| MetricError::EmptyResult {
				name: self.name.clone(),
			})?;

		let value = raw.trim().parse::<i64>().map_err(|_| MetricError::Parse {
			name: self.name.clone(),
			raw: raw.clone(),
		})?;
		debug!(gauge = %self.name, value, "sampled gauge");
		Ok(value)
	}
}

impl Default for MetricSampler {
	fn default() -> Self {
		Self::new(RULES_MEMORY_GAUGE)
	}
}
