//! Fast routing lookup algorithms and the memory behavior expected between them.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Target variable selecting the fast routing lookup algorithm.
pub const ALGORITHM_VARIABLE: &str = "mysql-query_rules_fast_routing_algorithm";

static PER_WORKER_SEARCH: LazyLock<Regex> =
	LazyLock::new(|| literal_pattern(&AlgorithmMode::PerWorker.search_event()));
static GLOBAL_SEARCH: LazyLock<Regex> =
	LazyLock::new(|| literal_pattern(&AlgorithmMode::Global.search_event()));

fn literal_pattern(text: &str) -> Regex {
	Regex::new(&regex::escape(text)).expect("escaped literal is a valid pattern")
}

/// Which index the target searches for fast routing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmMode {
	/// One index copy per worker thread.
	PerWorker,
	/// A single index shared by all workers.
	Global,
}

impl AlgorithmMode {
	/// Both modes, in variable-value order.
	pub const ALL: [Self; 2] = [Self::PerWorker, Self::Global];

	/// Value stored in [`ALGORITHM_VARIABLE`].
	pub const fn variable_value(self) -> u8 {
		match self {
			Self::PerWorker => 1,
			Self::Global => 2,
		}
	}

	/// Parses a value of [`ALGORITHM_VARIABLE`].
	pub fn from_variable_value(value: &str) -> Option<Self> {
		match value.trim() {
			"1" => Some(Self::PerWorker),
			"2" => Some(Self::Global),
			_ => None,
		}
	}

	/// Index name used in the target's search-event log line.
	pub const fn index_label(self) -> &'static str {
		match self {
			Self::PerWorker => "per-worker",
			Self::Global => "global",
		}
	}

	/// The other mode.
	pub const fn other(self) -> Self {
		match self {
			Self::PerWorker => Self::Global,
			Self::Global => Self::PerWorker,
		}
	}

	/// Search-event log text for this mode.
	pub fn search_event(self) -> String {
		format!("Searching {} 'rules_fast_routing' hashmap", self.index_label())
	}

	/// Line pattern matching this mode's search events and nothing else.
	pub fn search_pattern(self) -> &'static Regex {
		match self {
			Self::PerWorker => &PER_WORKER_SEARCH,
			Self::Global => &GLOBAL_SEARCH,
		}
	}
}

impl fmt::Display for AlgorithmMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.index_label())
	}
}

/// Expected movement of retained rule memory after a rule reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTrend {
	/// Post-reload delta strictly below the pre-reload delta.
	Decrease,
	/// Post-reload delta strictly above the pre-reload delta.
	Increase,
	/// Both deltas equal.
	Unchanged,
}

impl MemoryTrend {
	/// Expected trend when rules are rebuilt after switching `from` → `to`.
	pub const fn for_transition(from: AlgorithmMode, to: AlgorithmMode) -> Self {
		match (from, to) {
			(AlgorithmMode::PerWorker, AlgorithmMode::Global) => Self::Decrease,
			(AlgorithmMode::Global, AlgorithmMode::PerWorker) => Self::Increase,
			_ => Self::Unchanged,
		}
	}

	/// Whether moving from `before` to `after` follows this trend.
	pub fn holds(self, before: i64, after: i64) -> bool {
		matches!(
			(self, after.cmp(&before)),
			(Self::Decrease, Ordering::Less)
				| (Self::Increase, Ordering::Greater)
				| (Self::Unchanged, Ordering::Equal)
		)
	}

	/// Verb used in check descriptions.
	pub const fn describe(self) -> &'static str {
		match self {
			Self::Decrease => "decrease",
			Self::Increase => "increase",
			Self::Unchanged => "not change",
		}
	}
}
