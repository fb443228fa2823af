/// How the memory gauge misbehaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GaugeFault {
	/// Reports the modeled value.
	#[default]
	None,
	/// The stats row is missing.
	Missing,
	/// The stats row holds a non-numeric value.
	Garbage,
}

/// Deliberate deviations from correct target behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimFaults {
	/// Route queries for this destination 100 pools further along.
	pub misroute: Option<u32>,
	/// Drop `qpo` from the session document.
	pub broken_introspection: bool,
	/// Memory gauge behavior.
	pub gauge: GaugeFault,
	/// Refuse fast routing rule inserts.
	pub reject_rule_inserts: bool,
	/// Lose the connection after this many admin commands.
	pub drop_connection_after: Option<usize>,
	/// Never write search-event lines.
	pub suppress_search_log: bool,
	/// Keep a single index copy whatever the algorithm.
	pub memory_ignores_algorithm: bool,
	/// Rebuild the index when proxy variables are loaded, not only on rule loads.
	pub rebuild_on_variable_load: bool,
}
