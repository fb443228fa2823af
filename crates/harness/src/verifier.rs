//! Scenario driver for one fast routing algorithm transition.
//!
//! A scenario walks a fixed phase sequence:
//!
//! `Init → Baseline → RuleLoadOld → VerifyOld → AlgoSwitch → VerifyUnchanged →
//! RuleLoadNew → VerifyNew → Done`
//!
//! Every verify phase runs the routing probe, counts search-event lines for the mode
//! whose index should have been searched, checks the other mode left no lines in the
//! same window, and samples the rule memory gauge. Only a rule reload rebuilds the
//! index, so after the algorithm switch and before the reload the evidence must still
//! name the old mode and memory must not move. After the reload the evidence names
//! the new mode and memory moves as [`MemoryTrend::for_transition`] predicts.
//!
//! Mismatches are recorded as failed checks and never stop the scenario. Errors stop
//! as much of the run as their [`ErrorScope`] says.

use std::fmt;

use tracing::{debug, info, info_span, warn};

use crate::algorithm::{ALGORITHM_VARIABLE, AlgorithmMode, MemoryTrend};
use crate::config::{HarnessConfig, ScenarioSpec};
use crate::error::{ErrorScope, HarnessError, Result};
use crate::fixture::{FixtureProvisioner, IdRange};
use crate::log_tail::{LogCursor, LogStream};
use crate::metrics::MetricSampler;
use crate::probe::RoutingProbe;
use crate::report::CheckSink;
use crate::target::{AdminChannel, AdminCommand, ClientChannel, RuntimeModule};

/// Debug module whose verbosity controls the search-event line.
pub const QUERY_PROCESSOR_DEBUG_MODULE: &str = "debug_mysql_query_processor";

/// Verbosity at which the search-event line is written.
pub const SEARCH_EVENT_VERBOSITY: u8 = 7;

/// Scenario phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	/// Search tracing enabled, backend pools provisioned and applied.
	Init,
	/// `from` algorithm applied, rules emptied, baseline memory sampled.
	Baseline,
	/// Fixture rules provisioned and loaded, log window opened.
	RuleLoadOld,
	/// Probe under the `from` index.
	VerifyOld,
	/// `to` algorithm applied without reloading rules.
	AlgoSwitch,
	/// Probe still under the `from` index.
	VerifyUnchanged,
	/// Rules reloaded, rebuilding the index under `to`.
	RuleLoadNew,
	/// Probe under the `to` index.
	VerifyNew,
	/// Scenario complete.
	Done,
}

impl Phase {
	/// Every phase in order.
	pub const SEQUENCE: [Self; 9] = [
		Self::Init,
		Self::Baseline,
		Self::RuleLoadOld,
		Self::VerifyOld,
		Self::AlgoSwitch,
		Self::VerifyUnchanged,
		Self::RuleLoadNew,
		Self::VerifyNew,
		Self::Done,
	];

	/// Phase after this one.
	pub fn next(self) -> Option<Self> {
		let at = Self::SEQUENCE.iter().position(|p| *p == self)?;
		Self::SEQUENCE.get(at + 1).copied()
	}

	/// Upper snake case name.
	pub const fn name(self) -> &'static str {
		match self {
			Self::Init => "INIT",
			Self::Baseline => "BASELINE",
			Self::RuleLoadOld => "RULE_LOAD_OLD",
			Self::VerifyOld => "VERIFY_OLD",
			Self::AlgoSwitch => "ALGO_SWITCH",
			Self::VerifyUnchanged => "VERIFY_UNCHANGED",
			Self::RuleLoadNew => "RULE_LOAD_NEW",
			Self::VerifyNew => "VERIFY_NEW",
			Self::Done => "DONE",
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Routing probe results for one verify phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRun {
	/// Phase the probe ran in.
	pub phase: Phase,
	/// Observations that routed correctly.
	pub passed: usize,
	/// Observations made before the probe finished or aborted.
	pub total: usize,
	/// True when introspection broke mid-range.
	pub aborted: bool,
}

/// Log evidence counted for one verify phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
	/// Phase the evidence was gathered in.
	pub phase: Phase,
	/// Mode whose index should have been searched.
	pub mode: AlgorithmMode,
	/// Lines naming `mode`.
	pub matched: usize,
	/// Lines naming the other mode in the same window.
	pub other_matched: usize,
	/// Cursor after the last `mode` match.
	pub cursor: LogCursor,
}

/// Gauge readings taken across a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReadings {
	/// After emptying the rules under `from`.
	pub baseline: i64,
	/// After loading fixture rules under `from`.
	pub loaded: i64,
	/// After switching the variable to `to`, before reloading.
	pub switched: i64,
	/// After reloading rules under `to`.
	pub reloaded: i64,
}

impl MemoryReadings {
	/// Retained memory attributable to the fixture rules before the switch.
	pub const fn loaded_delta(&self) -> i64 {
		self.loaded - self.baseline
	}

	/// Same, after the variable switch.
	pub const fn switched_delta(&self) -> i64 {
		self.switched - self.baseline
	}

	/// Same, after the rule reload.
	pub const fn reloaded_delta(&self) -> i64 {
		self.reloaded - self.baseline
	}
}

/// Everything one completed scenario observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
	/// Transition verified.
	pub spec: ScenarioSpec,
	/// Fixture range.
	pub range: IdRange,
	/// One entry per verify phase.
	pub probes: Vec<ProbeRun>,
	/// One entry per verify phase.
	pub evidence: Vec<Evidence>,
	/// Gauge readings.
	pub memory: MemoryReadings,
	/// Whether the variable switch left memory untouched.
	pub memory_stable_on_switch: bool,
	/// Whether the reload moved memory as expected.
	pub memory_trend_held: bool,
}

impl ScenarioResult {
	/// True when every probe, evidence count and memory check passed.
	pub fn passed(&self) -> bool {
		let width = self.range.width();
		self.probes
			.iter()
			.all(|p| !p.aborted && p.passed == width && p.total == width)
			&& self
				.evidence
				.iter()
				.all(|e| e.matched == width && e.other_matched == 0)
			&& self.memory_stable_on_switch
			&& self.memory_trend_held
	}
}

/// Runs one `(from, to)` transition against explicit target handles.
pub struct TransitionVerifier<'a, A, C> {
	admin: &'a mut A,
	client: &'a mut C,
	sink: &'a mut dyn CheckSink,
	log: &'a LogStream,
	config: &'a HarnessConfig,
	fixtures: FixtureProvisioner,
	sampler: MetricSampler,
	phase: Option<Phase>,
}

impl<'a, A: AdminChannel, C: ClientChannel> TransitionVerifier<'a, A, C> {
	/// Creates a verifier over the given handles.
	pub fn new(
		admin: &'a mut A,
		client: &'a mut C,
		sink: &'a mut dyn CheckSink,
		log: &'a LogStream,
		config: &'a HarnessConfig,
	) -> Self {
		Self {
			admin,
			client,
			sink,
			log,
			config,
			fixtures: FixtureProvisioner::new(
				config.target.principal.clone(),
				config.target.backend.clone(),
			),
			sampler: MetricSampler::new(config.memory_gauge.clone()),
			phase: None,
		}
	}

	/// Last phase entered, `None` before [`Self::run`].
	pub const fn phase(&self) -> Option<Phase> {
		self.phase
	}

	/// Runs the scenario through every phase.
	pub fn run(&mut self, spec: ScenarioSpec) -> Result<ScenarioResult> {
		let ScenarioSpec { from, to } = spec;
		let range = self.config.range;
		let _span = info_span!("scenario", %from, %to, %range).entered();
		self.phase = None;
		self.sink.diag(&format!("Testing fast routing algorithm '{from}' -> '{to}'"));

		self.enter(Phase::Init);
		self.enable_search_tracing()?;
		self.fixtures.provision_pools(self.admin, range)?;
		self.load(RuntimeModule::Servers)?;

		self.enter(Phase::Baseline);
		self.set_algorithm(from)?;
		self.apply(&AdminCommand::DeleteRoutingRules(None))?;
		self.load(RuntimeModule::QueryRules)?;
		let baseline = self.sampler.read_gauge(self.admin)?;
		info!(gauge = self.sampler.name(), baseline, "baseline rule memory");

		self.enter(Phase::RuleLoadOld);
		self.fixtures.provision_rules(self.admin, range)?;
		self.load(RuntimeModule::QueryRules)?;
		let window = self.log.open_at_end()?;

		self.enter(Phase::VerifyOld);
		let mut probes = vec![self.probe(Phase::VerifyOld)?];
		let mut evidence = vec![self.count_evidence(Phase::VerifyOld, &window, from)?];
		let loaded = self.sampler.read_gauge(self.admin)?;

		self.enter(Phase::AlgoSwitch);
		self.sink.diag(&format!("Switching algorithm to '{to}' without reloading rules"));
		self.set_algorithm(to)?;

		self.enter(Phase::VerifyUnchanged);
		let window = self.log.open_at_end()?;
		probes.push(self.probe(Phase::VerifyUnchanged)?);
		evidence.push(self.count_evidence(Phase::VerifyUnchanged, &window, from)?);
		let switched = self.sampler.read_gauge(self.admin)?;
		let memory_stable_on_switch = self.sink.record(
			loaded - baseline == switched - baseline,
			format!(
				"Memory stats shouldn't change just by the variable change - old: {}, new: {}",
				loaded - baseline,
				switched - baseline
			),
		);

		self.enter(Phase::RuleLoadNew);
		self.load(RuntimeModule::QueryRules)?;

		self.enter(Phase::VerifyNew);
		let window = self.log.open_at_end()?;
		probes.push(self.probe(Phase::VerifyNew)?);
		evidence.push(self.count_evidence(Phase::VerifyNew, &window, to)?);
		let reloaded = self.sampler.read_gauge(self.admin)?;

		let trend = MemoryTrend::for_transition(from, to);
		let memory_trend_held = self.sink.record(
			trend.holds(loaded - baseline, reloaded - baseline),
			format!(
				"Memory stats should {} after 'LOAD MYSQL QUERY RULES TO RUNTIME' - old: {}, new: {}",
				trend.describe(),
				loaded - baseline,
				reloaded - baseline
			),
		);

		self.enter(Phase::Done);
		let result = ScenarioResult {
			spec,
			range,
			probes,
			evidence,
			memory: MemoryReadings {
				baseline,
				loaded,
				switched,
				reloaded,
			},
			memory_stable_on_switch,
			memory_trend_held,
		};
		info!(passed = result.passed(), "scenario finished");
		Ok(result)
	}

	fn enter(&mut self, phase: Phase) {
		debug_assert_eq!(self.phase.map_or(Some(Phase::Init), Phase::next), Some(phase));
		debug!(%phase, "entering phase");
		self.phase = Some(phase);
	}

	fn apply(&mut self, command: &AdminCommand) -> Result<()> {
		debug!(%command, "admin");
		self.admin
			.execute(command)
			.map_err(|err| HarnessError::from_target(command.to_string(), err))
	}

	fn load(&mut self, module: RuntimeModule) -> Result<()> {
		self.apply(&AdminCommand::LoadToRuntime(module))
	}

	fn set_algorithm(&mut self, mode: AlgorithmMode) -> Result<()> {
		self.apply(&AdminCommand::set(ALGORITHM_VARIABLE, mode.variable_value()))?;
		self.load(RuntimeModule::MysqlVariables)
	}

	fn enable_search_tracing(&mut self) -> Result<()> {
		self.apply(&AdminCommand::set("admin-debug", 1))?;
		self.load(RuntimeModule::AdminVariables)?;
		self.apply(&AdminCommand::SetDebugVerbosity {
			module: QUERY_PROCESSOR_DEBUG_MODULE.into(),
			verbosity: SEARCH_EVENT_VERBOSITY,
		})?;
		self.load(RuntimeModule::Debug)
	}

	fn probe(&mut self, phase: Phase) -> Result<ProbeRun> {
		let mut observed = ProbeTally {
			inner: &mut *self.sink,
			passed: 0,
			total: 0,
		};
		match RoutingProbe::new(self.config.range).verify_range(self.client, &mut observed) {
			Ok(outcome) => Ok(ProbeRun {
				phase,
				passed: outcome.passed(),
				total: outcome.total(),
				aborted: false,
			}),
			Err(err) => {
				let (passed, total) = (observed.passed, observed.total);
				let err = HarnessError::from(err);
				if err.scope() != ErrorScope::RangeCheck {
					return Err(err);
				}
				warn!(%phase, error = %err, "routing probe aborted");
				self.sink.record(false, format!("Routing probe aborted in {phase}: {err}"));
				Ok(ProbeRun {
					phase,
					passed,
					total,
					aborted: true,
				})
			}
		}
	}

	fn count_evidence(
		&mut self,
		phase: Phase,
		window: &LogCursor,
		mode: AlgorithmMode,
	) -> Result<Evidence> {
		let expected = self.config.range.width();
		let scan = self
			.config
			.settle
			.await_matches(expected, || self.log.scan(window, mode.search_pattern()))?;
		let other = mode.other();
		let other_scan = self.log.scan(window, other.search_pattern())?;

		self.sink.record(
			scan.count() == expected,
			format!(
				"Number of '{mode}' searches in log should match issued queries - Exp: {expected}, Act: {}",
				scan.count()
			),
		);
		self.sink.record(
			other_scan.count() == 0,
			format!(
				"No '{other}' searches in log for the same window - Act: {}",
				other_scan.count()
			),
		);
		debug!(%phase, %mode, matched = scan.count(), other = other_scan.count(), "log evidence");

		Ok(Evidence {
			phase,
			mode,
			matched: scan.count(),
			other_matched: other_scan.count(),
			cursor: scan.cursor,
		})
	}
}

/// Forwards checks while counting routing outcomes, so an aborted probe still reports
/// how far it got.
struct ProbeTally<'s> {
	inner: &'s mut dyn CheckSink,
	passed: usize,
	total: usize,
}

impl CheckSink for ProbeTally<'_> {
	fn record(&mut self, passed: bool, description: String) -> bool {
		self.total += 1;
		if passed {
			self.passed += 1;
		}
		self.inner.record(passed, description)
	}

	fn diag(&mut self, message: &str) {
		self.inner.diag(message);
	}
}

/// Outcome of one scenario within a suite.
#[derive(Debug)]
pub struct ScenarioReport {
	/// Transition attempted.
	pub spec: ScenarioSpec,
	/// Last phase entered.
	pub reached: Option<Phase>,
	/// Result, or the error that aborted it.
	pub result: Result<ScenarioResult>,
}

/// Outcome of a whole suite.
#[derive(Debug, Default)]
pub struct SuiteOutcome {
	/// Scenarios that finished or were aborted on their own.
	pub scenarios: Vec<ScenarioReport>,
	/// Error that aborted the suite, if any.
	pub fatal: Option<HarnessError>,
	/// Scenario and phase interrupted by [`Self::fatal`]; `None` when setup failed.
	pub aborted_at: Option<(ScenarioSpec, Option<Phase>)>,
}

impl SuiteOutcome {
	/// True when no error occurred and every scenario passed.
	pub fn passed(&self) -> bool {
		self.fatal.is_none()
			&& self
				.scenarios
				.iter()
				.all(|s| s.result.as_ref().is_ok_and(ScenarioResult::passed))
	}
}

/// Runs every configured scenario sequentially against one pair of handles.
pub struct Suite<'a> {
	config: &'a HarnessConfig,
}

impl<'a> Suite<'a> {
	/// Suite over `config`.
	pub const fn new(config: &'a HarnessConfig) -> Self {
		Self { config }
	}

	/// Runs the suite. Suite-scoped errors stop it and land in
	/// [`SuiteOutcome::fatal`]; scenario-scoped errors end only their scenario.
	pub fn run<A: AdminChannel, C: ClientChannel>(
		&self,
		admin: &mut A,
		client: &mut C,
		sink: &mut dyn CheckSink,
	) -> SuiteOutcome {
		let _span = info_span!("suite", scenarios = self.config.scenarios.len()).entered();
		let mut outcome = SuiteOutcome::default();

		let log = match self.prepare(admin) {
			Ok(log) => log,
			Err(err) => {
				sink.diag(&format!("Suite setup failed, aborting further testing: {err}"));
				outcome.fatal = Some(err);
				return outcome;
			}
		};

		for &spec in &self.config.scenarios {
			let mut verifier =
				TransitionVerifier::new(&mut *admin, &mut *client, &mut *sink, &log, self.config);
			let result = verifier.run(spec);
			let reached = verifier.phase();

			match result {
				Err(err) if err.scope() == ErrorScope::Suite => {
					warn!(from = %spec.from, to = %spec.to, ?reached, error = %err, "suite aborted");
					sink.diag(&format!("Fatal error, aborting further testing: {err}"));
					outcome.fatal = Some(err);
					outcome.aborted_at = Some((spec, reached));
					break;
				}
				Err(err) => {
					warn!(from = %spec.from, to = %spec.to, ?reached, error = %err, "scenario aborted");
					sink.diag(&format!(
						"Scenario '{}' -> '{}' aborted: {err}",
						spec.from, spec.to
					));
					outcome.scenarios.push(ScenarioReport {
						spec,
						reached,
						result: Err(err),
					});
				}
				Ok(result) => outcome.scenarios.push(ScenarioReport {
					spec,
					reached,
					result: Ok(result),
				}),
			}
		}

		if self.config.cleanup && outcome.fatal.as_ref().is_none_or(HarnessError::target_reachable) {
			let fixtures = FixtureProvisioner::new(
				self.config.target.principal.clone(),
				self.config.target.backend.clone(),
			);
			if let Err(err) = fixtures.teardown(admin, self.config.range) {
				warn!(error = %err, "fixture cleanup failed");
				sink.diag(&format!("Fixture cleanup failed: {err}"));
			}
		}
		outcome
	}

	fn prepare<A: AdminChannel>(&self, admin: &mut A) -> Result<LogStream> {
		self.config.validate()?;
		let log = LogStream::new(self.config.resolve_log_path()?);
		log.open_at_end()?;
		info!(path = %log.path().display(), "log stream available");

		FixtureProvisioner::new(
			self.config.target.principal.clone(),
			self.config.target.backend.clone(),
		)
		.install_flag_rules(admin)?;
		Ok(log)
	}
}

#[cfg(test)]
mod tests;
