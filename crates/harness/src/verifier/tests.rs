use pretty_assertions::assert_eq;
use serde_json::Value;

use super::*;
use crate::report::Check;
use crate::target::{StatsQuery, TargetError};

#[derive(Default)]
struct NullAdmin {
	executed: Vec<String>,
}

impl AdminChannel for NullAdmin {
	fn execute(&mut self, command: &AdminCommand) -> std::result::Result<(), TargetError> {
		self.executed.push(command.to_string());
		Ok(())
	}

	fn query_first(&mut self, _query: &StatsQuery) -> std::result::Result<Option<String>, TargetError> {
		Ok(Some("0".into()))
	}
}

struct NullClient;

impl ClientChannel for NullClient {
	fn select_schema(&mut self, _schema: &str) -> std::result::Result<(), TargetError> {
		Ok(())
	}

	fn query(&mut self, _sql: &str) -> std::result::Result<(), TargetError> {
		Ok(())
	}

	fn internal_session(&mut self) -> std::result::Result<Value, TargetError> {
		Ok(Value::Null)
	}
}

fn spec(from: AlgorithmMode, to: AlgorithmMode) -> ScenarioSpec {
	ScenarioSpec { from, to }
}

fn clean_result() -> ScenarioResult {
	let range = IdRange::new(1000, 1004).unwrap();
	let probes = [Phase::VerifyOld, Phase::VerifyUnchanged, Phase::VerifyNew]
		.map(|phase| ProbeRun {
			phase,
			passed: 4,
			total: 4,
			aborted: false,
		})
		.to_vec();
	let evidence = [
		(Phase::VerifyOld, AlgorithmMode::PerWorker),
		(Phase::VerifyUnchanged, AlgorithmMode::PerWorker),
		(Phase::VerifyNew, AlgorithmMode::Global),
	]
	.map(|(phase, mode)| Evidence {
		phase,
		mode,
		matched: 4,
		other_matched: 0,
		cursor: LogCursor::default(),
	})
	.to_vec();

	ScenarioResult {
		spec: spec(AlgorithmMode::PerWorker, AlgorithmMode::Global),
		range,
		probes,
		evidence,
		memory: MemoryReadings {
			baseline: 100,
			loaded: 900,
			switched: 900,
			reloaded: 300,
		},
		memory_stable_on_switch: true,
		memory_trend_held: true,
	}
}

#[test]
fn phases_follow_the_fixed_sequence() {
	let mut phase = Phase::Init;
	let mut walked = vec![phase];
	while let Some(next) = phase.next() {
		walked.push(next);
		phase = next;
	}
	assert_eq!(walked, Phase::SEQUENCE.to_vec());
	assert_eq!(Phase::Done.next(), None);
	assert_eq!(Phase::VerifyUnchanged.to_string(), "VERIFY_UNCHANGED");
}

#[test]
fn memory_deltas_subtract_the_baseline() {
	let memory = clean_result().memory;
	assert_eq!(memory.loaded_delta(), 800);
	assert_eq!(memory.switched_delta(), 800);
	assert_eq!(memory.reloaded_delta(), 200);
}

#[test]
fn scenario_passes_only_when_every_signal_agrees() {
	assert!(clean_result().passed());

	let mut short_probe = clean_result();
	short_probe.probes[1].passed = 3;
	assert!(!short_probe.passed());

	let mut aborted = clean_result();
	aborted.probes[2].aborted = true;
	assert!(!aborted.passed());

	let mut stray_evidence = clean_result();
	stray_evidence.evidence[2].other_matched = 1;
	assert!(!stray_evidence.passed());

	let mut memory_moved = clean_result();
	memory_moved.memory_stable_on_switch = false;
	assert!(!memory_moved.passed());
}

#[test]
fn probe_tally_counts_and_forwards() {
	let mut checks: Vec<Check> = Vec::new();
	let mut tally = ProbeTally {
		inner: &mut checks,
		passed: 0,
		total: 0,
	};
	tally.record(true, "a".into());
	tally.record(false, "b".into());
	tally.record(true, "c".into());
	assert_eq!((tally.passed, tally.total), (2, 3));
	assert_eq!(checks.len(), 3);
}

#[test]
fn unreadable_log_aborts_the_suite_before_touching_the_target() {
	let config = HarnessConfig {
		log: crate::config::LogConfig {
			path: Some("/nonexistent/dir/proxysql.log".into()),
		},
		..Default::default()
	};
	let mut admin = NullAdmin::default();
	let mut checks: Vec<Check> = Vec::new();

	let outcome = Suite::new(&config).run(&mut admin, &mut NullClient, &mut checks);

	assert!(matches!(outcome.fatal, Some(HarnessError::LogAccess(_))));
	assert!(outcome.scenarios.is_empty());
	assert!(admin.executed.is_empty());
	assert!(!outcome.passed());
}

#[test]
fn broken_introspection_is_recorded_and_the_scenario_continues() {
	let log = tempfile::NamedTempFile::new().unwrap();
	let config = HarnessConfig {
		range: IdRange::new(1000, 1004).unwrap(),
		log: crate::config::LogConfig {
			path: Some(log.path().to_path_buf()),
		},
		settle: crate::settle::WaitStrategy::Fixed { delay_ms: 0 },
		scenarios: vec![spec(AlgorithmMode::PerWorker, AlgorithmMode::Global)],
		..Default::default()
	};
	let mut admin = NullAdmin::default();
	let mut checks: Vec<Check> = Vec::new();

	let outcome = Suite::new(&config).run(&mut admin, &mut NullClient, &mut checks);

	assert!(outcome.fatal.is_none());
	let report = &outcome.scenarios[0];
	assert_eq!(report.reached, Some(Phase::Done));
	let result = report.result.as_ref().unwrap();
	assert!(result.probes.iter().all(|p| p.aborted && p.total == 0));
	assert!(!result.passed());

	let aborted: Vec<&Check> = checks
		.iter()
		.filter(|c| c.description.starts_with("Routing probe aborted"))
		.collect();
	assert_eq!(aborted.len(), 3);
	assert!(aborted.iter().all(|c| !c.passed));
	// Static gauge: no memory movement, which satisfies only the switch check.
	assert!(result.memory_stable_on_switch);
	assert!(!result.memory_trend_held);
}

#[test]
fn scenario_issues_admin_commands_in_phase_order() {
	let log = tempfile::NamedTempFile::new().unwrap();
	let config = HarnessConfig {
		range: IdRange::new(1000, 1002).unwrap(),
		log: crate::config::LogConfig {
			path: Some(log.path().to_path_buf()),
		},
		settle: crate::settle::WaitStrategy::Fixed { delay_ms: 0 },
		..Default::default()
	};
	let stream = LogStream::new(log.path());
	let mut admin = NullAdmin::default();
	let mut client = NullClient;
	let mut checks: Vec<Check> = Vec::new();

	let mut verifier = TransitionVerifier::new(&mut admin, &mut client, &mut checks, &stream, &config);
	verifier
		.run(spec(AlgorithmMode::Global, AlgorithmMode::PerWorker))
		.unwrap();
	assert_eq!(verifier.phase(), Some(Phase::Done));

	let executed: Vec<&str> = admin.executed.iter().map(String::as_str).collect();
	assert_eq!(
		executed,
		vec![
			"SET admin-debug=1",
			"LOAD ADMIN VARIABLES TO RUNTIME",
			"UPDATE debug_levels SET verbosity=7 WHERE module='debug_mysql_query_processor'",
			"LOAD DEBUG TO RUNTIME",
			"DELETE FROM mysql_servers WHERE hostgroup_id BETWEEN 1000 AND 1001",
			"INSERT INTO mysql_servers (hostgroup_id, hostname, port) VALUES (1000,'127.0.0.1',6030),(1001,'127.0.0.1',6030)",
			"LOAD MYSQL SERVERS TO RUNTIME",
			"SET mysql-query_rules_fast_routing_algorithm=2",
			"LOAD MYSQL VARIABLES TO RUNTIME",
			"DELETE FROM mysql_query_rules_fast_routing",
			"LOAD MYSQL QUERY RULES TO RUNTIME",
			"DELETE FROM mysql_query_rules_fast_routing WHERE destination_hostgroup BETWEEN 1000 AND 1001",
			"INSERT INTO mysql_query_rules_fast_routing (username, schemaname, flagIN, destination_hostgroup, comment) \
			 VALUES ('root','randomschemaname1000',0,1000,'writer1000'),('root','randomschemaname1000',1,1001,'reader1001')",
			"LOAD MYSQL QUERY RULES TO RUNTIME",
			"SET mysql-query_rules_fast_routing_algorithm=1",
			"LOAD MYSQL VARIABLES TO RUNTIME",
			"LOAD MYSQL QUERY RULES TO RUNTIME",
		]
	);
}
