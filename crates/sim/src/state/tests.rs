use fastroute_harness::fixture::{BackendEndpoint, FixtureProvisioner, RuleRole};
use fastroute_harness::IdRange;
use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

fn state_with(faults: SimFaults) -> (ProxyState, tempfile::NamedTempFile) {
	let log = tempfile::NamedTempFile::new().unwrap();
	let file = log.reopen().unwrap();
	(ProxyState::new(SimOptions::with_faults(faults), file), log)
}

fn fixtures() -> FixtureProvisioner {
	FixtureProvisioner::new(
		"root",
		BackendEndpoint {
			host: "127.0.0.1".into(),
			port: 6030,
		},
	)
}

fn set_algorithm(state: &mut ProxyState, mode: AlgorithmMode) {
	state
		.execute(&AdminCommand::set(ALGORITHM_VARIABLE, mode.variable_value()))
		.unwrap();
	state
		.execute(&AdminCommand::LoadToRuntime(RuntimeModule::MysqlVariables))
		.unwrap();
}

fn load_rules(state: &mut ProxyState, range: IdRange) {
	let rules = fixtures().rules(range);
	state.execute(&AdminCommand::InsertRoutingRules(rules)).unwrap();
	for role in RuleRole::BOTH {
		state
			.execute(&AdminCommand::InsertFlagRule(FlagRule::for_role(role)))
			.unwrap();
	}
	state
		.execute(&AdminCommand::LoadToRuntime(RuntimeModule::QueryRules))
		.unwrap();
}

fn enable_tracing(state: &mut ProxyState) {
	for command in [
		AdminCommand::set("admin-debug", 1),
		AdminCommand::LoadToRuntime(RuntimeModule::AdminVariables),
		AdminCommand::SetDebugVerbosity {
			module: QUERY_PROCESSOR_DEBUG_MODULE.into(),
			verbosity: SEARCH_EVENT_VERBOSITY,
		},
		AdminCommand::LoadToRuntime(RuntimeModule::Debug),
	] {
		state.execute(&command).unwrap();
	}
}

#[test]
fn staged_rules_do_not_route_until_loaded() {
	let (mut state, _log) = state_with(SimFaults::default());
	let range = IdRange::new(1000, 1002).unwrap();
	state
		.execute(&AdminCommand::InsertRoutingRules(fixtures().rules(range)))
		.unwrap();
	assert_eq!(state.route("root", "randomschemaname1000", "SELECT 1").unwrap(), DEFAULT_DESTINATION);

	state
		.execute(&AdminCommand::LoadToRuntime(RuntimeModule::QueryRules))
		.unwrap();
	assert_eq!(state.route("root", "randomschemaname1000", "SELECT 1").unwrap(), 1000);
}

#[test]
fn flag_rules_select_the_reader_rule() {
	let (mut state, _log) = state_with(SimFaults::default());
	load_rules(&mut state, IdRange::new(1000, 1004).unwrap());
	assert_eq!(state.route("root", "randomschemaname1002", "SELECT 1").unwrap(), 1002);
	assert_eq!(state.route("root", "randomschemaname1002", "SELECT 2").unwrap(), 1003);
	assert_eq!(state.route("other", "randomschemaname1002", "SELECT 2").unwrap(), DEFAULT_DESTINATION);
}

#[test]
fn variable_load_alone_keeps_the_index_mode() {
	let (mut state, _log) = state_with(SimFaults::default());
	load_rules(&mut state, IdRange::new(1000, 1002).unwrap());
	assert_eq!(state.index_mode(), AlgorithmMode::PerWorker);

	set_algorithm(&mut state, AlgorithmMode::Global);
	assert_eq!(state.index_mode(), AlgorithmMode::PerWorker);

	state
		.execute(&AdminCommand::LoadToRuntime(RuntimeModule::QueryRules))
		.unwrap();
	assert_eq!(state.index_mode(), AlgorithmMode::Global);
}

#[test]
fn staged_variable_has_no_effect_on_rule_load() {
	let (mut state, _log) = state_with(SimFaults::default());
	state
		.execute(&AdminCommand::set(ALGORITHM_VARIABLE, 2))
		.unwrap();
	load_rules(&mut state, IdRange::new(1000, 1002).unwrap());
	assert_eq!(state.index_mode(), AlgorithmMode::PerWorker);
}

#[rstest]
#[case(AlgorithmMode::PerWorker, 8192 + 4 * 4 * 256)]
#[case(AlgorithmMode::Global, 8192 + 4 * 256)]
fn memory_scales_with_index_copies(#[case] mode: AlgorithmMode, #[case] expected: i64) {
	let (mut state, _log) = state_with(SimFaults::default());
	assert_eq!(state.rules_memory(), 8192);
	set_algorithm(&mut state, mode);
	load_rules(&mut state, IdRange::new(1000, 1004).unwrap());
	assert_eq!(state.rules_memory(), expected);
}

#[test]
fn search_events_need_debug_and_verbosity() {
	let (mut state, log) = state_with(SimFaults::default());
	load_rules(&mut state, IdRange::new(1000, 1002).unwrap());
	state.route("root", "randomschemaname1000", "SELECT 1").unwrap();
	assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");

	enable_tracing(&mut state);
	state.route("root", "randomschemaname1000", "SELECT 1").unwrap();
	let text = std::fs::read_to_string(log.path()).unwrap();
	let searches: Vec<&str> = text
		.lines()
		.filter(|line| AlgorithmMode::PerWorker.search_pattern().is_match(line))
		.collect();
	assert_eq!(searches.len(), 1);
	assert!(searches[0].ends_with("# user=root schema=randomschemaname1000 flagIN=0"));
	assert_eq!(text.lines().count(), 2);
}

#[test]
fn duplicate_rule_keys_are_rejected() {
	let (mut state, _log) = state_with(SimFaults::default());
	let rules = fixtures().rules(IdRange::new(1000, 1002).unwrap());
	state
		.execute(&AdminCommand::InsertRoutingRules(rules.clone()))
		.unwrap();
	let err = state
		.execute(&AdminCommand::InsertRoutingRules(rules))
		.unwrap_err();
	assert!(matches!(err, TargetError::Rejected(_)));
}

#[test]
fn connection_drops_after_the_configured_budget() {
	let (mut state, _log) = state_with(SimFaults {
		drop_connection_after: Some(2),
		..SimFaults::default()
	});
	state.execute(&AdminCommand::DeleteFlagRules).unwrap();
	state.execute(&AdminCommand::DeleteFlagRules).unwrap();
	let err = state.execute(&AdminCommand::DeleteFlagRules).unwrap_err();
	assert!(err.is_connection());
	assert!(state.route("root", "s", "SELECT 1").unwrap_err().is_connection());
}

#[rstest]
#[case(GaugeFault::None, Some("8192".to_owned()))]
#[case(GaugeFault::Missing, None)]
#[case(GaugeFault::Garbage, Some("n/a".to_owned()))]
fn gauge_faults_shape_the_stats_row(#[case] gauge: GaugeFault, #[case] expected: Option<String>) {
	let (mut state, _log) = state_with(SimFaults {
		gauge,
		..SimFaults::default()
	});
	let row = state
		.query_first(&StatsQuery::MemoryMetric(RULES_MEMORY_GAUGE.into()))
		.unwrap();
	assert_eq!(row, expected);
}
