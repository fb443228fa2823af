use rstest::rstest;

use super::*;
use crate::fixture::IdRange;

fn rejected() -> TargetError {
	TargetError::Rejected("no such table".into())
}

fn dropped() -> TargetError {
	TargetError::Connection("server has gone away".into())
}

#[test]
fn connection_loss_is_classified_as_connection_error() {
	let err = HarnessError::from_target("LOAD MYSQL QUERY RULES TO RUNTIME", dropped());
	assert!(matches!(err, HarnessError::Connection { .. }));
	assert_eq!(err.scope(), ErrorScope::Suite);
	assert!(!err.target_reachable());
}

#[test]
fn rejected_command_aborts_only_the_scenario() {
	let err = HarnessError::from_target("SET admin-debug=1", rejected());
	assert!(matches!(err, HarnessError::Command { .. }));
	assert_eq!(err.scope(), ErrorScope::Scenario);
}

#[rstest]
#[case(MetricError::EmptyResult { name: "g".into() }, ErrorScope::Scenario)]
#[case(MetricError::Parse { name: "g".into(), raw: "x".into() }, ErrorScope::Scenario)]
#[case(MetricError::Target { query: "q".into(), source: dropped() }, ErrorScope::Suite)]
fn metric_errors_keep_their_taxonomy(#[case] err: MetricError, #[case] scope: ErrorScope) {
	assert_eq!(HarnessError::from(err).scope(), scope);
}

#[test]
fn introspection_failure_aborts_only_the_range_check() {
	let err = HarnessError::from(ProbeError::IntrospectionUnavailable {
		schema: "randomschemaname1000".into(),
	});
	assert_eq!(err.scope(), ErrorScope::RangeCheck);
}

#[rstest]
#[case(ProvisionError::Target { range: IdRange::new(1000, 1002).unwrap(), what: "routing rules", source: rejected() }, true)]
#[case(ProvisionError::Target { range: IdRange::new(1000, 1002).unwrap(), what: "backend pools", source: dropped() }, false)]
#[case(ProvisionError::FlagRules(rejected()), true)]
#[case(ProvisionError::FlagRules(dropped()), false)]
fn provisioning_failure_aborts_the_suite(#[case] err: ProvisionError, #[case] reachable: bool) {
	let err = HarnessError::from(err);
	assert_eq!(err.scope(), ErrorScope::Suite);
	assert_eq!(err.target_reachable(), reachable);
}

#[test]
fn log_access_is_fatal_to_the_suite() {
	let err = HarnessError::from(LogError::Open {
		path: "/nonexistent/proxysql.log".into(),
		source: std::io::Error::from(std::io::ErrorKind::NotFound),
	});
	assert_eq!(err.scope(), ErrorScope::Suite);
}
