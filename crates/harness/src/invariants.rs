//! Invariant catalog for the transition verifier and its components.
#![allow(dead_code)]

/// Each probe run over a range of width `W` must issue exactly `W` routing checks.
///
/// - Enforced in: [`crate::probe::RoutingProbe::verify_range`]
/// - Tested by: `probe::tests::every_id_is_observed_once`, `probe::tests::every_even_width_range_passes_once_per_id`
/// - Failure symptom: Plan mismatch in the TAP output and undercounted evidence.
pub(crate) const PROBE_OBSERVES_EVERY_ID_ONCE: () = ();

/// An unknown destination must abort the range check, not count as a mismatch.
///
/// - Enforced in: [`crate::probe::RoutingProbe::verify_range`], `TransitionVerifier::probe`
/// - Tested by: `probe::tests::unknown_destination_aborts_the_range`, `verifier::tests::broken_introspection_is_recorded_and_the_scenario_continues`
/// - Failure symptom: A dead introspection channel reported as twenty routing bugs.
pub(crate) const UNKNOWN_DESTINATION_ABORTS_RANGE_CHECK: () = ();

/// A scan must leave the cursor after its last match, or unchanged when nothing matched.
///
/// - Enforced in: [`crate::log_tail::scan_reader`]
/// - Tested by: `log_tail::tests::cursor_advances_to_last_match_not_end_of_stream`, `log_tail::tests::consecutive_scans_count_each_match_once`
/// - Failure symptom: Evidence counted twice, or lines between patterns silently dropped.
pub(crate) const SCAN_CURSOR_STOPS_AT_LAST_MATCH: () = ();

/// Partial trailing lines must not be consumed.
///
/// - Enforced in: [`crate::log_tail::scan_reader`]
/// - Tested by: `log_tail::tests::partial_trailing_line_waits_for_its_terminator`
/// - Failure symptom: A search event split across two writes is never counted.
pub(crate) const SCAN_IGNORES_UNTERMINATED_LINES: () = ();

/// Evidence before the rule reload must name the `from` mode, even after the switch.
///
/// - Enforced in: `TransitionVerifier::run` (`VerifyUnchanged` phase)
/// - Tested by: `scenarios::variable_switch_without_reload_keeps_old_index`
/// - Failure symptom: A target that rebuilds its index on a variable change passes.
pub(crate) const VARIABLE_CHANGE_ALONE_KEEPS_OLD_INDEX: () = ();

/// Fixture provisioning must delete the range before inserting and never load to runtime.
///
/// - Enforced in: [`crate::fixture::FixtureProvisioner::provision_rules`], [`crate::fixture::FixtureProvisioner::provision_pools`]
/// - Tested by: `fixture::tests::provisioning_deletes_before_inserting`
/// - Failure symptom: Duplicate-key failures on rerun, or rules active before the baseline sample.
pub(crate) const PROVISIONING_IS_IDEMPOTENT_AND_STAGED: () = ();

/// Assertion mismatches must never abort a scenario.
///
/// - Enforced in: [`crate::report::CheckSink::record`], `TransitionVerifier::run`
/// - Tested by: `scenarios::misrouted_destination_fails_checks_but_completes`
/// - Failure symptom: One wrong destination hides every later diagnostic.
pub(crate) const MISMATCHES_ARE_RECORDED_NOT_FATAL: () = ();

/// Connection, log access and fixture provisioning failures must stop the whole suite.
///
/// - Enforced in: [`crate::error::HarnessError::scope`], [`crate::verifier::Suite::run`]
/// - Tested by: `verifier::tests::unreadable_log_aborts_the_suite_before_touching_the_target`, `scenarios::dropped_connection_aborts_remaining_scenarios`, `scenarios::rejected_rule_inserts_abort_the_suite_and_still_clean_up`
/// - Failure symptom: Later scenarios report noise against a target that is gone.
pub(crate) const SUITE_STOPS_ON_LOST_TARGET_OR_LOG: () = ();
