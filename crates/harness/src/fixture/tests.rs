use pretty_assertions::assert_eq;

use super::*;
use crate::target::StatsQuery;

#[derive(Default)]
struct RecordingAdmin {
	executed: Vec<String>,
	reject_after: Option<usize>,
}

impl AdminChannel for RecordingAdmin {
	fn execute(&mut self, command: &AdminCommand) -> Result<(), TargetError> {
		if self.reject_after.is_some_and(|limit| self.executed.len() >= limit) {
			return Err(TargetError::Rejected("disk full".into()));
		}
		self.executed.push(command.to_string());
		Ok(())
	}

	fn query_first(&mut self, _query: &StatsQuery) -> Result<Option<String>, TargetError> {
		Ok(None)
	}
}

fn provisioner() -> FixtureProvisioner {
	FixtureProvisioner::new(
		"sbtest1",
		BackendEndpoint {
			host: "127.0.0.1".into(),
			port: 6030,
		},
	)
}

#[test]
fn range_rejects_empty_and_odd_widths() {
	assert!(IdRange::new(1000, 1000).is_err());
	assert!(IdRange::new(1020, 1000).is_err());
	assert!(IdRange::new(1000, 1003).is_err());

	let range = IdRange::new(1000, 1020).unwrap();
	assert_eq!(range.width(), 20);
	assert_eq!(range.last(), 1019);
	assert!(range.contains(1000));
	assert!(!range.contains(1020));
	assert_eq!(range.pair_starts().count(), 10);
}

#[test]
fn range_deserialization_validates() {
	let ok: IdRange = toml::from_str("start = 10\nend = 14").unwrap();
	assert_eq!(ok, IdRange::new(10, 14).unwrap());
	assert!(toml::from_str::<IdRange>("start = 10\nend = 13").is_err());
}

#[test]
fn rules_are_two_per_pair_with_derivable_content() {
	let range = IdRange::new(1000, 1004).unwrap();
	let rules = provisioner().rules(range);

	assert_eq!(rules.len(), range.width());
	assert_eq!(
		rules[0],
		RoutingRule {
			key: RuleKey {
				principal: "sbtest1".into(),
				schema: "randomschemaname1000".into(),
				flag: 0,
			},
			destination: 1000,
			comment: "writer1000".into(),
		}
	);
	assert_eq!(rules[1].key.schema, "randomschemaname1000");
	assert_eq!(rules[1].key.flag, 1);
	assert_eq!(rules[1].destination, 1001);
	assert_eq!(rules[1].comment, "reader1001");
	assert_eq!(rules[2].key.schema, "randomschemaname1002");
}

#[test]
fn pools_share_one_endpoint() {
	let range = IdRange::new(2000, 2004).unwrap();
	let pools = provisioner().pools(range);
	let ids: Vec<u32> = pools.iter().map(|p| p.pool_id).collect();
	assert_eq!(ids, vec![2000, 2001, 2002, 2003]);
	assert!(pools.iter().all(|p| p.host == "127.0.0.1" && p.port == 6030));
}

#[test]
fn provisioning_deletes_before_inserting() {
	let range = IdRange::new(1000, 1004).unwrap();
	let mut admin = RecordingAdmin::default();

	assert_eq!(provisioner().provision_rules(&mut admin, range).unwrap(), 4);
	assert_eq!(
		admin.executed,
		vec![
			"DELETE FROM mysql_query_rules_fast_routing WHERE destination_hostgroup BETWEEN 1000 AND 1003"
				.to_string(),
			"INSERT INTO mysql_query_rules_fast_routing (username, schemaname, flagIN, destination_hostgroup, comment) \
			 VALUES ('sbtest1','randomschemaname1000',0,1000,'writer1000'),('sbtest1','randomschemaname1000',1,1001,'reader1001')"
				.to_string(),
			"INSERT INTO mysql_query_rules_fast_routing (username, schemaname, flagIN, destination_hostgroup, comment) \
			 VALUES ('sbtest1','randomschemaname1002',0,1002,'writer1002'),('sbtest1','randomschemaname1002',1,1003,'reader1003')"
				.to_string(),
		]
	);
}

#[test]
fn pool_provisioning_writes_one_statement_per_pair() {
	let range = IdRange::new(1000, 1004).unwrap();
	let mut admin = RecordingAdmin::default();

	assert_eq!(provisioner().provision_pools(&mut admin, range).unwrap(), 4);
	assert_eq!(admin.executed.len(), 3);
	assert_eq!(
		admin.executed[1],
		"INSERT INTO mysql_servers (hostgroup_id, hostname, port) VALUES (1000,'127.0.0.1',6030),(1001,'127.0.0.1',6030)"
	);
}

#[test]
fn failed_write_surfaces_and_leaves_partial_state() {
	let range = IdRange::new(1000, 1006).unwrap();
	let mut admin = RecordingAdmin {
		reject_after: Some(2),
		..Default::default()
	};

	let err = provisioner().provision_rules(&mut admin, range).unwrap_err();
	assert!(matches!(err, ProvisionError::Target { what: "routing rules", .. }));
	assert_eq!(admin.executed.len(), 2);
}

#[test]
fn flag_rules_map_probe_shapes_to_flags() {
	let mut admin = RecordingAdmin::default();
	provisioner().install_flag_rules(&mut admin).unwrap();
	assert_eq!(
		admin.executed,
		vec![
			"DELETE FROM mysql_query_rules",
			"INSERT INTO mysql_query_rules (rule_id, active, match_pattern, flagOUT, cache_ttl) VALUES (1,1,'^SELECT 1$',0,600000)",
			"INSERT INTO mysql_query_rules (rule_id, active, match_pattern, flagOUT, cache_ttl) VALUES (2,1,'^SELECT 2$',1,600000)",
			"DELETE FROM mysql_query_rules_fast_routing",
			"LOAD MYSQL QUERY RULES TO RUNTIME",
		]
	);
}
