//! Self-check binary: runs the fast routing suite against the simulated proxy.
//!
//! Reads an optional TOML config from `FASTROUTE_CONFIG`, prints TAP to stdout and
//! logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use fastroute_harness::{HarnessConfig, Suite, TapReport};
use fastroute_sim::{SimOptions, SimulatedProxy};
use tracing::{error, info};

const CONFIG_ENV: &str = "FASTROUTE_CONFIG";

fn main() -> ExitCode {
	setup_tracing();

	match run() {
		Ok(true) => ExitCode::SUCCESS,
		Ok(false) => ExitCode::FAILURE,
		Err(err) => {
			error!(error = %err, "self-check failed to start");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<bool, Box<dyn std::error::Error>> {
	let mut config = match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
		Some(path) => {
			info!(path = %path.display(), "loading config");
			HarnessConfig::load(&path)?
		}
		None => HarnessConfig::default(),
	};
	if config.log.path.is_none() {
		let path = config.resolve_log_path().unwrap_or_else(|_| {
			std::env::temp_dir().join(format!("fastroute-selfcheck.{}.log", std::process::id()))
		});
		config.log.path = Some(path);
	}
	config.validate()?;

	let proxy = SimulatedProxy::new(config.resolve_log_path()?, SimOptions::default())?;
	info!(path = %proxy.log_path().display(), "simulated proxy log");
	let mut admin = proxy.admin();
	let mut client = proxy.client(config.target.principal.clone());

	let mut tap = TapReport::new(std::io::stdout().lock());
	tap.plan(config.planned_checks());
	let outcome = Suite::new(&config).run(&mut admin, &mut client, &mut tap);
	let (summary, _) = tap.finish();

	info!(
		run = summary.run,
		failed = summary.failed,
		fatal = outcome.fatal.is_some(),
		"self-check finished"
	);
	Ok(summary.passed() && outcome.passed())
}

fn setup_tracing() {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fastroute=info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}
