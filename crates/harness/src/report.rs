//! Check recording and TAP output.

use std::io::Write;

use tracing::{info, warn};

/// One recorded assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
	/// Whether the assertion held.
	pub passed: bool,
	/// Human-readable description with expected and actual values.
	pub description: String,
}

/// Destination for assertion outcomes and diagnostics.
///
/// Recording never aborts anything; failed checks are only counted.
pub trait CheckSink {
	/// Records one assertion and returns `passed`.
	fn record(&mut self, passed: bool, description: String) -> bool;

	/// Emits a free-form diagnostic.
	fn diag(&mut self, message: &str);
}

impl CheckSink for Vec<Check> {
	fn record(&mut self, passed: bool, description: String) -> bool {
		self.push(Check {
			passed,
			description,
		});
		passed
	}

	fn diag(&mut self, _message: &str) {}
}

/// Totals after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSummary {
	/// Declared plan, if any.
	pub planned: Option<usize>,
	/// Checks recorded.
	pub run: usize,
	/// Checks that failed.
	pub failed: usize,
}

impl TapSummary {
	/// True when every check passed and the plan, if declared, was met.
	pub fn passed(&self) -> bool {
		self.failed == 0 && self.planned.is_none_or(|planned| planned == self.run)
	}
}

/// Writes Test Anything Protocol output as checks are recorded.
#[derive(Debug)]
pub struct TapReport<W: Write> {
	out: W,
	planned: Option<usize>,
	checks: Vec<Check>,
}

impl<W: Write> TapReport<W> {
	/// Creates a report writing to `out`.
	pub fn new(out: W) -> Self {
		Self {
			out,
			planned: None,
			checks: Vec::new(),
		}
	}

	/// Declares how many checks the run will record.
	pub fn plan(&mut self, count: usize) {
		self.planned = Some(count);
		self.emit(format_args!("1..{count}"));
	}

	/// Checks recorded so far.
	pub fn checks(&self) -> &[Check] {
		&self.checks
	}

	/// Current totals.
	pub fn summary(&self) -> TapSummary {
		TapSummary {
			planned: self.planned,
			run: self.checks.len(),
			failed: self.checks.iter().filter(|c| !c.passed).count(),
		}
	}

	/// Writes the closing plan diagnostics and returns the totals and the writer.
	pub fn finish(mut self) -> (TapSummary, W) {
		let summary = self.summary();
		if let Some(planned) = summary.planned
			&& planned != summary.run
		{
			self.emit(format_args!(
				"# Looks like you planned {planned} tests but ran {}.",
				summary.run
			));
		}
		if summary.failed > 0 {
			self.emit(format_args!(
				"# Looks like you failed {} test of {}.",
				summary.failed, summary.run
			));
		}
		info!(run = summary.run, failed = summary.failed, planned = ?summary.planned, "report finished");
		(summary, self.out)
	}

	fn emit(&mut self, line: std::fmt::Arguments<'_>) {
		if let Err(error) = writeln!(self.out, "{line}") {
			warn!(%error, "failed to write TAP output");
		}
	}
}

impl<W: Write> CheckSink for TapReport<W> {
	fn record(&mut self, passed: bool, description: String) -> bool {
		let number = self.checks.len() + 1;
		let status = if passed { "ok" } else { "not ok" };
		self.emit(format_args!("{status} {number} - {description}"));
		if !passed {
			warn!(number, %description, "check failed");
		}
		self.checks.push(Check {
			passed,
			description,
		});
		passed
	}

	fn diag(&mut self, message: &str) {
		for line in message.lines() {
			self.emit(format_args!("# {line}"));
		}
	}
}
