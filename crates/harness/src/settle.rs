//! Waiting for asynchronous log writes before counting evidence.
//!
//! The target writes search events to its log after replying to the query, so a
//! scan issued straight after the probe can miss lines. [`WaitStrategy::Fixed`]
//! sleeps once and scans. [`WaitStrategy::Backoff`] rescans from the same window
//! start with a doubling delay until the expected count is reached or attempts run
//! out. Either way the caller gets one final [`Scan`].

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::log_tail::{LogError, Scan};

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How long to let the log catch up before a scan is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum WaitStrategy {
	/// Sleep once, then scan once.
	Fixed {
		/// Delay in milliseconds.
		delay_ms: u64,
	},
	/// Sleep and rescan, doubling the delay, until the count is reached.
	Backoff {
		/// First delay in milliseconds.
		initial_ms: u64,
		/// Upper bound on scans.
		max_attempts: u32,
	},
}

impl Default for WaitStrategy {
	fn default() -> Self {
		Self::Fixed { delay_ms: 100 }
	}
}

impl WaitStrategy {
	/// Waits, then runs `scan` until it yields at least `expected` matches or the
	/// strategy gives up. Returns the last scan.
	pub fn await_matches<F>(&self, expected: usize, mut scan: F) -> Result<Scan, LogError>
	where
		F: FnMut() -> Result<Scan, LogError>,
	{
		match *self {
			Self::Fixed { delay_ms } => {
				thread::sleep(Duration::from_millis(delay_ms));
				scan()
			}
			Self::Backoff {
				initial_ms,
				max_attempts,
			} => {
				let mut delay = Duration::from_millis(initial_ms);
				let mut attempt = 1;
				loop {
					thread::sleep(delay);
					let result = scan()?;
					if result.count() >= expected || attempt >= max_attempts {
						trace!(attempt, matches = result.count(), expected, "settled");
						return Ok(result);
					}
					attempt += 1;
					delay = (delay * 2).min(MAX_BACKOFF);
				}
			}
		}
	}
}
