//! In-process stand-in for the query-routing proxy.
//!
//! [`SimulatedProxy`] keeps staged and runtime copies of variables, backend pools,
//! regular query rules and fast routing rules, and hands out [`SimAdmin`] and
//! [`SimClient`] handles implementing the harness channel traits. It reproduces only
//! the three signals the harness observes:
//!
//! - the destination of each probe query, exposed through the session document,
//! - one search-event line per fast routing lookup, appended to a log file,
//! - the rule memory gauge, which scales with the number of index copies.
//!
//! The fast routing index is rebuilt only when query rules are loaded to runtime,
//! tagged with whichever algorithm is active at that moment. [`SimFaults`] bends
//! each signal so the harness's failure paths can be exercised.

mod state;
mod faults;
mod proxy;

pub use faults::{GaugeFault, SimFaults};
pub use proxy::{SimAdmin, SimClient, SimError, SimOptions, SimulatedProxy};
