//! Gray-box conformance harness for the fast routing rule lookup algorithm of a
//! query-routing proxy.
//!
//! The target keeps its fast routing rules either in one shared (global) index or in
//! one index per worker thread, selected by a runtime variable. The harness never
//! looks inside the target. It infers which index was consulted from three loosely
//! synchronized signals:
//!
//! - the destination a probe query was routed to ([`probe`]),
//! - search-event lines appended to the target's log ([`log_tail`]),
//! - the retained rule memory gauge ([`metrics`]).
//!
//! [`verifier::TransitionVerifier`] drives one `(from, to)` algorithm transition
//! through its fixed state sequence, and [`verifier::Suite`] runs the configured
//! transitions back to back, recording every check into a [`report::CheckSink`].
//!
//! All target interaction goes through the narrow [`target::AdminChannel`] and
//! [`target::ClientChannel`] traits, so the wire protocol stays outside this crate.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod fixture;
mod invariants;
pub mod log_tail;
pub mod metrics;
pub mod probe;
pub mod report;
pub mod settle;
pub mod target;
pub mod verifier;

pub use algorithm::{AlgorithmMode, MemoryTrend};
pub use config::HarnessConfig;
pub use error::{ErrorScope, HarnessError, Result};
pub use fixture::IdRange;
pub use log_tail::LogCursor;
pub use report::{CheckSink, TapReport};
pub use target::{AdminChannel, AdminCommand, ClientChannel, TargetError};
pub use verifier::{ScenarioResult, Suite, SuiteOutcome, TransitionVerifier};
