//! Shared utilities for the xrefsync workspace.
//!
//! Provides the logging bootstrap used by every binary and test harness, and
//! the phase-scoped warning aggregator used by the loader to report data
//! problems without flooding the log.

pub mod logging;
pub mod warnings;

pub use warnings::WarningLog;
