//! Experiment-level logs: the flow log and per-plane gaze statistics.
//!
//! These are data products of a run, separate from the `tracing`
//! diagnostics.

pub mod flow;
pub mod statistics;

pub use flow::{FlowLog, FlowRecord, FlowSource};
pub use statistics::Statistics;
