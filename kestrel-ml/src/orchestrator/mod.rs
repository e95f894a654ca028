//! Orchestration of the analysis pipeline.
//!
//! `parse -> cost -> reliability -> security -> aggregate -> explain -> evaluate`,
//! short-circuiting from `parse` to `aggregate` when the configuration does
//! not parse, and allowing one `evaluate -> explain` retry before failing
//! closed.

pub mod aggregate;
pub mod pipeline;
pub mod state;

pub use pipeline::Orchestrator;
pub use state::{MAX_EXPLAIN_ATTEMPTS, PipelineState, Stage};
