//! The run controller: one pipeline invocation from window selection to the
//! terminal run status.

pub mod controller;
pub mod error;
pub mod outcome;

pub use controller::{Pipeline, PipelineSettings};
pub use error::{ConcurrencyError, PipelineError};
pub use outcome::{RunOutcome, RunReport};
