//! The request executor.
//!
//! An execution walks `Pending -> PreScript -> Resolving -> InFlight ->
//! PostScript -> Done`, or stops in `Failed` at the stage that went wrong.
//! Every step is recorded in an [`ExecutionReport`].

mod client;
mod prepared;
mod report;
mod state;

pub use client::{RequestExecutor, RequestExecutorBuilder};
pub use prepared::{prepare, PreparedRequest};
pub use report::ExecutionReport;
pub use state::{ExecutionState, Stage};
