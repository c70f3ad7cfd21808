//! Tributary: composable streaming transformers
//!
//! A transformer maps one value into zero or more values written to a sink.
//! Transformers compose serially with [`chain`] and fan out with
//! [`in_parallel`]; both run their parts as concurrent tasks sharing one
//! cancellation scope, and fail fast on the first error.
//!
//! Composites spawn tokio tasks, so they must be driven from within a
//! tokio runtime.

mod chain;
mod driver;
mod handler;
mod parallel;
mod registry;
mod task_group;
#[cfg(test)]
mod testing;
mod transformer;
mod value;
mod workflow;

pub use chain::{chain, try_chain};
pub use driver::all;
pub use handler::{log_errors, with_error_handler};
pub use parallel::{in_parallel, try_in_parallel};
pub use registry::{Entry, Registry};
pub use task_group::TaskGroup;
pub use transformer::{CompositionError, Sink, Source, TransformError, Transformer, channel};
pub use value::{FieldDecl, RecordType, Typed, Value, ValueType};
pub use workflow::{Node, Workflow, WorkflowError, detect_format};

pub use tokio_util::sync::CancellationToken;
