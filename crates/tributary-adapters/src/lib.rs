//! Adapters that build transformers out of plain callables and record types.
//!
//! Re-exports the core transformer contract so adapter users need only this
//! crate.

mod error;
mod function;
mod record;

pub use error::ConfigError;
pub use function::{CallFuture, Callable, FnTransformer, Param, Ret, Signature};
pub use record::{RecordCollapser, RecordExpander};

pub use rhi_tributary_core::{
    CancellationToken, FieldDecl, RecordType, Sink, TransformError, Transformer, Typed, Value,
    ValueType,
};
