//! The transformer contract and the channels transformers write into.

use crate::value::{Value, ValueType};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Trait for implementing transformers.
///
/// A transformer maps one input value into zero or more output values,
/// written to a [`Sink`]. Transformers are shared as `Arc<dyn Transformer>`
/// and may be invoked many times, concurrently when used inside a
/// [`in_parallel`](crate::in_parallel) composite.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// The values this transformer expects.
    ///
    /// Composers check this once at construction; `transform` is never
    /// guarded by it.
    fn input_type(&self) -> ValueType;

    /// The values this transformer writes. `Any` when not declared.
    fn output_type(&self) -> ValueType {
        ValueType::Any
    }

    /// Transform one value, writing every result to `sink`.
    ///
    /// Implementations must pass `token` to every [`Sink::send`] and return
    /// [`TransformError::Cancelled`] once it fires. The sink must not be
    /// closed or retained past the call.
    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError>;
}

/// Write half of an unbounded value channel.
///
/// The channel closes once every `Sink` for it is dropped, so whoever
/// created it decides when it closes.
#[derive(Debug, Clone)]
pub struct Sink {
    tx: mpsc::UnboundedSender<Value>,
}

impl Sink {
    /// Write one value, unless `token` has fired.
    pub fn send(&self, token: &CancellationToken, value: Value) -> Result<(), TransformError> {
        if token.is_cancelled() {
            return Err(TransformError::Cancelled);
        }
        self.tx.send(value).map_err(|_| TransformError::SinkClosed)
    }
}

/// Read half of a value channel.
#[derive(Debug)]
pub struct Source {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Source {
    /// Wait for the next value.
    ///
    /// Returns `Ok(None)` once every sink is dropped and the buffer is
    /// drained, and `Err(Cancelled)` as soon as `token` fires.
    pub async fn recv(&mut self, token: &CancellationToken) -> Result<Option<Value>, TransformError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransformError::Cancelled),
            item = self.rx.recv() => Ok(item),
        }
    }

    /// Collect every remaining value until the channel closes.
    pub async fn drain(mut self) -> Vec<Value> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}

/// Create an unbounded value channel.
pub fn channel() -> (Sink, Source) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Sink { tx }, Source { rx })
}

/// Errors that can occur while transforming a value.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("transform cancelled")]
    Cancelled,

    #[error("sink closed before output could be written")]
    SinkClosed,

    #[error("invalid input: expected {expected}, got {found}")]
    InvalidInput { expected: ValueType, found: String },

    #[error("transform failed: {0}")]
    Failed(String),

    #[error("stage {index} failed: {source}")]
    Stage {
        index: usize,
        #[source]
        source: Box<TransformError>,
    },

    #[error("transform({item}) error: {source}")]
    Item {
        item: Value,
        #[source]
        source: Box<TransformError>,
    },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TransformError {
    /// Convenience constructor for domain failures.
    pub fn failed(msg: impl Into<String>) -> Self {
        TransformError::Failed(msg.into())
    }

    /// Input of the wrong shape reached a transformer.
    pub fn invalid_input(expected: ValueType, found: &Value) -> Self {
        TransformError::InvalidInput {
            expected,
            found: found.kind().to_string(),
        }
    }

    /// Whether this error is (or wraps) a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            TransformError::Cancelled => true,
            TransformError::Stage { source, .. } | TransformError::Item { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Whether this error is (or wraps) a write to a closed sink.
    pub(crate) fn is_sink_closed(&self) -> bool {
        match self {
            TransformError::SinkClosed => true,
            TransformError::Stage { source, .. } | TransformError::Item { source, .. } => {
                source.is_sink_closed()
            }
            _ => false,
        }
    }

    /// Attribute this error to a chain stage. Cancellations stay unwrapped.
    pub(crate) fn at_stage(self, index: usize) -> Self {
        if self.is_cancelled() {
            return self;
        }
        TransformError::Stage {
            index,
            source: Box::new(self),
        }
    }
}

/// Errors raised while composing transformers.
///
/// The code-level constructors ([`chain`](crate::chain),
/// [`in_parallel`](crate::in_parallel)) panic with these; the `try_`
/// variants return them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("need at least one transformer to compose")]
    Empty,

    #[error("member {index} expects {found}, but member 0 expects {expected}")]
    InputTypeMismatch {
        index: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error("stage {index} produces {produced}, but stage {} expects {expected}", .index + 1)]
    StageTypeMismatch {
        index: usize,
        produced: ValueType,
        expected: ValueType,
    },
}
