//! Small transformers shared by the unit tests.

use crate::transformer::{Sink, TransformError, Transformer};
use crate::value::{Value, ValueType};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

pub fn arc(t: impl Transformer + 'static) -> Arc<dyn Transformer> {
    Arc::new(t)
}

/// Emits `k` copies of its integer input plus one.
pub struct Replicate(pub usize);

#[async_trait]
impl Transformer for Replicate {
    fn input_type(&self) -> ValueType {
        ValueType::Int
    }

    fn output_type(&self) -> ValueType {
        ValueType::Int
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let n = value
            .as_i64()
            .ok_or_else(|| TransformError::invalid_input(ValueType::Int, &value))?;
        for _ in 0..self.0 {
            sink.send(token, Value::Int(n + 1))?;
        }
        Ok(())
    }
}

/// Passes the first `ok` values through, then fails on every call.
pub struct Failing {
    ok: usize,
    pub calls: AtomicUsize,
}

impl Failing {
    pub fn after(ok: usize) -> Self {
        Self {
            ok,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transformer for Failing {
    fn input_type(&self) -> ValueType {
        ValueType::Int
    }

    fn output_type(&self) -> ValueType {
        ValueType::Int
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok {
            return sink.send(token, value);
        }
        Err(TransformError::failed("boom"))
    }
}

/// Echoes its input; declares whatever types it is given.
pub struct Declared {
    input: ValueType,
    output: ValueType,
}

impl Declared {
    pub fn new(input: ValueType, output: ValueType) -> Self {
        Self { input, output }
    }
}

#[async_trait]
impl Transformer for Declared {
    fn input_type(&self) -> ValueType {
        self.input.clone()
    }

    fn output_type(&self) -> ValueType {
        self.output.clone()
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        sink.send(token, value)
    }
}

/// Never finishes on its own; returns once the token fires.
pub struct Stall;

#[async_trait]
impl Transformer for Stall {
    fn input_type(&self) -> ValueType {
        ValueType::Int
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        _value: Value,
        _sink: &Sink,
    ) -> Result<(), TransformError> {
        token.cancelled().await;
        Err(TransformError::Cancelled)
    }
}

/// Passes its input on, then returns only once the token fires.
pub struct Holding;

#[async_trait]
impl Transformer for Holding {
    fn input_type(&self) -> ValueType {
        ValueType::Int
    }

    fn output_type(&self) -> ValueType {
        ValueType::Int
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        sink.send(token, value)?;
        token.cancelled().await;
        Err(TransformError::Cancelled)
    }
}
