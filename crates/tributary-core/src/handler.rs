//! Error interception.

use crate::transformer::{Sink, TransformError, Transformer};
use crate::value::{Value, ValueType};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Wrap `inner` so that its errors pass through `handler`.
///
/// The handler is called once per failing call with the exact error:
/// returning `None` swallows it and the call succeeds, while `Some(e)` (the
/// same error or another one) fails the call with `e`.
pub fn with_error_handler<F>(inner: Arc<dyn Transformer>, handler: F) -> Arc<dyn Transformer>
where
    F: Fn(TransformError) -> Option<TransformError> + Send + Sync + 'static,
{
    Arc::new(ErrorHandling { inner, handler })
}

/// Wrap `inner` so that its errors are logged and never propagated.
pub fn log_errors(inner: Arc<dyn Transformer>) -> Arc<dyn Transformer> {
    with_error_handler(inner, |err| {
        tracing::warn!(error = %err, "transform error suppressed");
        None
    })
}

struct ErrorHandling<F> {
    inner: Arc<dyn Transformer>,
    handler: F,
}

#[async_trait]
impl<F> Transformer for ErrorHandling<F>
where
    F: Fn(TransformError) -> Option<TransformError> + Send + Sync + 'static,
{
    fn input_type(&self) -> ValueType {
        self.inner.input_type()
    }

    fn output_type(&self) -> ValueType {
        self.inner.output_type()
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        match self.inner.transform(token, value, sink).await {
            Ok(()) => Ok(()),
            Err(err) => match (self.handler)(err) {
                Some(err) => Err(err),
                None => Ok(()),
            },
        }
    }
}
