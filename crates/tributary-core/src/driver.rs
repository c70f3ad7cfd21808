//! Drive a stream of values through a transformer.

use crate::transformer::{Sink, Source, TransformError, Transformer};
use tokio_util::sync::CancellationToken;

/// Transform every value from `input`, writing results to `output`.
///
/// Values are processed one at a time, in order. `input` is created and
/// closed by the caller; since this only returns once `input` is exhausted
/// (or something failed), the caller may close `output` afterwards.
///
/// Stops at the first failing value and returns it wrapped in
/// [`TransformError::Item`]; later values are left unread. Returns
/// [`TransformError::Cancelled`] if `token` fires while waiting for input.
pub async fn all(
    token: &CancellationToken,
    transformer: &dyn Transformer,
    input: &mut Source,
    output: &Sink,
) -> Result<(), TransformError> {
    let mut processed = 0usize;
    while let Some(item) = input.recv(token).await? {
        let shown = item.clone();
        if let Err(err) = transformer.transform(token, item, output).await {
            return Err(TransformError::Item {
                item: shown,
                source: Box::new(err),
            });
        }
        processed += 1;
        tracing::trace!(processed, "item transformed");
    }
    tracing::debug!(processed, "input exhausted");
    Ok(())
}
