//! Fan-out composition.

use crate::task_group::TaskGroup;
use crate::transformer::{CompositionError, Sink, TransformError, Transformer};
use crate::value::{Value, ValueType};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run every member on the same input, merging their outputs.
///
/// All members must declare the same input type. Outputs from different
/// members interleave in no particular order. A single member is returned
/// as-is.
///
/// # Panics
///
/// Panics if `members` is empty or their input types differ. Use
/// [`try_in_parallel`] for members built from data.
pub fn in_parallel(members: Vec<Arc<dyn Transformer>>) -> Arc<dyn Transformer> {
    try_in_parallel(members).unwrap_or_else(|err| panic!("invalid parallel: {err}"))
}

/// Like [`in_parallel`], but reports invalid member lists instead of
/// panicking.
pub fn try_in_parallel(
    mut members: Vec<Arc<dyn Transformer>>,
) -> Result<Arc<dyn Transformer>, CompositionError> {
    match members.len() {
        0 => Err(CompositionError::Empty),
        1 => Ok(members.remove(0)),
        _ => {
            let expected = members[0].input_type();
            for (index, member) in members.iter().enumerate().skip(1) {
                let found = member.input_type();
                if found != expected {
                    return Err(CompositionError::InputTypeMismatch {
                        index,
                        expected,
                        found,
                    });
                }
            }
            Ok(Arc::new(Parallel { members }))
        }
    }
}

/// Two or more members run concurrently on one input.
struct Parallel {
    members: Vec<Arc<dyn Transformer>>,
}

#[async_trait]
impl Transformer for Parallel {
    fn input_type(&self) -> ValueType {
        self.members[0].input_type()
    }

    /// The members' shared output type, or `Any` if they disagree.
    fn output_type(&self) -> ValueType {
        let first = self.members[0].output_type();
        if self.members[1..].iter().all(|member| member.output_type() == first) {
            first
        } else {
            ValueType::Any
        }
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let mut group = TaskGroup::new(token);
        for member in &self.members {
            let member = Arc::clone(member);
            let token = group.token().clone();
            let value = value.clone();
            let sink = sink.clone();
            group.spawn(async move { member.transform(&token, value, &sink).await });
        }

        tracing::trace!(members = self.members.len(), "parallel started");
        group.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::chain;
    use crate::testing::{Declared, Failing, Replicate, Stall, arc};
    use crate::transformer::channel;
    use std::time::Duration;

    async fn run(t: &dyn Transformer, input: Value) -> (Result<(), TransformError>, Vec<Value>) {
        let token = CancellationToken::new();
        let (sink, source) = channel();
        let result = t.transform(&token, input, &sink).await;
        drop(sink);
        (result, source.drain().await)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_union() {
        let t = in_parallel(vec![arc(Replicate(1)), arc(Replicate(2)), arc(Replicate(3))]);

        let (result, outputs) = run(t.as_ref(), Value::Int(10)).await;
        result.unwrap();

        assert_eq!(outputs.len(), 6);
        assert!(outputs.iter().all(|v| *v == Value::Int(11)));
    }

    #[tokio::test]
    async fn test_parallel_inside_chain() {
        // 1 -> {2, 2} via parallel -> each replicated 3 times as 3.
        let t = chain(vec![
            in_parallel(vec![arc(Replicate(1)), arc(Replicate(1))]),
            arc(Replicate(3)),
        ]);

        let (result, outputs) = run(t.as_ref(), Value::Int(1)).await;
        result.unwrap();
        assert_eq!(outputs, vec![Value::Int(3); 6]);
    }

    #[tokio::test]
    async fn test_single_member_is_identity() {
        let member: Arc<dyn Transformer> = arc(Replicate(2));
        let t = in_parallel(vec![Arc::clone(&member)]);

        assert!(Arc::ptr_eq(&member, &t));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_member_error_halts_siblings() {
        let t = in_parallel(vec![arc(Stall), arc(Failing::after(0)), arc(Replicate(1))]);

        let (result, _) = tokio::time::timeout(Duration::from_secs(5), run(t.as_ref(), Value::Int(1)))
            .await
            .expect("stalled member should observe cancellation");

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "transform failed: boom");
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_members() {
        let t = in_parallel(vec![arc(Stall), arc(Stall)]);
        let token = CancellationToken::new();
        let (sink, _source) = channel();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            t.transform(&token, Value::Int(1), &sink),
        )
        .await
        .expect("members should observe cancellation")
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_rejects_differing_input_types() {
        let result = try_in_parallel(vec![
            arc(Declared::new(ValueType::Int, ValueType::Int)),
            arc(Declared::new(ValueType::Int, ValueType::Int)),
            arc(Declared::new(ValueType::String, ValueType::Int)),
        ]);

        assert_eq!(
            result.err(),
            Some(CompositionError::InputTypeMismatch {
                index: 2,
                expected: ValueType::Int,
                found: ValueType::String,
            })
        );
    }

    #[test]
    #[should_panic(expected = "member 1 expects string")]
    fn test_mismatch_panics() {
        in_parallel(vec![
            arc(Declared::new(ValueType::Int, ValueType::Int)),
            arc(Declared::new(ValueType::String, ValueType::Int)),
        ]);
    }

    #[test]
    #[should_panic(expected = "need at least one transformer")]
    fn test_empty_parallel_panics() {
        in_parallel(Vec::new());
    }

    #[test]
    fn test_output_type() {
        let same = in_parallel(vec![
            arc(Declared::new(ValueType::Int, ValueType::String)),
            arc(Declared::new(ValueType::Int, ValueType::String)),
        ]);
        assert_eq!(same.output_type(), ValueType::String);

        let mixed = in_parallel(vec![
            arc(Declared::new(ValueType::Int, ValueType::String)),
            arc(Declared::new(ValueType::Int, ValueType::Bool)),
        ]);
        assert_eq!(mixed.output_type(), ValueType::Any);
    }
}
