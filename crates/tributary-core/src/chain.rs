//! Serial composition.
//!
//! A chain pipes one value through every stage in order. Stages run
//! concurrently, connected by unbounded channels, so a stage that emits
//! several values keeps the stages after it busy while it works.

use crate::task_group::TaskGroup;
use crate::transformer::{CompositionError, Sink, Source, TransformError, Transformer, channel};
use crate::value::{Value, ValueType};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Compose `stages` into one transformer.
///
/// The result is `tN(...t2(t1(v)))`: input type of the first stage, output
/// type of the last. A single stage is returned as-is.
///
/// # Panics
///
/// Panics if `stages` is empty or two consecutive stages declare
/// incompatible types. Use [`try_chain`] for stages built from data.
pub fn chain(stages: Vec<Arc<dyn Transformer>>) -> Arc<dyn Transformer> {
    try_chain(stages).unwrap_or_else(|err| panic!("invalid chain: {err}"))
}

/// Like [`chain`], but reports invalid stage lists instead of panicking.
pub fn try_chain(
    mut stages: Vec<Arc<dyn Transformer>>,
) -> Result<Arc<dyn Transformer>, CompositionError> {
    match stages.len() {
        0 => Err(CompositionError::Empty),
        1 => Ok(stages.remove(0)),
        _ => {
            for (index, pair) in stages.windows(2).enumerate() {
                let produced = pair[0].output_type();
                let expected = pair[1].input_type();
                if !produced.compatible_with(&expected) {
                    return Err(CompositionError::StageTypeMismatch {
                        index,
                        produced,
                        expected,
                    });
                }
            }
            Ok(Arc::new(Chain { stages }))
        }
    }
}

/// Two or more stages run as a pipeline.
struct Chain {
    stages: Vec<Arc<dyn Transformer>>,
}

#[async_trait]
impl Transformer for Chain {
    fn input_type(&self) -> ValueType {
        self.stages[0].input_type()
    }

    fn output_type(&self) -> ValueType {
        self.stages[self.stages.len() - 1].output_type()
    }

    async fn transform(
        &self,
        token: &CancellationToken,
        value: Value,
        sink: &Sink,
    ) -> Result<(), TransformError> {
        let (last, init) = self.stages.split_at(self.stages.len() - 1);

        let mut group = TaskGroup::new(token);

        // One value enters the pipeline, then the entry closes.
        let (entry, mut input) = channel();
        entry.send(group.token(), value)?;
        drop(entry);

        for (index, stage) in init.iter().enumerate() {
            let (output, next) = channel();
            group.spawn(run_stage(
                index,
                Arc::clone(stage),
                group.token().clone(),
                input,
                Output::Internal(output),
            ));
            input = next;
        }
        // The last stage writes straight into the caller's sink.
        group.spawn(run_stage(
            init.len(),
            Arc::clone(&last[0]),
            group.token().clone(),
            input,
            Output::Caller(sink.clone()),
        ));

        tracing::trace!(stages = self.stages.len(), "chain started");
        group.wait().await
    }
}

/// Where a stage writes its results.
enum Output {
    /// A channel read by the next stage.
    Internal(Sink),
    /// The sink handed to the chain by its caller.
    Caller(Sink),
}

/// Feed every value from `input` through `stage`.
///
/// Owns `output`, so the next stage sees its input close once this stage
/// has drained its own input and returned.
async fn run_stage(
    index: usize,
    stage: Arc<dyn Transformer>,
    token: CancellationToken,
    mut input: Source,
    output: Output,
) -> Result<(), TransformError> {
    let (sink, internal) = match &output {
        Output::Internal(sink) => (sink, true),
        Output::Caller(sink) => (sink, false),
    };

    while let Some(item) = input.recv(&token).await? {
        match stage.transform(&token, item, sink).await {
            Ok(()) => {}
            // The next stage only stops reading once it has failed, and its
            // error cancels the group. Wait for that instead of racing it.
            Err(err) if internal && err.is_sink_closed() => {
                token.cancelled().await;
                return Err(TransformError::Cancelled);
            }
            Err(err) => return Err(err.at_stage(index)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::in_parallel;
    use crate::testing::{Declared, Failing, Holding, Replicate, Stall, arc};
    use std::time::Duration;

    async fn run(t: &dyn Transformer, input: Value) -> (Result<(), TransformError>, Vec<Value>) {
        let token = CancellationToken::new();
        let (sink, source) = channel();
        let result = t.transform(&token, input, &sink).await;
        drop(sink);
        (result, source.drain().await)
    }

    fn replicating_chain(len: usize) -> Arc<dyn Transformer> {
        chain((1..=len).map(|k| arc(Replicate(k))).collect())
    }

    #[tokio::test]
    async fn test_chain_fan_out() {
        // Replicate(k) emits k copies of input + 1, so a chain of
        // Replicate(1..=n) yields n! copies of input + n.
        for (len, expected_count) in [(1, 1), (2, 2), (3, 6), (5, 120)] {
            let t = replicating_chain(len);
            for input in [2i64, 4, 8] {
                let (result, outputs) = run(t.as_ref(), Value::Int(input)).await;
                result.unwrap();

                assert_eq!(outputs.len(), expected_count, "chain of {len}");
                assert!(
                    outputs.iter().all(|v| *v == Value::Int(input + len as i64)),
                    "chain of {len} on {input}: {outputs:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_chain_one_two_three() {
        let t = chain(vec![
            arc(Replicate(1)),
            arc(Replicate(2)),
            arc(Replicate(3)),
        ]);

        let (result, outputs) = run(t.as_ref(), Value::Int(5)).await;
        result.unwrap();
        assert_eq!(outputs, vec![Value::Int(8); 6]);
    }

    #[tokio::test]
    async fn test_single_stage_is_identity() {
        let stage: Arc<dyn Transformer> = arc(Replicate(2));
        let t = chain(vec![Arc::clone(&stage)]);

        assert!(Arc::ptr_eq(&stage, &t));
    }

    #[tokio::test]
    async fn test_zero_outputs_close_the_pipeline() {
        let t = chain(vec![
            arc(Replicate(2)),
            arc(Replicate(0)),
            arc(Replicate(3)),
        ]);

        let (result, outputs) = run(t.as_ref(), Value::Int(1)).await;
        result.unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stage_error_is_reported() {
        let t = chain(vec![
            arc(Replicate(3)),
            arc(Failing::after(1)),
            arc(Replicate(1)),
        ]);

        let (result, _) = tokio::time::timeout(Duration::from_secs(5), run(t.as_ref(), Value::Int(1)))
            .await
            .expect("chain should unwind after a stage fails");
        let err = result.unwrap_err();

        assert!(matches!(err, TransformError::Stage { index: 1, .. }), "{err}");
        assert!(!err.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_consumer_error_wins_over_busy_producer() {
        // Stage 0 is still writing when stage 1 fails and drops its input.
        let t = chain(vec![arc(Replicate(5_000)), arc(Failing::after(0))]);

        for attempt in 0..500 {
            let (result, _) = run(t.as_ref(), Value::Int(1)).await;
            let err = result.unwrap_err();
            assert!(
                matches!(
                    &err,
                    TransformError::Stage { index: 1, source }
                        if matches!(**source, TransformError::Failed(_))
                ),
                "attempt {attempt}: {err}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_unwinds_stalled_stage() {
        let stalls_last = chain(vec![arc(Replicate(1)), arc(Stall)]);
        let stalls_first = chain(vec![arc(Stall), arc(Replicate(1))]);

        for t in [stalls_last, stalls_first] {
            let token = CancellationToken::new();
            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                canceller.cancel();
            });

            let (sink, _source) = channel();
            let err = tokio::time::timeout(
                Duration::from_secs(5),
                t.transform(&token, Value::Int(1), &sink),
            )
            .await
            .expect("chain should unwind once cancelled")
            .unwrap_err();
            assert!(err.is_cancelled(), "{err}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_stage_cancels_stalled_stage() {
        // Stage 0 passes its value on, then waits for the token.
        let t = chain(vec![arc(Holding), arc(Failing::after(0))]);

        let (result, _) = tokio::time::timeout(Duration::from_secs(5), run(t.as_ref(), Value::Int(1)))
            .await
            .expect("stalled stage should be cancelled by its failing neighbour");
        let err = result.unwrap_err();
        assert!(matches!(err, TransformError::Stage { index: 1, .. }), "{err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_nested_parallel_failure_cancels_stall() {
        let t = chain(vec![
            arc(Replicate(1)),
            in_parallel(vec![arc(Stall), arc(Failing::after(0))]),
        ]);

        let (result, _) = tokio::time::timeout(Duration::from_secs(5), run(t.as_ref(), Value::Int(1)))
            .await
            .expect("failing member should cancel its stalled sibling");
        let err = result.unwrap_err();
        assert!(matches!(err, TransformError::Stage { index: 1, .. }), "{err}");
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let t = chain(vec![arc(Replicate(1)), arc(Replicate(1))]);
        let token = CancellationToken::new();
        token.cancel();

        let (sink, _source) = channel();
        let err = t.transform(&token, Value::Int(1), &sink).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_chain_does_not_close_callers_sink() {
        let t = chain(vec![arc(Replicate(1)), arc(Replicate(1))]);
        let token = CancellationToken::new();
        let (sink, mut source) = channel();

        t.transform(&token, Value::Int(1), &sink).await.unwrap();
        t.transform(&token, Value::Int(10), &sink).await.unwrap();
        sink.send(&token, Value::Null).unwrap();
        drop(sink);

        assert_eq!(source.recv(&token).await.unwrap(), Some(Value::Int(3)));
        assert_eq!(source.recv(&token).await.unwrap(), Some(Value::Int(12)));
        assert_eq!(source.recv(&token).await.unwrap(), Some(Value::Null));
        assert_eq!(source.recv(&token).await.unwrap(), None);
    }

    #[test]
    fn test_types_follow_first_and_last_stage() {
        let t = chain(vec![
            arc(Declared::new(ValueType::String, ValueType::Int)),
            arc(Declared::new(ValueType::Any, ValueType::Bool)),
        ]);

        assert_eq!(t.input_type(), ValueType::String);
        assert_eq!(t.output_type(), ValueType::Bool);
    }

    #[test]
    fn test_try_chain_rejects_mismatched_stages() {
        let result = try_chain(vec![
            arc(Declared::new(ValueType::Int, ValueType::String)),
            arc(Declared::new(ValueType::Int, ValueType::Int)),
        ]);

        assert_eq!(
            result.err(),
            Some(CompositionError::StageTypeMismatch {
                index: 0,
                produced: ValueType::String,
                expected: ValueType::Int,
            })
        );
    }

    #[test]
    fn test_try_chain_rejects_empty() {
        assert_eq!(try_chain(Vec::new()).err(), Some(CompositionError::Empty));
    }

    #[test]
    #[should_panic(expected = "need at least one transformer")]
    fn test_empty_chain_panics() {
        chain(Vec::new());
    }
}
