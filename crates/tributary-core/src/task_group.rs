//! Fail-fast task group.
//!
//! Tasks spawned into a group share one cancellation scope. The first task
//! to fail records its error and cancels the scope; everything that fails
//! afterwards is logged and discarded.

use crate::transformer::TransformError;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A set of tasks that succeed together or fail on the first error.
///
/// Dropping the group aborts every task still running.
pub struct TaskGroup {
    tasks: JoinSet<()>,
    token: CancellationToken,
    first_error: Arc<OnceLock<TransformError>>,
}

impl TaskGroup {
    /// Create a group whose scope is cancelled along with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token: parent.child_token(),
            first_error: Arc::new(OnceLock::new()),
        }
    }

    /// The scope shared by every task in this group.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks spawned and not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are left to join.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run `task` concurrently with the rest of the group.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), TransformError>> + Send + 'static,
    {
        let token = self.token.clone();
        let first_error = Arc::clone(&self.first_error);
        self.tasks.spawn(async move {
            if let Err(err) = task.await {
                record(&first_error, &token, err);
            }
        });
    }

    /// Wait for every task, returning the first error any of them hit.
    ///
    /// A panic inside a task is resumed on the caller.
    pub async fn wait(mut self) -> Result<(), TransformError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
                record(&self.first_error, &self.token, TransformError::Cancelled);
            }
        }

        match Arc::into_inner(self.first_error).and_then(OnceLock::into_inner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn record(first_error: &OnceLock<TransformError>, token: &CancellationToken, err: TransformError) {
    match first_error.set(err) {
        Ok(()) => token.cancel(),
        Err(discarded) => {
            tracing::debug!(error = %discarded, "discarding error from sibling task");
        }
    }
}
