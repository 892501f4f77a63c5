use crate::config::StageExecution;
use crate::context::RequestContext;
use crate::errors::{GatewayError, Result};
use std::future::Future;
use tokio::task::JoinSet;

/// Drives one pipeline stage on behalf of the entries handler.
///
/// In `Spawned` mode the stage runs on its own task and its `Result` comes
/// back through the join handle, so a stage yields exactly one of value or
/// error. The join set is dropped when the context gives up, which aborts
/// the task.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageExecutor {
    mode: StageExecution,
}

impl StageExecutor {
    pub fn new(mode: StageExecution) -> Self {
        Self { mode }
    }

    pub async fn run<F, T>(&self, ctx: &RequestContext, stage: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.mode {
            StageExecution::Inline => ctx.run(stage).await,
            StageExecution::Spawned => {
                let mut join_set = JoinSet::new();
                join_set.spawn(stage);

                ctx.run(async {
                    match join_set.join_next().await {
                        Some(Ok(result)) => result,
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Stage task failed");
                            Err(GatewayError::Internal(format!("stage task failed: {e}")))
                        }
                        None => Err(GatewayError::Internal("stage task missing".into())),
                    }
                })
                .await
            }
        }
    }
}
