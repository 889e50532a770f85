use super::{DispatchLayer, DispatchRequest, Next};
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{ActivityError, ExecutionEvent, Job, RetryConfig};

/// Re-submits a failed job up to `max_retries` times with exponential
/// backoff. The wait is an async sleep, so no worker is held while waiting.
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl DispatchLayer for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        next: Next<'_>,
    ) -> Result<Job, ActivityError> {
        let mut attempt = 0u32;
        loop {
            let error = match next.run(request.clone()).await {
                Ok(job) => return Ok(job),
                Err(error) => error,
            };
            if attempt >= self.config.max_retries || !error.is_retryable() {
                if attempt > 0 {
                    tracing::warn!(
                        "'{}' giving up at {:?} after {} retries: {}",
                        request.processor,
                        request.job.index,
                        attempt,
                        error
                    );
                }
                return Err(error);
            }

            let delay = self.config.delay_for(attempt);
            attempt += 1;
            tracing::info!(
                "'{}' failed at {:?}: {}. Retry {}/{} in {}ms",
                request.processor,
                request.job.index,
                error,
                attempt,
                self.config.max_retries,
                delay.as_millis()
            );
            let ctx = &request.job.context;
            ctx.events().emit(ExecutionEvent::RetryScheduled {
                execution_id: ctx.execution_id(),
                processor: request.processor.to_string(),
                process: request.job.owning_process.to_string(),
                index: request.job.index.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancellation().cancelled() => return Err(ActivityError::Cancelled),
            }
        }
    }
}
