use super::{DispatchLayer, DispatchRequest, Next};
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{ActivityError, ExecutionEvent, Job};

/// Tries the processor's activities in order until one succeeds.
#[derive(Default)]
pub struct Failover;

impl Failover {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DispatchLayer for Failover {
    fn name(&self) -> &'static str {
        "failover"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        next: Next<'_>,
    ) -> Result<Job, ActivityError> {
        let candidates = request.activities.len();
        if candidates == 0 {
            return Err(ActivityError::NoActivity(request.processor.to_string()));
        }

        let mut last_error = None;
        for activity in request.activity..candidates {
            let mut attempt = request.clone();
            attempt.activity = activity;
            match next.run(attempt).await {
                Ok(job) => return Ok(job),
                Err(ActivityError::Cancelled) => return Err(ActivityError::Cancelled),
                Err(error) => {
                    if activity + 1 < candidates {
                        tracing::info!(
                            "'{}' activity {} failed at {:?}: {}, failing over",
                            request.processor,
                            activity,
                            request.job.index,
                            error
                        );
                        let ctx = &request.job.context;
                        ctx.events().emit(ExecutionEvent::FailedOver {
                            execution_id: ctx.execution_id(),
                            processor: request.processor.to_string(),
                            process: request.job.owning_process.to_string(),
                            index: request.job.index.clone(),
                            from_activity: activity,
                            error: error.to_string(),
                            timestamp: Utc::now(),
                        });
                    }
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ActivityError::NoActivity(request.processor.to_string())))
    }
}
