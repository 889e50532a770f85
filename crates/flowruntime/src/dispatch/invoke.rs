use super::{DispatchLayer, DispatchRequest, Next};
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{
    register_nested, render, ActivityContext, ActivityError, ExecutionEvent, Job,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Bottom of the stack: hydrates inputs, calls the selected activity and
/// registers its outputs at each output port's declared depth.
#[derive(Default)]
pub struct Invoke {
    timeout: Option<Duration>,
}

impl Invoke {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DispatchLayer for Invoke {
    fn name(&self) -> &'static str {
        "invoke"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        _next: Next<'_>,
    ) -> Result<Job, ActivityError> {
        let job = &request.job;
        let ctx = &job.context;
        if ctx.cancellation().is_cancelled() {
            return Err(ActivityError::Cancelled);
        }
        let activity = request
            .activities
            .get(request.activity)
            .ok_or_else(|| ActivityError::NoActivity(request.processor.to_string()))?;

        let refs = ctx.references();
        let mut inputs = HashMap::with_capacity(job.data.len());
        for (port, reference) in &job.data {
            let value = render(refs, reference).map_err(|e| {
                ActivityError::ExecutionFailed(format!("cannot dereference input '{}': {}", port, e))
            })?;
            inputs.insert(port.clone(), value);
        }

        ctx.events().emit(ExecutionEvent::JobStarted {
            execution_id: ctx.execution_id(),
            processor: request.processor.to_string(),
            process: job.owning_process.to_string(),
            index: job.index.clone(),
            activity: activity.activity_type().to_string(),
            timestamp: Utc::now(),
        });
        tracing::debug!(
            "'{}' invoking {} at {:?} in {}",
            request.processor,
            activity.activity_type(),
            job.index,
            job.owning_process
        );

        let activity_ctx = ActivityContext {
            processor: request.processor.to_string(),
            owning_process: job.owning_process.clone(),
            index: job.index.clone(),
            inputs,
            invocation: ctx.clone(),
        };
        let start = Instant::now();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, activity.invoke(activity_ctx))
                .await
                .map_err(|_| ActivityError::Timeout {
                    millis: limit.as_millis() as u64,
                })??,
            None => activity.invoke(activity_ctx).await?,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut values = output.outputs;
        let mut data = HashMap::with_capacity(request.outputs.len());
        for port in request.outputs.iter() {
            let value = values
                .remove(&port.name)
                .ok_or_else(|| ActivityError::MissingOutput(port.name.clone()))?;
            let reference = register_nested(refs, value, port.depth).map_err(|e| {
                ActivityError::ExecutionFailed(format!(
                    "output '{}' does not match declared depth {}: {}",
                    port.name, port.depth, e
                ))
            })?;
            data.insert(port.name.clone(), reference);
        }

        ctx.events().emit(ExecutionEvent::JobCompleted {
            execution_id: ctx.execution_id(),
            processor: request.processor.to_string(),
            process: job.owning_process.to_string(),
            index: job.index.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(job.with_data(data))
    }
}
