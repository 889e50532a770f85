use super::{error_outputs, DispatchLayer, DispatchRequest, Next};
use async_trait::async_trait;
use chrono::Utc;
use flowcore::{ActivityError, ExecutionEvent, Job};
use std::sync::atomic::{AtomicU64, Ordering};

/// Turns failures into error documents so sibling indices keep going.
///
/// Jobs whose inputs already carry errors are answered straight away with
/// error outputs; nothing below is invoked for them.
#[derive(Default)]
pub struct ErrorBounce {
    reflected: AtomicU64,
    translated: AtomicU64,
}

impl ErrorBounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs answered without invocation because their inputs held errors.
    pub fn reflected(&self) -> u64 {
        self.reflected.load(Ordering::Relaxed)
    }

    /// Failures from below converted into error results.
    pub fn translated(&self) -> u64 {
        self.translated.load(Ordering::Relaxed)
    }

    fn bounce(&self, request: &DispatchRequest, message: String) -> Job {
        let job = &request.job;
        job.context.events().emit(ExecutionEvent::ErrorBounced {
            execution_id: job.context.execution_id(),
            processor: request.processor.to_string(),
            process: job.owning_process.to_string(),
            index: job.index.clone(),
            error: message.clone(),
            timestamp: Utc::now(),
        });
        job.with_data(error_outputs(job, &request.outputs, &message))
    }
}

#[async_trait]
impl DispatchLayer for ErrorBounce {
    fn name(&self) -> &'static str {
        "error_bounce"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        next: Next<'_>,
    ) -> Result<Job, ActivityError> {
        if request.job.has_errors() {
            self.reflected.fetch_add(1, Ordering::Relaxed);
            let ports: Vec<&str> = request
                .job
                .data
                .iter()
                .filter(|(_, reference)| reference.contains_errors())
                .map(|(port, _)| port.as_str())
                .collect();
            tracing::debug!(
                "'{}' reflecting upstream error at {:?} from ports {:?}",
                request.processor,
                request.job.index,
                ports
            );
            let message = format!("upstream error on input {:?}", ports);
            return Ok(self.bounce(&request, message));
        }

        match next.run(request.clone()).await {
            Ok(job) => Ok(job),
            Err(ActivityError::Cancelled) => Err(ActivityError::Cancelled),
            Err(error) => {
                self.translated.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "'{}' failed at {:?} in {}: {}, emitting error document",
                    request.processor,
                    request.job.index,
                    request.job.owning_process,
                    error
                );
                Ok(self.bounce(&request, error.to_string()))
            }
        }
    }
}
