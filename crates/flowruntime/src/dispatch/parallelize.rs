use super::{DispatchLayer, DispatchRequest, Next};
use async_trait::async_trait;
use flowcore::{ActivityError, Job};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Admission control: at most `max_jobs` jobs below this layer at once.
/// Waiting jobs are admitted first in, first out.
pub struct Parallelize {
    max_jobs: usize,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
}

impl Parallelize {
    pub fn new(max_jobs: usize) -> Self {
        let max_jobs = max_jobs.max(1);
        Self {
            max_jobs,
            permits: Arc::new(Semaphore::new(max_jobs)),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Counts one admitted job until dropped, so a cancelled dispatch future
/// still gives its slot back.
struct Admitted<'a>(&'a AtomicUsize);

impl<'a> Admitted<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let running = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), running)
    }
}

impl Drop for Admitted<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DispatchLayer for Parallelize {
    fn name(&self) -> &'static str {
        "parallelize"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        next: Next<'_>,
    ) -> Result<Job, ActivityError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ActivityError::Cancelled)?;
        let (_admitted, running) = Admitted::enter(&self.in_flight);
        tracing::trace!(
            "'{}' admitted job at {:?} ({}/{})",
            request.processor,
            request.job.index,
            running,
            self.max_jobs
        );
        next.run(request).await
    }
}
