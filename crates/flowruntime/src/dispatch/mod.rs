//! The dispatch stack: ordered middleware that decides how a job runs.
//!
//! Layer 0 sits nearest the processor, the last layer performs the actual
//! invocation. Every layer receives the job together with a [`Next`] handle
//! for the layers below it and may call it zero, one or many times.

mod error_bounce;
mod failover;
mod invoke;
mod parallelize;
mod retry;
mod tracker;

pub use error_bounce::ErrorBounce;
pub use failover::Failover;
pub use invoke::Invoke;
pub use parallelize::Parallelize;
pub use retry::Retry;
pub(crate) use tracker::{CompletionTracker, Released};

use async_trait::async_trait;
use flowcore::{Activity, ActivityError, DispatchConfig, Job, PortSpec};
use std::fmt;
use std::sync::Arc;

/// A job on its way down the stack plus what the layers need to run it.
#[derive(Clone)]
pub struct DispatchRequest {
    pub job: Job,
    pub processor: Arc<str>,
    pub activities: Arc<[Arc<dyn Activity>]>,
    /// Position in `activities` the invoke layer should use.
    pub activity: usize,
    pub outputs: Arc<[PortSpec]>,
}

impl DispatchRequest {
    pub fn new(
        job: Job,
        processor: Arc<str>,
        activities: Arc<[Arc<dyn Activity>]>,
        outputs: Arc<[PortSpec]>,
    ) -> Self {
        Self {
            job,
            processor,
            activities,
            activity: 0,
            outputs,
        }
    }
}

impl fmt::Debug for DispatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRequest")
            .field("processor", &self.processor)
            .field("job", &self.job)
            .field("activity", &self.activity)
            .finish()
    }
}

#[async_trait]
pub trait DispatchLayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle `request`, delegating downwards through `next` as needed.
    /// On success the returned job carries output port references at the
    /// request's coordinate.
    async fn dispatch(&self, request: DispatchRequest, next: Next<'_>)
        -> Result<Job, ActivityError>;
}

/// The remaining layers below the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Arc<dyn DispatchLayer>],
}

impl<'a> Next<'a> {
    pub async fn run(self, request: DispatchRequest) -> Result<Job, ActivityError> {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.dispatch(request, Next { layers: rest }).await,
            None => Err(ActivityError::ExecutionFailed(format!(
                "dispatch stack of '{}' ended without an invoke layer",
                request.processor
            ))),
        }
    }
}

#[derive(Clone)]
pub struct DispatchStack {
    layers: Vec<Arc<dyn DispatchLayer>>,
}

impl DispatchStack {
    pub fn new(layers: Vec<Arc<dyn DispatchLayer>>) -> Self {
        Self { layers }
    }

    /// `Parallelize -> ErrorBounce -> Failover -> Retry -> Invoke`, with
    /// the optional layers left out when disabled.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut layers: Vec<Arc<dyn DispatchLayer>> = vec![Arc::new(Parallelize::new(config.max_jobs))];
        if config.error_bounce {
            layers.push(Arc::new(ErrorBounce::new()));
        }
        if config.failover {
            layers.push(Arc::new(Failover::new()));
        }
        layers.push(Arc::new(Retry::new(config.retry.clone())));
        layers.push(Arc::new(Invoke::new(config.invoke_timeout())));
        Self::new(layers)
    }

    pub fn layers(&self) -> &[Arc<dyn DispatchLayer>] {
        &self.layers
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub async fn run(&self, request: DispatchRequest) -> Result<Job, ActivityError> {
        Next {
            layers: &self.layers,
        }
        .run(request)
        .await
    }
}

impl Default for DispatchStack {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl fmt::Debug for DispatchStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.layer_names()).finish()
    }
}

/// Output references for every port of `outputs`, each an error document at
/// the port's declared depth.
pub(crate) fn error_outputs(
    job: &Job,
    outputs: &[PortSpec],
    message: &str,
) -> std::collections::HashMap<String, flowcore::Reference> {
    let refs = job.context.references();
    outputs
        .iter()
        .map(|port| {
            (
                port.name.clone(),
                refs.register_error(port.depth, message.to_string()),
            )
        })
        .collect()
}
