// Shared helpers for the flowruntime integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    Activity, ActivityContext, ActivityError, ActivityOutput, EventBus, EventEmitter,
    ExecutionEvent, ExecutionId, InMemoryReferenceService, InvocationContext, ReferenceService,
    Value,
};
use flowruntime::{Dataflow, DataflowExecutor, ExecutionResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn references() -> Arc<dyn ReferenceService> {
    Arc::new(InMemoryReferenceService::new())
}

pub fn context(references: Arc<dyn ReferenceService>) -> InvocationContext {
    let execution_id = ExecutionId::new_v4();
    InvocationContext::new(execution_id, references, EventEmitter::detached(execution_id))
}

pub fn inputs(entries: Vec<(&str, Value)>) -> HashMap<String, Value> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

pub fn numbers(values: &[f64]) -> Value {
    Value::Array(values.iter().map(|n| Value::Number(*n)).collect())
}

/// Run `dataflow` once, collecting every event it raised.
pub async fn run(
    dataflow: &Dataflow,
    values: HashMap<String, Value>,
) -> (ExecutionResult, Vec<ExecutionEvent>) {
    let bus = EventBus::new(10_000);
    let mut receiver = bus.subscribe();
    let executor = DataflowExecutor::new(Some(Duration::from_secs(30)));
    let result = executor
        .execute(dataflow, references(), &bus, values)
        .await
        .expect("dataflow run failed");
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    (result, events)
}

pub fn started_indices(events: &[ExecutionEvent], processor: &str) -> Vec<Vec<usize>> {
    let mut indices: Vec<Vec<usize>> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::JobStarted {
                processor: p,
                index,
                ..
            } if p == processor => Some(index.clone()),
            _ => None,
        })
        .collect();
    indices.sort();
    indices
}

pub fn released_indices(events: &[ExecutionEvent], processor: &str) -> Vec<Vec<usize>> {
    events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::CompletionReleased {
                processor: p,
                index,
                ..
            } if p == processor => Some(index.clone()),
            _ => None,
        })
        .collect()
}

/// `sum = x + y`
pub struct Sum;

#[async_trait]
impl Activity for Sum {
    fn activity_type(&self) -> &str {
        "test.sum"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let x = ctx.require_number("x")?;
        let y = ctx.require_number("y")?;
        Ok(ActivityOutput::new().with_output("sum", x + y))
    }
}

/// `result = value * 2`, counting its invocations.
#[derive(Default)]
pub struct Double {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Activity for Double {
    fn activity_type(&self) -> &str {
        "test.double"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = ctx.require_number("value")?;
        Ok(ActivityOutput::new().with_output("result", value * 2.0))
    }
}

/// `length = len(items)` over a depth 1 input.
pub struct Length;

#[async_trait]
impl Activity for Length {
    fn activity_type(&self) -> &str {
        "test.length"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let items = ctx.require_array("items")?;
        Ok(ActivityOutput::new().with_output("length", items.len() as f64))
    }
}

/// Fails its first `failures` calls, then doubles `value`.
pub struct Flaky {
    failures: usize,
    pub attempts: AtomicUsize,
}

impl Flaky {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Activity for Flaky {
    fn activity_type(&self) -> &str {
        "test.flaky"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(ActivityError::ExecutionFailed(format!(
                "attempt {} failed",
                attempt + 1
            )));
        }
        let value = ctx.require_number("value")?;
        Ok(ActivityOutput::new().with_output("result", value * 2.0))
    }
}

/// Never succeeds.
#[derive(Default)]
pub struct Broken {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Activity for Broken {
    fn activity_type(&self) -> &str {
        "test.broken"
    }

    async fn invoke(&self, _ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ActivityError::ExecutionFailed("always broken".to_string()))
    }
}

/// Sleeps, then doubles `value`, tracking the peak number of concurrent calls.
pub struct Slow {
    delay: Duration,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Slow {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Activity for Slow {
    fn activity_type(&self) -> &str {
        "test.slow"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        let value = ctx.require_number("value")?;
        Ok(ActivityOutput::new().with_output("result", value * 2.0))
    }
}

/// Appends its label to a shared log after an optional delay.
pub struct Record {
    label: String,
    delay: Duration,
    log: Arc<Mutex<Vec<String>>>,
}

impl Record {
    pub fn new(label: &str, delay: Duration, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.to_string(),
            delay,
            log,
        }
    }
}

#[async_trait]
impl Activity for Record {
    fn activity_type(&self) -> &str {
        "test.record"
    }

    async fn invoke(&self, _ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        tokio::time::sleep(self.delay).await;
        self.log.lock().unwrap().push(self.label.clone());
        Ok(ActivityOutput::new().with_output("out", self.label.as_str()))
    }
}
