use crate::dataflow::Dataflow;
use crate::executor::{DataflowExecutor, ExecutionResult};
use crate::registry::ActivityRegistry;
use flowcore::{
    DispatchConfig, EventBus, FlowError, InMemoryReferenceService, ReferenceService, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Main runtime for executing dataflows
pub struct FlowRuntime {
    registry: Arc<ActivityRegistry>,
    executor: Arc<DataflowExecutor>,
    event_bus: Arc<EventBus>,
    references: Arc<dyn ReferenceService>,
    dataflows: Arc<RwLock<HashMap<String, Arc<Dataflow>>>>,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(ActivityRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<ActivityRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(DataflowExecutor::new(config.run_timeout()));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            executor,
            event_bus,
            references: Arc::new(InMemoryReferenceService::new()),
            dataflows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Dispatch settings new processors should be built with.
    pub fn dispatch_config(&self) -> &DispatchConfig {
        &self.config.dispatch
    }

    pub fn references(&self) -> &Arc<dyn ReferenceService> {
        &self.references
    }

    /// Register a dataflow under its name, replacing any previous one.
    pub async fn register_dataflow(&self, dataflow: Dataflow) -> Arc<Dataflow> {
        let dataflow = Arc::new(dataflow);
        let mut dataflows = self.dataflows.write().await;
        dataflows.insert(dataflow.name().to_string(), dataflow.clone());
        dataflow
    }

    pub async fn execute_dataflow(
        &self,
        name: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        let dataflow = {
            let dataflows = self.dataflows.read().await;
            dataflows
                .get(name)
                .cloned()
                .ok_or_else(|| FlowError::Execution(format!("dataflow '{}' not registered", name)))?
        };
        self.execute(&dataflow, inputs).await
    }

    /// Execute a dataflow directly (without registration)
    pub async fn execute(
        &self,
        dataflow: &Dataflow,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        self.executor
            .execute(dataflow, self.references.clone(), &self.event_bus, inputs)
            .await
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<flowcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Upper bound on one dataflow run. A run whose failed jobs were not
    /// bounced never closes its outputs, so this is the only way out.
    pub run_timeout_ms: Option<u64>,
    pub dispatch: DispatchConfig,
}

impl RuntimeConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            run_timeout_ms: Some(60_000),
            dispatch: DispatchConfig::default(),
        }
    }
}
