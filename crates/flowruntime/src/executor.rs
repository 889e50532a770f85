use crate::dataflow::Dataflow;
use chrono::Utc;
use flowcore::{
    register_nested, render, ActivityError, EventBus, ExecutionEvent, ExecutionId, FlowError,
    InvocationContext, ProcessId, ReferenceService, Token, TypeCheckError, Value,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Runs one invocation of a dataflow: pushes its inputs, fires source
/// processors and waits for every output to close.
pub struct DataflowExecutor {
    run_timeout: Option<Duration>,
}

impl DataflowExecutor {
    pub fn new(run_timeout: Option<Duration>) -> Self {
        Self { run_timeout }
    }

    pub async fn execute(
        &self,
        dataflow: &Dataflow,
        references: Arc<dyn ReferenceService>,
        event_bus: &EventBus,
        inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            dataflow: dataflow.name().to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting dataflow '{}' as {}", dataflow.name(), execution_id);

        let cancellation = CancellationToken::new();
        let result = self
            .run(dataflow, references, event_bus, execution_id, &cancellation, inputs)
            .await;
        if result.is_err() {
            cancellation.cancel();
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let success = matches!(&result, Ok(r) if !r.has_errors());
        event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        match &result {
            Ok(_) => tracing::info!("Dataflow '{}' finished in {}ms", dataflow.name(), duration_ms),
            Err(e) => tracing::error!("Dataflow '{}' failed: {}", dataflow.name(), e),
        }
        result.map(|mut r| {
            r.duration_ms = duration_ms;
            r
        })
    }

    async fn run(
        &self,
        dataflow: &Dataflow,
        references: Arc<dyn ReferenceService>,
        event_bus: &EventBus,
        execution_id: ExecutionId,
        cancellation: &CancellationToken,
        mut inputs: HashMap<String, Value>,
    ) -> Result<ExecutionResult, FlowError> {
        if !dataflow.type_check()? {
            return Err(TypeCheckError::NotReady(dataflow.name().to_string()).into());
        }

        let process = ProcessId::new(execution_id.to_string());
        let context = InvocationContext::new(
            execution_id,
            references.clone(),
            event_bus.create_emitter(execution_id),
        )
        .with_cancellation(cancellation.clone());

        // Register everything before the first token moves
        let mut tokens = Vec::with_capacity(dataflow.inputs().len());
        for port in dataflow.inputs() {
            let value = inputs
                .remove(port.name())
                .ok_or_else(|| ActivityError::MissingInput(port.name().to_string()))?;
            let reference = register_nested(references.as_ref(), value, port.declared_depth())?;
            tokens.push((port.clone(), reference));
        }
        for name in inputs.keys() {
            tracing::warn!("Ignoring unknown input '{}' for '{}'", name, dataflow.name());
        }

        for (port, reference) in tokens {
            port.send(Token::new(process.clone(), Vec::new(), reference, context.clone()));
        }
        for processor in dataflow.processors() {
            if processor.input_ports().is_empty() {
                processor.fire(&process, context.clone())?;
            }
        }

        let waits = dataflow.outputs().iter().map(|output| output.wait(&process));
        let collected = match self.run_timeout {
            Some(limit) => timeout(limit, join_all(waits)).await.map_err(|_| {
                FlowError::Execution(format!(
                    "dataflow '{}' did not finish within {}ms",
                    dataflow.name(),
                    limit.as_millis()
                ))
            })?,
            None => join_all(waits).await,
        };

        // Targets that never ran for this process leave their conditions behind
        for condition in dataflow.conditions() {
            condition.forget(&process);
        }

        let mut outputs = HashMap::with_capacity(collected.len());
        for (output, reference) in dataflow.outputs().iter().zip(collected) {
            outputs.insert(output.name().to_string(), render(references.as_ref(), &reference)?);
            output.clear(&process);
        }
        Ok(ExecutionResult {
            execution_id,
            outputs,
            duration_ms: 0,
        })
    }
}

impl Default for DataflowExecutor {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Result of a dataflow run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub outputs: HashMap<String, Value>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    /// True if any output holds an error document anywhere inside it.
    pub fn has_errors(&self) -> bool {
        self.outputs.values().any(Value::is_error)
    }
}
