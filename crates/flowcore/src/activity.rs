use crate::{ActivityError, InvocationContext, ProcessId, Value};
use async_trait::async_trait;
use std::collections::HashMap;

/// A unit of work a processor can invoke. Processors hold an ordered list of
/// these and fail over from one to the next.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Type identifier (e.g., "math.sum", "transform.json_parse")
    fn activity_type(&self) -> &str;

    /// Run one invocation with hydrated inputs
    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError>;
}

/// Everything an activity sees for one invocation
#[derive(Clone)]
pub struct ActivityContext {
    /// Name of the invoking processor
    pub processor: String,

    /// Dynamic invocation this call belongs to
    pub owning_process: ProcessId,

    /// Coordinate inside the iterated collections
    pub index: Vec<usize>,

    /// Input values, already dereferenced
    pub inputs: HashMap<String, Value>,

    pub invocation: InvocationContext,
}

impl ActivityContext {
    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, ActivityError> {
        self.inputs
            .get(name)
            .ok_or_else(|| ActivityError::MissingInput(name.to_string()))
    }

    /// Get a required numeric input
    pub fn require_number(&self, name: &str) -> Result<f64, ActivityError> {
        let value = self.require_input(name)?;
        value.as_f64().ok_or_else(|| ActivityError::InvalidInputType {
            field: name.to_string(),
            expected: "number".to_string(),
            actual: value.kind().to_string(),
        })
    }

    /// Get a required list input
    pub fn require_array(&self, name: &str) -> Result<&[Value], ActivityError> {
        let value = self.require_input(name)?;
        value.as_array().ok_or_else(|| ActivityError::InvalidInputType {
            field: name.to_string(),
            expected: "array".to_string(),
            actual: value.kind().to_string(),
        })
    }

    /// Report progress through the run's event side channel
    pub fn info(&self, message: impl Into<String>) {
        self.invocation.events().info(&self.processor, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.invocation.events().warn(&self.processor, message);
    }
}

/// Output from one activity invocation, keyed by output port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityOutput {
    pub outputs: HashMap<String, Value>,
}

impl ActivityOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}
