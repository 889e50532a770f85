use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    #[error("Type check error: {0}")]
    TypeCheck(#[from] TypeCheckError),

    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Unknown activity type: {0}")]
    UnknownActivity(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised while invoking an activity. These stay inside the
/// dispatch stack unless every layer above gives up on them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActivityError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Activity did not produce output '{0}'")]
    MissingOutput(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Processor '{0}' has no activity to invoke")]
    NoActivity(String),
}

impl ActivityError {
    /// Cancellation is final; everything else may be worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ActivityError::Cancelled)
    }
}

/// Structural edit failures. A failed edit leaves the graph untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Edit has already been applied")]
    AlreadyApplied,

    #[error("Edit has not been applied")]
    NotApplied,

    #[error("Processor '{processor}' already has a port named '{port}'")]
    DuplicatePort { processor: String, port: String },

    #[error("Processor '{processor}' has no port named '{port}'")]
    PortNotFound { processor: String, port: String },

    #[error("Port '{0}' is still connected")]
    PortInUse(String),

    #[error("Input port '{0}' already has an incoming link")]
    SinkAlreadyLinked(String),

    #[error("Link {source_port} -> {sink_port} is not registered")]
    LinkNotFound {
        source_port: String,
        sink_port: String,
    },

    #[error("Condition {control} -> {target} already exists")]
    DuplicateCondition { control: String, target: String },

    #[error("Condition {control} -> {target} not found")]
    ConditionNotFound { control: String, target: String },

    #[error("Processor '{0}' already exists")]
    DuplicateProcessor(String),

    #[error("Processor not found: {0}")]
    ProcessorNotFound(String),

    #[error("Processor was dropped while the edit was pending")]
    ProcessorDropped,
}

/// Type check failures that cannot be fixed by adding more links.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeCheckError {
    #[error("Iteration strategy of '{processor}' cannot reconcile port depths: {reason}")]
    IterationMismatch { processor: String, reason: String },

    #[error("Iteration strategy of '{processor}' names unknown port '{port}'")]
    UnknownPort { processor: String, port: String },

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Processor '{0}' has not been type checked")]
    NotReady(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("Reference not found: {0}")]
    NotFound(Uuid),

    #[error("Depth mismatch: expected {expected}, got {actual}")]
    DepthMismatch { expected: usize, actual: usize },

    #[error("Empty lists must have depth of at least 1, got {0}")]
    InvalidEmptyListDepth(usize),

    #[error("Value cannot be registered as a list of depth {0}")]
    NotAList(usize),
}
