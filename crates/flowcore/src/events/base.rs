use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during dataflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        dataflow: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    JobStarted {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        activity: String,
        timestamp: DateTime<Utc>,
    },
    JobCompleted {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    JobFailed {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RetryScheduled {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    FailedOver {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        from_activity: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ErrorBounced {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    CompletionReleased {
        execution_id: ExecutionId,
        processor: String,
        process: String,
        index: Vec<usize>,
        timestamp: DateTime<Utc>,
    },
    ConditionSatisfied {
        execution_id: ExecutionId,
        control: String,
        target: String,
        process: String,
        timestamp: DateTime<Utc>,
    },
    Activity {
        execution_id: ExecutionId,
        processor: String,
        event: ActivityEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events raised by activities themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ActivityEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Best-effort sender bound to one execution. A send without subscribers
/// is silently dropped; firing never depends on it.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(execution_id: ExecutionId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self {
            execution_id,
            sender,
        }
    }

    /// Emitter with nobody listening, for contexts built outside a runtime
    pub fn detached(execution_id: ExecutionId) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(execution_id, sender)
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn activity(&self, processor: &str, event: ActivityEvent) {
        self.emit(ExecutionEvent::Activity {
            execution_id: self.execution_id,
            processor: processor.to_string(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, processor: &str, message: impl Into<String>) {
        self.activity(
            processor,
            ActivityEvent::Info {
                message: message.into(),
            },
        );
    }

    /// Emit warning message
    pub fn warn(&self, processor: &str, message: impl Into<String>) {
        self.activity(
            processor,
            ActivityEvent::Warning {
                message: message.into(),
            },
        );
    }

    /// Emit progress update
    pub fn progress(&self, processor: &str, percent: f64, message: Option<String>) {
        self.activity(processor, ActivityEvent::Progress { percent, message });
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId) -> EventEmitter {
        EventEmitter::new(execution_id, self.sender.clone())
    }
}
