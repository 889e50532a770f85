use crate::events::{EventEmitter, ExecutionId};
use crate::ReferenceService;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Carrier threaded through every token and job of one run.
///
/// The engine passes it along untouched; activities and dispatch layers use
/// it to reach the reference service, the event side channel and the
/// run's cancellation token.
#[derive(Clone)]
pub struct InvocationContext {
    execution_id: ExecutionId,
    references: Arc<dyn ReferenceService>,
    events: EventEmitter,
    cancellation: CancellationToken,
}

impl InvocationContext {
    pub fn new(
        execution_id: ExecutionId,
        references: Arc<dyn ReferenceService>,
        events: EventEmitter,
    ) -> Self {
        Self {
            execution_id,
            references,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn references(&self) -> &dyn ReferenceService {
        self.references.as_ref()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("execution_id", &self.execution_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
