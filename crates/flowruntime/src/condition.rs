use crate::processor::Processor;
use dashmap::DashMap;
use flowcore::ProcessId;
use std::fmt;
use std::sync::{Arc, Weak};

/// Control link: `target` may not invoke for an owning process until
/// `control` has finished in that process.
pub struct Condition {
    control: Weak<Processor>,
    target: Weak<Processor>,
    control_name: String,
    target_name: String,
    satisfied: DashMap<ProcessId, bool>,
}

impl Condition {
    pub(crate) fn new(control: &Arc<Processor>, target: &Arc<Processor>) -> Arc<Self> {
        Arc::new(Self {
            control: Arc::downgrade(control),
            target: Arc::downgrade(target),
            control_name: control.name().to_string(),
            target_name: target.name().to_string(),
            satisfied: DashMap::new(),
        })
    }

    pub fn control(&self) -> Option<Arc<Processor>> {
        self.control.upgrade()
    }

    pub fn target(&self) -> Option<Arc<Processor>> {
        self.target.upgrade()
    }

    pub fn control_name(&self) -> &str {
        &self.control_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub(crate) fn links(&self, control: &Processor, target: &Processor) -> bool {
        self.control.as_ptr() == control as *const Processor
            && self.target.as_ptr() == target as *const Processor
    }

    /// Unseen processes are never satisfied.
    pub fn is_satisfied(&self, process: &ProcessId) -> bool {
        self.satisfied.get(process).map(|entry| *entry).unwrap_or(false)
    }

    /// Mark `process` satisfied and wake the target's waiting jobs.
    /// Returns false if it already was.
    pub fn satisfy(&self, process: &ProcessId) -> bool {
        let first = self.satisfied.insert(process.clone(), true) != Some(true);
        if first {
            tracing::debug!(
                "Condition {} -> {} satisfied for {}",
                self.control_name,
                self.target_name,
                process
            );
            if let Some(target) = self.target.upgrade() {
                target.notify_conditions_changed();
            }
        }
        first
    }

    /// Drop what is known about `process`. Called once the target can no
    /// longer invoke for it.
    pub(crate) fn forget(&self, process: &ProcessId) {
        if self.satisfied.remove(process).is_some() {
            tracing::trace!(
                "Condition {} -> {} forgot {}",
                self.control_name,
                self.target_name,
                process
            );
        }
    }

    /// Owning processes currently tracked.
    pub fn tracked_processes(&self) -> usize {
        self.satisfied.len()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("control", &self.control_name)
            .field("target", &self.target_name)
            .field("satisfied", &self.satisfied.len())
            .finish()
    }
}
