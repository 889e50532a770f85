//! Reversible structural changes to processors, links and conditions.
//!
//! Every change to a graph goes through an [`Edit`]. An edit applies at
//! most once and can only be undone after it was applied; a failing edit
//! leaves the graph as it found it.

use crate::condition::Condition;
use crate::datalink::Datalink;
use crate::dispatch::DispatchStack;
use crate::iteration::IterationStrategyStack;
use crate::port::{InputPort, OutputPort};
use crate::processor::Processor;
use flowcore::{Activity, EditError, PortSpec};
use std::sync::Arc;

pub trait Edit: Send + Sync {
    fn apply(&mut self) -> Result<(), EditError>;

    fn undo(&mut self) -> Result<(), EditError>;

    fn is_applied(&self) -> bool;

    /// Short human-readable summary, used in logs.
    fn describe(&self) -> String;
}

fn ensure_unapplied(applied: bool) -> Result<(), EditError> {
    if applied {
        Err(EditError::AlreadyApplied)
    } else {
        Ok(())
    }
}

fn ensure_applied(applied: bool) -> Result<(), EditError> {
    if applied {
        Ok(())
    } else {
        Err(EditError::NotApplied)
    }
}

pub struct AddInputPort {
    processor: Arc<Processor>,
    spec: PortSpec,
    port: Option<Arc<InputPort>>,
}

impl AddInputPort {
    pub fn new(processor: Arc<Processor>, spec: PortSpec) -> Self {
        Self {
            processor,
            spec,
            port: None,
        }
    }

    /// The created port, once applied.
    pub fn port(&self) -> Option<Arc<InputPort>> {
        self.port.clone()
    }
}

impl Edit for AddInputPort {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.port.is_some())?;
        self.port = Some(self.processor.insert_input_port(self.spec.clone())?);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        ensure_applied(self.port.is_some())?;
        self.processor.take_input_port(&self.spec.name)?;
        self.port = None;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("add input {}.{}", self.processor.name(), self.spec.name)
    }
}

pub struct AddOutputPort {
    processor: Arc<Processor>,
    spec: PortSpec,
    port: Option<Arc<OutputPort>>,
}

impl AddOutputPort {
    pub fn new(processor: Arc<Processor>, spec: PortSpec) -> Self {
        Self {
            processor,
            spec,
            port: None,
        }
    }

    pub fn port(&self) -> Option<Arc<OutputPort>> {
        self.port.clone()
    }
}

impl Edit for AddOutputPort {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.port.is_some())?;
        self.port = Some(self.processor.insert_output_port(self.spec.clone())?);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        ensure_applied(self.port.is_some())?;
        self.processor.take_output_port(&self.spec.name)?;
        self.port = None;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("add output {}.{}", self.processor.name(), self.spec.name)
    }
}

/// Removes an unconnected input port. Undo puts it back at its old position.
pub struct RemoveInputPort {
    processor: Arc<Processor>,
    name: String,
    removed: Option<(usize, Arc<InputPort>)>,
}

impl RemoveInputPort {
    pub fn new(processor: Arc<Processor>, name: impl Into<String>) -> Self {
        Self {
            processor,
            name: name.into(),
            removed: None,
        }
    }
}

impl Edit for RemoveInputPort {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.removed.is_some())?;
        self.removed = Some(self.processor.take_input_port(&self.name)?);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some((position, port)) = self.removed.take() else {
            return Err(EditError::NotApplied);
        };
        if let Err(error) = self.processor.restore_input_port(position, port.clone()) {
            self.removed = Some((position, port));
            return Err(error);
        }
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.removed.is_some()
    }

    fn describe(&self) -> String {
        format!("remove input {}.{}", self.processor.name(), self.name)
    }
}

pub struct RemoveOutputPort {
    processor: Arc<Processor>,
    name: String,
    removed: Option<(usize, Arc<OutputPort>)>,
}

impl RemoveOutputPort {
    pub fn new(processor: Arc<Processor>, name: impl Into<String>) -> Self {
        Self {
            processor,
            name: name.into(),
            removed: None,
        }
    }
}

impl Edit for RemoveOutputPort {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.removed.is_some())?;
        self.removed = Some(self.processor.take_output_port(&self.name)?);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some((position, port)) = self.removed.take() else {
            return Err(EditError::NotApplied);
        };
        if let Err(error) = self.processor.restore_output_port(position, port.clone()) {
            self.removed = Some((position, port));
            return Err(error);
        }
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.removed.is_some()
    }

    fn describe(&self) -> String {
        format!("remove output {}.{}", self.processor.name(), self.name)
    }
}

/// Appends an activity; later activities are failover alternatives.
pub struct AddActivity {
    processor: Arc<Processor>,
    activity: Arc<dyn Activity>,
    applied: bool,
}

impl AddActivity {
    pub fn new(processor: Arc<Processor>, activity: Arc<dyn Activity>) -> Self {
        Self {
            processor,
            activity,
            applied: false,
        }
    }
}

impl Edit for AddActivity {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.applied)?;
        self.processor.push_activity(self.activity.clone());
        self.applied = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        ensure_applied(self.applied)?;
        self.processor.remove_activity(&self.activity);
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn describe(&self) -> String {
        format!(
            "add activity {} to {}",
            self.activity.activity_type(),
            self.processor.name()
        )
    }
}

/// Links an output port to an input port. An input port takes one link.
pub struct Connect {
    source: Arc<OutputPort>,
    sink: Arc<InputPort>,
    link: Option<Arc<Datalink>>,
}

impl Connect {
    pub fn new(source: Arc<OutputPort>, sink: Arc<InputPort>) -> Self {
        Self {
            source,
            sink,
            link: None,
        }
    }

    pub fn link(&self) -> Option<Arc<Datalink>> {
        self.link.clone()
    }
}

impl Edit for Connect {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.link.is_some())?;
        let link = Datalink::new(&self.source, self.sink.clone());
        self.sink.attach(link.clone())?;
        self.source.add_link(link.clone());
        self.link = Some(link);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some(link) = self.link.clone() else {
            return Err(EditError::NotApplied);
        };
        self.sink.detach(&link)?;
        if let Err(error) = self.source.remove_link(&link) {
            // Both ends must agree, put the sink back
            let _ = self.sink.attach(link);
            return Err(error);
        }
        self.link = None;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.link.is_some()
    }

    fn describe(&self) -> String {
        format!("connect {} -> {}", self.source.name(), self.sink.name())
    }
}

pub struct Disconnect {
    link: Arc<Datalink>,
    position: Option<usize>,
}

impl Disconnect {
    pub fn new(link: Arc<Datalink>) -> Self {
        Self {
            link,
            position: None,
        }
    }
}

impl Edit for Disconnect {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.position.is_some())?;
        let source = self.link.source().ok_or(EditError::ProcessorDropped)?;
        self.link.sink().detach(&self.link)?;
        match source.remove_link(&self.link) {
            Ok(position) => {
                self.position = Some(position);
                Ok(())
            }
            Err(error) => {
                let _ = self.link.sink().attach(self.link.clone());
                Err(error)
            }
        }
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some(position) = self.position else {
            return Err(EditError::NotApplied);
        };
        let source = self.link.source().ok_or(EditError::ProcessorDropped)?;
        self.link.sink().attach(self.link.clone())?;
        source.insert_link(position, self.link.clone());
        self.position = None;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.position.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "disconnect {} -> {}",
            self.link.source_name(),
            self.link.sink().name()
        )
    }
}

/// Makes `target` wait on `control` per owning process. At most one
/// condition may join the same pair.
pub struct CreateCondition {
    control: Arc<Processor>,
    target: Arc<Processor>,
    condition: Option<Arc<Condition>>,
}

impl CreateCondition {
    pub fn new(control: Arc<Processor>, target: Arc<Processor>) -> Self {
        Self {
            control,
            target,
            condition: None,
        }
    }

    pub fn condition(&self) -> Option<Arc<Condition>> {
        self.condition.clone()
    }
}

impl Edit for CreateCondition {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.condition.is_some())?;
        if self.target.has_precondition_from(&self.control) {
            return Err(EditError::DuplicateCondition {
                control: self.control.name().to_string(),
                target: self.target.name().to_string(),
            });
        }
        let condition = Condition::new(&self.control, &self.target);
        self.target.add_precondition(condition.clone());
        self.control.add_controlled(condition.clone());
        self.condition = Some(condition);
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some(condition) = self.condition.take() else {
            return Err(EditError::NotApplied);
        };
        self.target.remove_precondition(&condition);
        self.control.remove_controlled(&condition);
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.condition.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "create condition {} -> {}",
            self.control.name(),
            self.target.name()
        )
    }
}

pub struct RemoveCondition {
    condition: Arc<Condition>,
    applied: bool,
}

impl RemoveCondition {
    pub fn new(condition: Arc<Condition>) -> Self {
        Self {
            condition,
            applied: false,
        }
    }

    fn endpoints(&self) -> Result<(Arc<Processor>, Arc<Processor>), EditError> {
        let control = self.condition.control().ok_or(EditError::ProcessorDropped)?;
        let target = self.condition.target().ok_or(EditError::ProcessorDropped)?;
        Ok((control, target))
    }
}

impl Edit for RemoveCondition {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.applied)?;
        let (control, target) = self.endpoints()?;
        if !target.remove_precondition(&self.condition) {
            return Err(EditError::ConditionNotFound {
                control: self.condition.control_name().to_string(),
                target: self.condition.target_name().to_string(),
            });
        }
        control.remove_controlled(&self.condition);
        self.applied = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        ensure_applied(self.applied)?;
        let (control, target) = self.endpoints()?;
        if target.has_precondition_from(&control) {
            return Err(EditError::DuplicateCondition {
                control: control.name().to_string(),
                target: target.name().to_string(),
            });
        }
        target.add_precondition(self.condition.clone());
        control.add_controlled(self.condition.clone());
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn describe(&self) -> String {
        format!(
            "remove condition {} -> {}",
            self.condition.control_name(),
            self.condition.target_name()
        )
    }
}

pub struct SetIterationStrategy {
    processor: Arc<Processor>,
    stack: IterationStrategyStack,
    previous: Option<IterationStrategyStack>,
}

impl SetIterationStrategy {
    pub fn new(processor: Arc<Processor>, stack: IterationStrategyStack) -> Self {
        Self {
            processor,
            stack,
            previous: None,
        }
    }
}

impl Edit for SetIterationStrategy {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.previous.is_some())?;
        self.previous = Some(self.processor.replace_iteration(self.stack.clone()));
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some(previous) = self.previous.take() else {
            return Err(EditError::NotApplied);
        };
        self.processor.replace_iteration(previous);
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.previous.is_some()
    }

    fn describe(&self) -> String {
        format!("set iteration strategy of {}", self.processor.name())
    }
}

pub struct SetDispatchStack {
    processor: Arc<Processor>,
    stack: DispatchStack,
    previous: Option<DispatchStack>,
}

impl SetDispatchStack {
    pub fn new(processor: Arc<Processor>, stack: DispatchStack) -> Self {
        Self {
            processor,
            stack,
            previous: None,
        }
    }
}

impl Edit for SetDispatchStack {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.previous.is_some())?;
        self.previous = Some(self.processor.replace_dispatch(self.stack.clone()));
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        let Some(previous) = self.previous.take() else {
            return Err(EditError::NotApplied);
        };
        self.processor.replace_dispatch(previous);
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.previous.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "set dispatch stack of {} to {:?}",
            self.processor.name(),
            self.stack.layer_names()
        )
    }
}

/// An ordered list of edits applied as one.
#[derive(Default)]
pub struct CompoundEdit {
    edits: Vec<Box<dyn Edit>>,
    applied: bool,
}

impl CompoundEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: impl Edit + 'static) {
        self.edits.push(Box::new(edit));
    }

    pub fn with(mut self, edit: impl Edit + 'static) -> Self {
        self.push(edit);
        self
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

impl Edit for CompoundEdit {
    fn apply(&mut self) -> Result<(), EditError> {
        ensure_unapplied(self.applied)?;
        for position in 0..self.edits.len() {
            if let Err(error) = self.edits[position].apply() {
                tracing::warn!(
                    "Rolling back {} edits: '{}' failed: {}",
                    position,
                    self.edits[position].describe(),
                    error
                );
                for edit in self.edits[..position].iter_mut().rev() {
                    if let Err(undo_error) = edit.undo() {
                        tracing::error!("Rollback of '{}' failed: {}", edit.describe(), undo_error);
                    }
                }
                return Err(error);
            }
        }
        self.applied = true;
        Ok(())
    }

    fn undo(&mut self) -> Result<(), EditError> {
        ensure_applied(self.applied)?;
        for edit in self.edits.iter_mut().rev() {
            edit.undo()?;
        }
        self.applied = false;
        Ok(())
    }

    fn is_applied(&self) -> bool {
        self.applied
    }

    fn describe(&self) -> String {
        format!("{} edits", self.edits.len())
    }
}
