//! Processors: the unit of composition.
//!
//! A processor owns its ports, an iteration strategy stack, a dispatch
//! stack and the crystallizer that turns results back into tokens. Tokens
//! delivered to an input port flow through the iteration engine; each job
//! it produces runs on its own task through the dispatch stack.

use crate::condition::Condition;
use crate::crystallizer::{Crystallizer, PortToken};
use crate::dispatch::{CompletionTracker, DispatchRequest, DispatchStack};
use crate::edits::{AddActivity, AddInputPort, AddOutputPort, CompoundEdit, Edit, SetDispatchStack, SetIterationStrategy};
use crate::iteration::{IterationEngine, IterationNode, IterationStrategyStack, PortDepth};
use crate::port::{InputPort, OutputPort, TokenHandler};
use chrono::Utc;
use flowcore::{
    Activity, DispatchConfig, EditError, ExecutionEvent, InvocationContext, IterationEvent, Job,
    PortSpec, ProcessId, Token, TypeCheckError,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

struct Structure {
    inputs: Vec<Arc<InputPort>>,
    outputs: Vec<Arc<OutputPort>>,
    activities: Vec<Arc<dyn Activity>>,
    iteration: IterationStrategyStack,
    dispatch: DispatchStack,
    preconditions: Vec<Arc<Condition>>,
    controlled: Vec<Arc<Condition>>,
    wrapping_depth: Option<usize>,
}

#[derive(Debug, PartialEq)]
struct FiringPlan {
    root: IterationNode,
    ports: BTreeMap<String, PortDepth>,
    outputs: Vec<PortSpec>,
    wrapping_depth: usize,
}

/// Everything touched while tokens and results flow. Guarded by one lock
/// per processor; never held while taking the structure lock for writing.
#[derive(Default)]
struct FiringState {
    plan: Option<FiringPlan>,
    engine: Option<IterationEngine>,
    crystallizer: Option<Crystallizer>,
    outputs: Vec<Arc<OutputPort>>,
    tracker: CompletionTracker,
}

/// Point-in-time view of a processor's in-flight work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStatus {
    /// Invocations still waiting for input data.
    pub pending_iterations: usize,
    /// Jobs submitted to the dispatch stack without a result yet.
    pub outstanding_jobs: usize,
    /// Invocations with results not yet closed into their top-level list.
    pub pending_results: usize,
}

pub struct Processor {
    name: Arc<str>,
    me: Weak<Processor>,
    structure: RwLock<Structure>,
    firing: Mutex<FiringState>,
    conditions_changed: Notify,
}

impl Processor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_dispatch(name, DispatchStack::default())
    }

    pub fn with_dispatch(name: impl Into<String>, dispatch: DispatchStack) -> Arc<Self> {
        let name: String = name.into();
        Arc::new_cyclic(|me| Self {
            name: Arc::from(name),
            me: me.clone(),
            structure: RwLock::new(Structure {
                inputs: Vec::new(),
                outputs: Vec::new(),
                activities: Vec::new(),
                iteration: IterationStrategyStack::new(),
                dispatch,
                preconditions: Vec::new(),
                controlled: Vec::new(),
                wrapping_depth: None,
            }),
            firing: Mutex::new(FiringState::default()),
            conditions_changed: Notify::new(),
        })
    }

    pub fn builder(name: impl Into<String>) -> ProcessorBuilder {
        ProcessorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_ports(&self) -> Vec<Arc<InputPort>> {
        self.structure.read().inputs.clone()
    }

    pub fn output_ports(&self) -> Vec<Arc<OutputPort>> {
        self.structure.read().outputs.clone()
    }

    pub fn input_port(&self, name: &str) -> Option<Arc<InputPort>> {
        self.structure
            .read()
            .inputs
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn output_port(&self, name: &str) -> Option<Arc<OutputPort>> {
        self.structure
            .read()
            .outputs
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn activities(&self) -> Vec<Arc<dyn Activity>> {
        self.structure.read().activities.clone()
    }

    pub fn iteration_strategy(&self) -> IterationStrategyStack {
        self.structure.read().iteration.clone()
    }

    pub fn dispatch_stack(&self) -> DispatchStack {
        self.structure.read().dispatch.clone()
    }

    pub fn preconditions(&self) -> Vec<Arc<Condition>> {
        self.structure.read().preconditions.clone()
    }

    pub fn controlled_conditions(&self) -> Vec<Arc<Condition>> {
        self.structure.read().controlled.clone()
    }

    /// Index length of every job, once type checked.
    pub fn result_wrapping_depth(&self) -> Option<usize> {
        self.structure.read().wrapping_depth
    }

    pub fn status(&self) -> ProcessorStatus {
        let firing = self.firing.lock();
        ProcessorStatus {
            pending_iterations: firing
                .engine
                .as_ref()
                .map(IterationEngine::pending_processes)
                .unwrap_or(0),
            outstanding_jobs: firing.tracker.outstanding(),
            pending_results: firing
                .crystallizer
                .as_ref()
                .map(Crystallizer::pending_processes)
                .unwrap_or(0),
        }
    }

    /// Resolve depths for this processor.
    ///
    /// Returns `Ok(false)` while some input port lacks a resolved incoming
    /// link; that is recoverable by connecting more of the graph. An
    /// iteration strategy that cannot reconcile the depths is an error.
    pub fn type_check(&self) -> Result<bool, TypeCheckError> {
        let (plan, outputs) = {
            let mut structure = self.structure.write();
            let mut ports = BTreeMap::new();
            for port in &structure.inputs {
                match port.resolved_depth() {
                    Some(resolved) => {
                        ports.insert(
                            port.name().to_string(),
                            PortDepth::new(port.declared_depth(), resolved),
                        );
                    }
                    None => {
                        tracing::debug!(
                            "'{}' not ready: input '{}' has no resolved link",
                            self.name,
                            port.name()
                        );
                        return Ok(false);
                    }
                }
            }
            let names: Vec<&str> = structure.inputs.iter().map(|p| p.name()).collect();
            let root = structure.iteration.effective(&names);
            let wrapping_depth = root.depth(&self.name, &ports)?;
            for port in &structure.outputs {
                port.resolve(wrapping_depth);
            }
            structure.wrapping_depth = Some(wrapping_depth);
            let plan = FiringPlan {
                root,
                ports,
                outputs: structure.outputs.iter().map(|p| p.spec().clone()).collect(),
                wrapping_depth,
            };
            (plan, structure.outputs.clone())
        };

        let mut firing = self.firing.lock();
        if firing.plan.as_ref() != Some(&plan) {
            if firing.tracker.outstanding() > 0 {
                tracing::warn!(
                    "'{}' re-planned with {} jobs in flight",
                    self.name,
                    firing.tracker.outstanding()
                );
            }
            tracing::info!(
                "Type checked '{}': result wrapping depth {}",
                self.name,
                plan.wrapping_depth
            );
            firing.engine = Some(IterationEngine::new(
                self.name.as_ref(),
                &plan.root,
                &plan.ports,
            ));
            firing.crystallizer = Some(Crystallizer::new(
                self.name.as_ref(),
                plan.outputs.clone(),
                plan.wrapping_depth,
            ));
            firing.plan = Some(plan);
        }
        firing.outputs = outputs;
        Ok(true)
    }

    /// Start a new invocation of this processor inside `owning_process`
    /// with no input data.
    pub fn fire(
        &self,
        owning_process: &ProcessId,
        context: InvocationContext,
    ) -> Result<(), TypeCheckError> {
        let job = Job::new(
            owning_process.child(self.name.as_ref()),
            Vec::new(),
            HashMap::new(),
            context,
        );
        if !self.is_type_checked() {
            return Err(TypeCheckError::NotReady(self.name.to_string()));
        }
        let mut firing = self.firing.lock();
        if firing.crystallizer.is_none() {
            return Err(TypeCheckError::NotReady(self.name.to_string()));
        }
        tracing::debug!("Firing '{}' in {}", self.name, owning_process);
        self.submit(&mut firing, vec![IterationEvent::Job(job)]);
        Ok(())
    }

    /// Depths are resolved for the current structure. Any structural edit
    /// clears this until the next type check.
    pub fn is_type_checked(&self) -> bool {
        self.structure.read().wrapping_depth.is_some()
    }

    /// True when every precondition holds for `process`.
    pub fn conditions_satisfied(&self, process: &ProcessId) -> bool {
        self.structure
            .read()
            .preconditions
            .iter()
            .all(|condition| condition.is_satisfied(process))
    }

    pub(crate) fn notify_conditions_changed(&self) {
        self.conditions_changed.notify_waiters();
    }

    fn submit(&self, firing: &mut FiringState, events: Vec<IterationEvent>) {
        for event in events {
            match event {
                IterationEvent::Job(job) => {
                    let Some(me) = self.me.upgrade() else {
                        return;
                    };
                    firing.tracker.job_started(&job.owning_process, &job.index);
                    tokio::spawn(me.run_job(job));
                }
                IterationEvent::Completion(completion) => {
                    let context = completion.context.clone();
                    let process = completion.owning_process.clone();
                    let released = firing.tracker.completion_arrived(completion);
                    self.deliver(firing, released, &process, &context);
                }
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: Job) {
        let enclosing = job.owning_process.enclosing();
        self.await_preconditions(&enclosing).await;

        let (stack, request) = {
            let structure = self.structure.read();
            let request = DispatchRequest::new(
                job.clone(),
                self.name.clone(),
                structure.activities.iter().cloned().collect(),
                structure.outputs.iter().map(|p| p.spec().clone()).collect(),
            );
            (structure.dispatch.clone(), request)
        };
        let result = stack.run(request).await;

        let mut firing = self.firing.lock();
        match result {
            Ok(done) => self.crystallize(&mut firing, IterationEvent::Job(done)),
            Err(error) => {
                tracing::error!(
                    "'{}' failed at {:?} in {}: {}",
                    self.name,
                    job.index,
                    job.owning_process,
                    error
                );
                let ctx = &job.context;
                ctx.events().emit(ExecutionEvent::JobFailed {
                    execution_id: ctx.execution_id(),
                    processor: self.name.to_string(),
                    process: job.owning_process.to_string(),
                    index: job.index.clone(),
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        let released = firing.tracker.job_finished(&job.owning_process, &job.index);
        self.deliver(&mut firing, released, &job.owning_process, &job.context);
    }

    async fn await_preconditions(&self, process: &ProcessId) {
        loop {
            let notified = self.conditions_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.conditions_satisfied(process) {
                return;
            }
            tracing::debug!("'{}' waiting on preconditions for {}", self.name, process);
            notified.await;
        }
    }

    fn deliver(
        &self,
        firing: &mut FiringState,
        released: crate::dispatch::Released,
        process: &ProcessId,
        context: &InvocationContext,
    ) {
        for completion in released.completions {
            context.events().emit(ExecutionEvent::CompletionReleased {
                execution_id: context.execution_id(),
                processor: self.name.to_string(),
                process: completion.owning_process.to_string(),
                index: completion.index.clone(),
                timestamp: Utc::now(),
            });
            self.crystallize(firing, IterationEvent::Completion(completion));
        }
        if released.finished {
            self.invocation_finished(process, context);
        }
    }

    fn crystallize(&self, firing: &mut FiringState, event: IterationEvent) {
        let Some(crystallizer) = firing.crystallizer.as_mut() else {
            tracing::error!("'{}' produced a result before type check", self.name);
            return;
        };
        match crystallizer.receive(event) {
            Ok(tokens) => emit(&firing.outputs, tokens),
            Err(error) => tracing::error!("'{}' could not assemble results: {}", self.name, error),
        }
    }

    /// All work for `process` is done: satisfy controlled conditions for the
    /// enclosing process.
    fn invocation_finished(&self, process: &ProcessId, context: &InvocationContext) {
        let enclosing = process.enclosing();
        let (controlled, preconditions) = {
            let structure = self.structure.read();
            (structure.controlled.clone(), structure.preconditions.clone())
        };
        for condition in preconditions {
            condition.forget(&enclosing);
        }
        for condition in controlled {
            if condition.satisfy(&enclosing) {
                context.events().emit(ExecutionEvent::ConditionSatisfied {
                    execution_id: context.execution_id(),
                    control: condition.control_name().to_string(),
                    target: condition.target_name().to_string(),
                    process: enclosing.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        tracing::debug!("'{}' finished invocation {}", self.name, process);
    }

    // Structural mutation, reached only through edits.

    fn invalidate(structure: &mut Structure) {
        structure.wrapping_depth = None;
    }

    pub(crate) fn insert_input_port(&self, spec: PortSpec) -> Result<Arc<InputPort>, EditError> {
        let mut structure = self.structure.write();
        if structure.inputs.iter().any(|p| p.name() == spec.name) {
            return Err(EditError::DuplicatePort {
                processor: self.name.to_string(),
                port: spec.name,
            });
        }
        let handler: Weak<dyn TokenHandler> = self.me.clone();
        let port = InputPort::new(spec, handler);
        structure.inputs.push(port.clone());
        Self::invalidate(&mut structure);
        Ok(port)
    }

    pub(crate) fn insert_output_port(&self, spec: PortSpec) -> Result<Arc<OutputPort>, EditError> {
        let mut structure = self.structure.write();
        if structure.outputs.iter().any(|p| p.name() == spec.name) {
            return Err(EditError::DuplicatePort {
                processor: self.name.to_string(),
                port: spec.name,
            });
        }
        let port = OutputPort::new(spec);
        structure.outputs.push(port.clone());
        Self::invalidate(&mut structure);
        Ok(port)
    }

    pub(crate) fn take_input_port(&self, name: &str) -> Result<(usize, Arc<InputPort>), EditError> {
        let mut structure = self.structure.write();
        let position = structure
            .inputs
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| EditError::PortNotFound {
                processor: self.name.to_string(),
                port: name.to_string(),
            })?;
        if structure.inputs[position].incoming_link().is_some() {
            return Err(EditError::PortInUse(name.to_string()));
        }
        let port = structure.inputs.remove(position);
        Self::invalidate(&mut structure);
        Ok((position, port))
    }

    pub(crate) fn take_output_port(&self, name: &str) -> Result<(usize, Arc<OutputPort>), EditError> {
        let mut structure = self.structure.write();
        let position = structure
            .outputs
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| EditError::PortNotFound {
                processor: self.name.to_string(),
                port: name.to_string(),
            })?;
        if structure.outputs[position].is_connected() {
            return Err(EditError::PortInUse(name.to_string()));
        }
        let port = structure.outputs.remove(position);
        Self::invalidate(&mut structure);
        Ok((position, port))
    }

    pub(crate) fn restore_input_port(
        &self,
        position: usize,
        port: Arc<InputPort>,
    ) -> Result<(), EditError> {
        let mut structure = self.structure.write();
        if structure.inputs.iter().any(|p| p.name() == port.name()) {
            return Err(EditError::DuplicatePort {
                processor: self.name.to_string(),
                port: port.name().to_string(),
            });
        }
        let position = position.min(structure.inputs.len());
        structure.inputs.insert(position, port);
        Self::invalidate(&mut structure);
        Ok(())
    }

    pub(crate) fn restore_output_port(
        &self,
        position: usize,
        port: Arc<OutputPort>,
    ) -> Result<(), EditError> {
        let mut structure = self.structure.write();
        if structure.outputs.iter().any(|p| p.name() == port.name()) {
            return Err(EditError::DuplicatePort {
                processor: self.name.to_string(),
                port: port.name().to_string(),
            });
        }
        let position = position.min(structure.outputs.len());
        structure.outputs.insert(position, port);
        Self::invalidate(&mut structure);
        Ok(())
    }

    pub(crate) fn push_activity(&self, activity: Arc<dyn Activity>) {
        self.structure.write().activities.push(activity);
    }

    pub(crate) fn remove_activity(&self, activity: &Arc<dyn Activity>) -> bool {
        let mut structure = self.structure.write();
        match structure
            .activities
            .iter()
            .rposition(|candidate| Arc::ptr_eq(candidate, activity))
        {
            Some(position) => {
                structure.activities.remove(position);
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_iteration(&self, stack: IterationStrategyStack) -> IterationStrategyStack {
        let mut structure = self.structure.write();
        Self::invalidate(&mut structure);
        std::mem::replace(&mut structure.iteration, stack)
    }

    pub(crate) fn replace_dispatch(&self, stack: DispatchStack) -> DispatchStack {
        std::mem::replace(&mut self.structure.write().dispatch, stack)
    }

    pub(crate) fn add_precondition(&self, condition: Arc<Condition>) {
        self.structure.write().preconditions.push(condition);
    }

    pub(crate) fn add_controlled(&self, condition: Arc<Condition>) {
        self.structure.write().controlled.push(condition);
    }

    pub(crate) fn remove_precondition(&self, condition: &Arc<Condition>) -> bool {
        let mut structure = self.structure.write();
        let before = structure.preconditions.len();
        structure.preconditions.retain(|c| !Arc::ptr_eq(c, condition));
        before != structure.preconditions.len()
    }

    pub(crate) fn remove_controlled(&self, condition: &Arc<Condition>) -> bool {
        let mut structure = self.structure.write();
        let before = structure.controlled.len();
        structure.controlled.retain(|c| !Arc::ptr_eq(c, condition));
        before != structure.controlled.len()
    }

    pub(crate) fn has_precondition_from(&self, control: &Processor) -> bool {
        self.structure
            .read()
            .preconditions
            .iter()
            .any(|c| c.links(control, self))
    }
}

impl TokenHandler for Processor {
    fn handle_token(&self, port: &str, token: Token) {
        if !self.is_type_checked() {
            tracing::error!(
                "'{}' received a token on '{}' after a structural change, dropping it: {}",
                self.name,
                port,
                TypeCheckError::NotReady(self.name.to_string())
            );
            return;
        }
        let mut firing = self.firing.lock();
        let Some(engine) = firing.engine.as_mut() else {
            tracing::error!(
                "'{}' received a token on '{}' before type check, dropping it",
                self.name,
                port
            );
            return;
        };
        match engine.receive(port, token) {
            Ok(events) => self.submit(&mut firing, events),
            Err(error) => tracing::error!(
                "'{}' could not iterate over input '{}': {}",
                self.name,
                port,
                error
            ),
        }
    }
}

fn emit(outputs: &[Arc<OutputPort>], tokens: Vec<PortToken>) {
    for PortToken { port, token } in tokens {
        if let Some(output) = outputs.iter().find(|p| p.name() == port) {
            output.send(token);
        }
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let structure = self.structure.read();
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field(
                "inputs",
                &structure.inputs.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field(
                "outputs",
                &structure.outputs.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("activities", &structure.activities.len())
            .field("dispatch", &structure.dispatch)
            .field("wrapping_depth", &structure.wrapping_depth)
            .finish()
    }
}

/// Assembles a processor through a single compound edit.
pub struct ProcessorBuilder {
    name: String,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
    activities: Vec<Arc<dyn Activity>>,
    iteration: Option<IterationStrategyStack>,
    dispatch: Option<DispatchStack>,
}

impl ProcessorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            activities: Vec::new(),
            iteration: None,
            dispatch: None,
        }
    }

    pub fn input(mut self, name: impl Into<String>, depth: usize) -> Self {
        self.inputs.push(PortSpec::input(name, depth));
        self
    }

    pub fn output(mut self, name: impl Into<String>, depth: usize) -> Self {
        self.outputs.push(PortSpec::output(name, depth));
        self
    }

    pub fn port(mut self, spec: PortSpec) -> Self {
        match spec.direction {
            flowcore::PortDirection::Input => self.inputs.push(spec),
            flowcore::PortDirection::Output => self.outputs.push(spec),
        }
        self
    }

    pub fn activity(mut self, activity: Arc<dyn Activity>) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn iteration(mut self, stack: IterationStrategyStack) -> Self {
        self.iteration = Some(stack);
        self
    }

    pub fn dispatch(mut self, stack: DispatchStack) -> Self {
        self.dispatch = Some(stack);
        self
    }

    pub fn dispatch_config(self, config: &DispatchConfig) -> Self {
        self.dispatch(DispatchStack::from_config(config))
    }

    pub fn build(self) -> Result<Arc<Processor>, EditError> {
        let processor = Processor::new(self.name);
        let mut edit = CompoundEdit::new();
        for spec in self.inputs {
            edit.push(AddInputPort::new(processor.clone(), spec));
        }
        for spec in self.outputs {
            edit.push(AddOutputPort::new(processor.clone(), spec));
        }
        for activity in self.activities {
            edit.push(AddActivity::new(processor.clone(), activity));
        }
        if let Some(stack) = self.iteration {
            edit.push(SetIterationStrategy::new(processor.clone(), stack));
        }
        if let Some(stack) = self.dispatch {
            edit.push(SetDispatchStack::new(processor.clone(), stack));
        }
        edit.apply()?;
        Ok(processor)
    }
}
