//! A graph of processors with named inputs and outputs.

use crate::condition::Condition;
use crate::datalink::Datalink;
use crate::edits::{Connect, CreateCondition, Edit};
use crate::names::NameAllocator;
use crate::port::{InputPort, OutputPort, TokenHandler};
use crate::processor::Processor;
use dashmap::DashMap;
use flowcore::{EditError, PortSpec, ProcessId, Reference, Token, TypeCheckError};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// Collects the tokens arriving at one dataflow output.
pub struct DataflowOutput {
    port: Arc<InputPort>,
    received: DashMap<ProcessId, Vec<Token>>,
    arrived: Notify,
}

impl DataflowOutput {
    fn new(spec: PortSpec) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<DataflowOutput>| {
            let handler: Weak<dyn TokenHandler> = me.clone();
            Self {
                port: InputPort::new(spec, handler),
                received: DashMap::new(),
                arrived: Notify::new(),
            }
        })
    }

    pub fn name(&self) -> &str {
        self.port.name()
    }

    pub fn port(&self) -> &Arc<InputPort> {
        &self.port
    }

    /// Every token seen for `process`, in arrival order.
    pub fn tokens(&self, process: &ProcessId) -> Vec<Token> {
        self.received
            .get(process)
            .map(|tokens| tokens.clone())
            .unwrap_or_default()
    }

    /// The whole value for `process`, once its top-level token arrived.
    pub fn result(&self, process: &ProcessId) -> Option<Reference> {
        self.received.get(process).and_then(|tokens| {
            tokens
                .iter()
                .find(|token| token.index.is_empty())
                .map(|token| token.data.clone())
        })
    }

    pub async fn wait(&self, process: &ProcessId) -> Reference {
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(reference) = self.result(process) {
                return reference;
            }
            notified.await;
        }
    }

    pub fn clear(&self, process: &ProcessId) {
        self.received.remove(process);
    }
}

impl TokenHandler for DataflowOutput {
    fn handle_token(&self, _port: &str, token: Token) {
        let complete = token.index.is_empty();
        tracing::debug!(
            "Output '{}' received {:?} in {}",
            self.port.name(),
            token.index,
            token.owning_process
        );
        self.received
            .entry(token.owning_process.clone())
            .or_default()
            .push(token);
        if complete {
            self.arrived.notify_waiters();
        }
    }
}

impl fmt::Debug for DataflowOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataflowOutput")
            .field("name", &self.port.name())
            .field("processes", &self.received.len())
            .finish()
    }
}

/// Processors, their links and conditions, plus the dataflow's own inputs
/// and outputs. Inputs act as link sources of a fixed depth, outputs as
/// link sinks.
pub struct Dataflow {
    name: String,
    names: NameAllocator,
    processors: Vec<Arc<Processor>>,
    inputs: Vec<Arc<OutputPort>>,
    outputs: Vec<Arc<DataflowOutput>>,
}

impl Dataflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            names: NameAllocator::new(),
            processors: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A processor name not yet used in this dataflow.
    pub fn unique_name(&mut self, base: &str) -> String {
        self.names.allocate(base)
    }

    pub fn add_processor(&mut self, processor: Arc<Processor>) -> Result<Arc<Processor>, EditError> {
        if self.processor(processor.name()).is_some() {
            return Err(EditError::DuplicateProcessor(processor.name().to_string()));
        }
        self.names.reserve(processor.name());
        tracing::debug!("Added processor '{}' to '{}'", processor.name(), self.name);
        self.processors.push(processor.clone());
        Ok(processor)
    }

    /// Detach a processor. It must have no links and no conditions left.
    pub fn remove_processor(&mut self, name: &str) -> Result<Arc<Processor>, EditError> {
        let position = self
            .processors
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| EditError::ProcessorNotFound(name.to_string()))?;
        let processor = &self.processors[position];
        let linked = processor.input_ports().iter().any(|p| p.incoming_link().is_some())
            || processor.output_ports().iter().any(|p| p.is_connected())
            || !processor.preconditions().is_empty()
            || !processor.controlled_conditions().is_empty();
        if linked {
            return Err(EditError::PortInUse(name.to_string()));
        }
        self.names.release(name);
        Ok(self.processors.remove(position))
    }

    pub fn processor(&self, name: &str) -> Option<Arc<Processor>> {
        self.processors.iter().find(|p| p.name() == name).cloned()
    }

    pub fn processors(&self) -> &[Arc<Processor>] {
        &self.processors
    }

    pub fn add_input(&mut self, name: impl Into<String>, depth: usize) -> Result<Arc<OutputPort>, EditError> {
        let name = name.into();
        if self.input(&name).is_some() {
            return Err(EditError::DuplicatePort {
                processor: self.name.clone(),
                port: name,
            });
        }
        let port = OutputPort::with_resolved_depth(PortSpec::output(name, depth));
        self.inputs.push(port.clone());
        Ok(port)
    }

    pub fn add_output(&mut self, name: impl Into<String>) -> Result<Arc<DataflowOutput>, EditError> {
        let name = name.into();
        if self.output(&name).is_some() {
            return Err(EditError::DuplicatePort {
                processor: self.name.clone(),
                port: name,
            });
        }
        let output = DataflowOutput::new(PortSpec::input(name, 0));
        self.outputs.push(output.clone());
        Ok(output)
    }

    pub fn input(&self, name: &str) -> Option<Arc<OutputPort>> {
        self.inputs.iter().find(|p| p.name() == name).cloned()
    }

    pub fn inputs(&self) -> &[Arc<OutputPort>] {
        &self.inputs
    }

    pub fn output(&self, name: &str) -> Option<Arc<DataflowOutput>> {
        self.outputs.iter().find(|o| o.name() == name).cloned()
    }

    pub fn outputs(&self) -> &[Arc<DataflowOutput>] {
        &self.outputs
    }

    fn port_not_found(processor: &str, port: &str) -> EditError {
        EditError::PortNotFound {
            processor: processor.to_string(),
            port: port.to_string(),
        }
    }

    fn named(&self, processor: &str) -> Result<Arc<Processor>, EditError> {
        self.processor(processor)
            .ok_or_else(|| EditError::ProcessorNotFound(processor.to_string()))
    }

    pub fn connect(
        &self,
        source: &Arc<OutputPort>,
        sink: &Arc<InputPort>,
    ) -> Result<Arc<Datalink>, EditError> {
        let mut edit = Connect::new(source.clone(), sink.clone());
        edit.apply()?;
        edit.link().ok_or(EditError::NotApplied)
    }

    /// Link `from.port` to `to.port`.
    pub fn link(
        &self,
        from: &str,
        from_port: &str,
        to: &str,
        to_port: &str,
    ) -> Result<Arc<Datalink>, EditError> {
        let source = self
            .named(from)?
            .output_port(from_port)
            .ok_or_else(|| Self::port_not_found(from, from_port))?;
        let sink = self
            .named(to)?
            .input_port(to_port)
            .ok_or_else(|| Self::port_not_found(to, to_port))?;
        self.connect(&source, &sink)
    }

    /// Feed dataflow input `input` into `to.port`.
    pub fn link_input(&self, input: &str, to: &str, to_port: &str) -> Result<Arc<Datalink>, EditError> {
        let source = self
            .input(input)
            .ok_or_else(|| Self::port_not_found(&self.name, input))?;
        let sink = self
            .named(to)?
            .input_port(to_port)
            .ok_or_else(|| Self::port_not_found(to, to_port))?;
        self.connect(&source, &sink)
    }

    /// Collect `from.port` at dataflow output `output`.
    pub fn link_output(&self, from: &str, from_port: &str, output: &str) -> Result<Arc<Datalink>, EditError> {
        let source = self
            .named(from)?
            .output_port(from_port)
            .ok_or_else(|| Self::port_not_found(from, from_port))?;
        let sink = self
            .output(output)
            .ok_or_else(|| Self::port_not_found(&self.name, output))?;
        self.connect(&source, sink.port())
    }

    /// `target` waits, per owning process, until `control` has finished.
    pub fn add_condition(&self, control: &str, target: &str) -> Result<Arc<Condition>, EditError> {
        let mut edit = CreateCondition::new(self.named(control)?, self.named(target)?);
        edit.apply()?;
        edit.condition().ok_or(EditError::NotApplied)
    }

    pub fn conditions(&self) -> Vec<Arc<Condition>> {
        self.processors
            .iter()
            .flat_map(|p| p.preconditions())
            .collect()
    }

    /// Type check every processor in dependency order.
    ///
    /// `Ok(false)` means some processor or output is not linked up yet.
    pub fn type_check(&self) -> Result<bool, TypeCheckError> {
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.processors.len()).map(|i| graph.add_node(i)).collect();

        let mut owner_of_input: HashMap<*const InputPort, usize> = HashMap::new();
        for (i, processor) in self.processors.iter().enumerate() {
            for port in processor.input_ports() {
                owner_of_input.insert(Arc::as_ptr(&port), i);
            }
        }
        for (i, processor) in self.processors.iter().enumerate() {
            for port in processor.output_ports() {
                for link in port.links() {
                    if let Some(&j) = owner_of_input.get(&Arc::as_ptr(link.sink())) {
                        graph.add_edge(nodes[i], nodes[j], ());
                    }
                }
            }
            for condition in processor.preconditions() {
                let control = condition
                    .control()
                    .and_then(|c| self.processors.iter().position(|p| Arc::ptr_eq(p, &c)));
                if let Some(j) = control {
                    graph.add_edge(nodes[j], nodes[i], ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let at = graph[cycle.node_id()];
            tracing::error!(
                "Dataflow '{}' has a cycle through '{}'",
                self.name,
                self.processors[at].name()
            );
            TypeCheckError::CyclicDependency
        })?;

        let mut ready = true;
        for node in order {
            let processor = &self.processors[graph[node]];
            if !processor.type_check()? {
                ready = false;
            }
        }
        for output in &self.outputs {
            if output.port().resolved_depth().is_none() {
                tracing::debug!("Output '{}' of '{}' is not linked", output.name(), self.name);
                ready = false;
            }
        }
        Ok(ready)
    }
}

impl fmt::Debug for Dataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataflow")
            .field("name", &self.name)
            .field("processors", &self.processors)
            .field(
                "inputs",
                &self.inputs.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("outputs", &self.outputs)
            .finish()
    }
}
