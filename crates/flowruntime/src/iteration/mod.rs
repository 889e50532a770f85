//! Iteration strategies: how a processor's input streams combine into jobs.
//!
//! A strategy is a tree over input port names. Cross nodes take every
//! combination of their children's items and concatenate indices; dot nodes
//! pair items that share an index. Ports a strategy does not mention are
//! crossed in at the top level.

mod engine;
mod shape;

pub(crate) use engine::IterationEngine;
pub use shape::Shape;

use flowcore::TypeCheckError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "lowercase")]
pub enum IterationNode {
    Port(String),
    Cross(Vec<IterationNode>),
    Dot(Vec<IterationNode>),
}

impl IterationNode {
    pub fn port(name: impl Into<String>) -> Self {
        IterationNode::Port(name.into())
    }

    fn collect_ports<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            IterationNode::Port(name) => out.push(name),
            IterationNode::Cross(children) | IterationNode::Dot(children) => {
                for child in children {
                    child.collect_ports(out);
                }
            }
        }
    }

    pub fn port_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_ports(&mut out);
        out
    }

    /// Number of index levels this subtree adds to a job.
    pub fn depth(
        &self,
        processor: &str,
        ports: &BTreeMap<String, PortDepth>,
    ) -> Result<usize, TypeCheckError> {
        match self {
            IterationNode::Port(name) => ports
                .get(name)
                .map(PortDepth::iteration_depth)
                .ok_or_else(|| TypeCheckError::UnknownPort {
                    processor: processor.to_string(),
                    port: name.clone(),
                }),
            IterationNode::Cross(children) => children
                .iter()
                .map(|child| child.depth(processor, ports))
                .sum(),
            IterationNode::Dot(children) => {
                let depths = children
                    .iter()
                    .map(|child| child.depth(processor, ports))
                    .collect::<Result<Vec<_>, _>>()?;
                match depths.split_first() {
                    None => Ok(0),
                    Some((first, rest)) if rest.iter().all(|d| d == first) => Ok(*first),
                    Some(_) => Err(TypeCheckError::IterationMismatch {
                        processor: processor.to_string(),
                        reason: format!(
                            "dot product over {:?} needs equal iteration depths, got {:?}",
                            self.port_names(),
                            depths
                        ),
                    }),
                }
            }
        }
    }
}

/// Declared depth of an input port against the depth its link delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDepth {
    pub declared: usize,
    pub resolved: usize,
}

impl PortDepth {
    pub fn new(declared: usize, resolved: usize) -> Self {
        Self { declared, resolved }
    }

    /// Levels iterated over at this port. Shallower data is wrapped, so
    /// this never goes negative.
    pub fn iteration_depth(&self) -> usize {
        self.resolved.saturating_sub(self.declared)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStrategy {
    root: IterationNode,
}

impl IterationStrategy {
    pub fn new(root: IterationNode) -> Self {
        Self { root }
    }

    pub fn cross<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(IterationNode::Cross(
            ports.into_iter().map(IterationNode::port).collect(),
        ))
    }

    pub fn dot<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(IterationNode::Dot(
            ports.into_iter().map(IterationNode::port).collect(),
        ))
    }

    pub fn root(&self) -> &IterationNode {
        &self.root
    }

    /// Usable for a processor with `ports` if it only names existing ports,
    /// each at most once.
    fn applies_to(&self, ports: &[&str]) -> bool {
        let mut seen = HashSet::new();
        self.root
            .port_names()
            .into_iter()
            .all(|name| ports.contains(&name) && seen.insert(name))
    }
}

/// Ordered strategies; the first one that applies to the processor's
/// current ports wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationStrategyStack {
    strategies: Vec<IterationStrategy>,
}

impl IterationStrategyStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: IterationStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategies(&self) -> &[IterationStrategy] {
        &self.strategies
    }

    /// The tree actually used for `ports`: the first applicable strategy,
    /// with unmentioned ports crossed in, or a plain cross of everything.
    pub fn effective(&self, ports: &[&str]) -> IterationNode {
        let Some(strategy) = self.strategies.iter().find(|s| s.applies_to(ports)) else {
            return IterationNode::Cross(ports.iter().map(|p| IterationNode::port(*p)).collect());
        };
        let mentioned = strategy.root.port_names();
        let extra: Vec<IterationNode> = ports
            .iter()
            .filter(|p| !mentioned.contains(*p))
            .map(|p| IterationNode::port(*p))
            .collect();
        if extra.is_empty() {
            return strategy.root.clone();
        }
        match &strategy.root {
            IterationNode::Cross(children) => {
                let mut children = children.clone();
                children.extend(extra);
                IterationNode::Cross(children)
            }
            other => {
                let mut children = vec![other.clone()];
                children.extend(extra);
                IterationNode::Cross(children)
            }
        }
    }

    /// Static depth arithmetic: the length of every job index this
    /// processor will produce for the given input depths.
    pub fn iteration_depth(
        &self,
        processor: &str,
        ports: &BTreeMap<String, PortDepth>,
    ) -> Result<usize, TypeCheckError> {
        let names: Vec<&str> = ports.keys().map(String::as_str).collect();
        self.effective(&names).depth(processor, ports)
    }
}
