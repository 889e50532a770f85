use super::{IterationNode, PortDepth, Shape};
use flowcore::{
    wrap_to_depth, Completion, Index, IterationEvent, Job, ProcessId, Reference, ReferenceError,
    ReferenceService, Resolved, Token,
};
use std::collections::{BTreeMap, HashMap, HashSet};

type Partial = BTreeMap<String, Reference>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combine {
    Cross,
    Dot,
}

#[derive(Debug)]
enum NodeKind {
    Leaf { port: String, depth: PortDepth },
    Combine { combine: Combine, children: Vec<usize> },
}

#[derive(Debug)]
struct CompiledNode {
    kind: NodeKind,
    /// Parent node and this node's slot among the parent's children.
    parent: Option<(usize, usize)>,
}

#[derive(Debug, Default)]
struct LeafState {
    seen: HashSet<Index>,
    /// Known once the whole collection (the token at the empty index) arrived.
    shape: Option<Shape>,
}

#[derive(Debug, Default)]
struct ProcessState {
    leaves: HashMap<usize, LeafState>,
    /// Items received from each child of a combining node.
    stores: HashMap<usize, Vec<BTreeMap<Index, Partial>>>,
}

/// Runtime half of an iteration strategy for one processor.
///
/// Tokens may arrive in any order across ports and indices. Jobs are emitted
/// as soon as every port they need has data; completions follow once every
/// port has seen its whole collection, children before parents.
#[derive(Debug)]
pub(crate) struct IterationEngine {
    processor: String,
    nodes: Vec<CompiledNode>,
    root: usize,
    leaf_of: HashMap<String, usize>,
    processes: HashMap<ProcessId, ProcessState>,
}

impl IterationEngine {
    pub(crate) fn new(
        processor: impl Into<String>,
        root: &IterationNode,
        ports: &BTreeMap<String, PortDepth>,
    ) -> Self {
        let mut engine = Self {
            processor: processor.into(),
            nodes: Vec::new(),
            root: 0,
            leaf_of: HashMap::new(),
            processes: HashMap::new(),
        };
        engine.root = engine.compile(root, ports, None);
        engine
    }

    fn compile(
        &mut self,
        node: &IterationNode,
        ports: &BTreeMap<String, PortDepth>,
        parent: Option<(usize, usize)>,
    ) -> usize {
        let id = self.nodes.len();
        match node {
            IterationNode::Port(name) => {
                let depth = ports.get(name).copied().unwrap_or(PortDepth::new(0, 0));
                self.nodes.push(CompiledNode {
                    kind: NodeKind::Leaf {
                        port: name.clone(),
                        depth,
                    },
                    parent,
                });
                self.leaf_of.insert(name.clone(), id);
            }
            IterationNode::Cross(children) | IterationNode::Dot(children) => {
                let combine = if matches!(node, IterationNode::Cross(_)) {
                    Combine::Cross
                } else {
                    Combine::Dot
                };
                self.nodes.push(CompiledNode {
                    kind: NodeKind::Combine {
                        combine,
                        children: Vec::new(),
                    },
                    parent,
                });
                let child_ids: Vec<usize> = children
                    .iter()
                    .enumerate()
                    .map(|(slot, child)| self.compile(child, ports, Some((id, slot))))
                    .collect();
                if let NodeKind::Combine { children, .. } = &mut self.nodes[id].kind {
                    *children = child_ids;
                }
            }
        }
        id
    }

    /// Invocations with partially received inputs.
    pub(crate) fn pending_processes(&self) -> usize {
        self.processes.len()
    }

    /// New data at `port`. Returns the jobs and completions it unlocks; jobs
    /// belong to the owning process extended by the processor name.
    pub(crate) fn receive(
        &mut self,
        port: &str,
        token: Token,
    ) -> Result<Vec<IterationEvent>, ReferenceError> {
        let Some(&leaf_id) = self.leaf_of.get(port) else {
            tracing::warn!(
                "Processor '{}' has no iterated port '{}', dropping token",
                self.processor,
                port
            );
            return Ok(Vec::new());
        };
        let NodeKind::Leaf { depth, .. } = self.nodes[leaf_id].kind else {
            return Ok(Vec::new());
        };

        let levels = depth.iteration_depth();
        if token.index.len() > levels {
            // Finer than this port iterates; the enclosing token carries it
            tracing::trace!(
                "'{}' skipping token at {:?} on '{}'",
                self.processor,
                token.index,
                port
            );
            return Ok(Vec::new());
        }

        let refs = token.context.references();
        let state = self.processes.entry(token.owning_process.clone()).or_default();
        let leaf = state.leaves.entry(leaf_id).or_default();
        if leaf.shape.is_some() {
            tracing::debug!(
                "Ignoring token at {:?} for '{}': port '{}' already complete for {}",
                token.index,
                self.processor,
                port,
                token.owning_process
            );
            return Ok(Vec::new());
        }

        let expected = levels - token.index.len() + depth.declared;
        let data = wrap_to_depth(refs, token.data.clone(), expected)?;
        let mut items = Vec::new();
        let shape = drill(refs, token.index.clone(), data, levels, depth.declared, &mut items)?;

        let fresh: Vec<(Index, Reference)> = items
            .into_iter()
            .filter(|(index, _)| leaf.seen.insert(index.clone()))
            .collect();
        if token.index.is_empty() {
            leaf.shape = Some(shape);
        }

        let job_process = token.owning_process.child(self.processor.as_str());
        let mut ready = Vec::new();
        for (index, reference) in fresh {
            let mut partial = Partial::new();
            partial.insert(port.to_string(), reference);
            propagate(&self.nodes, &mut state.stores, leaf_id, index, partial, &mut ready);
        }
        let mut events: Vec<IterationEvent> = ready
            .into_iter()
            .map(|(index, data)| {
                IterationEvent::Job(Job::new(
                    job_process.clone(),
                    index,
                    data.into_iter().collect(),
                    token.context.clone(),
                ))
            })
            .collect();

        let leaves: Vec<usize> = self.leaf_of.values().copied().collect();
        let complete = leaves.iter().all(|id| {
            state
                .leaves
                .get(id)
                .map(|leaf| leaf.shape.is_some())
                .unwrap_or(false)
        });
        if complete {
            let shape = combined_shape(&self.nodes, state, self.root);
            for (index, size) in shape.lists_post_order() {
                events.push(IterationEvent::Completion(Completion::new(
                    job_process.clone(),
                    index,
                    size,
                    token.context.clone(),
                )));
            }
            self.processes.remove(&token.owning_process);
            tracing::debug!(
                "Iteration for '{}' in {} complete",
                self.processor,
                token.owning_process
            );
        }
        Ok(events)
    }
}

/// Split `reference` into items at `levels` index positions below the
/// token's own index. Items are exactly `declared` deep; errors found on
/// the way stand in for a single-element list of themselves.
fn drill(
    refs: &dyn ReferenceService,
    index: Index,
    reference: Reference,
    levels: usize,
    declared: usize,
    items: &mut Vec<(Index, Reference)>,
) -> Result<Shape, ReferenceError> {
    if index.len() >= levels {
        let item = if reference.depth() > declared {
            refs.register_error(
                declared,
                format!(
                    "expected data of depth {}, got depth {}",
                    declared,
                    reference.depth()
                ),
            )
        } else {
            wrap_to_depth(refs, reference, declared)?
        };
        items.push((index, item));
        return Ok(Shape::Item);
    }

    let children = match refs.resolve(&reference)? {
        Resolved::List(children) => children,
        Resolved::Error(doc) => {
            vec![refs.register_error(reference.depth().saturating_sub(1), doc.message)]
        }
        Resolved::Value(_) => {
            return Err(ReferenceError::NotAList(reference.depth()));
        }
    };
    let mut shapes = Vec::with_capacity(children.len());
    for (i, child) in children.into_iter().enumerate() {
        let mut child_index = index.clone();
        child_index.push(i);
        shapes.push(drill(refs, child_index, child, levels, declared, items)?);
    }
    Ok(Shape::List(shapes))
}

/// Push a new item up from `node`, combining it with what its siblings
/// already hold. Fully combined items land in `ready`.
fn propagate(
    nodes: &[CompiledNode],
    stores: &mut HashMap<usize, Vec<BTreeMap<Index, Partial>>>,
    node: usize,
    index: Index,
    partial: Partial,
    ready: &mut Vec<(Index, Partial)>,
) {
    let Some((parent, slot)) = nodes[node].parent else {
        ready.push((index, partial));
        return;
    };
    let NodeKind::Combine { combine, children } = &nodes[parent].kind else {
        return;
    };
    let store = stores
        .entry(parent)
        .or_insert_with(|| vec![BTreeMap::new(); children.len()]);
    store[slot].insert(index.clone(), partial.clone());

    let combined: Vec<(Index, Partial)> = match combine {
        Combine::Dot => {
            let mut merged = Partial::new();
            for received in store.iter() {
                match received.get(&index) {
                    Some(part) => merged.extend(part.clone()),
                    None => return,
                }
            }
            vec![(index, merged)]
        }
        Combine::Cross => {
            let mut acc: Vec<(Index, Partial)> = vec![(Index::new(), Partial::new())];
            for (i, received) in store.iter().enumerate() {
                let choices: Vec<(&Index, &Partial)> = if i == slot {
                    vec![(&index, &partial)]
                } else {
                    received.iter().collect()
                };
                if choices.is_empty() {
                    return;
                }
                acc = acc
                    .into_iter()
                    .flat_map(|(prefix, merged)| {
                        choices.iter().map(move |(child_index, part)| {
                            let mut idx = prefix.clone();
                            idx.extend(child_index.iter().copied());
                            let mut data = merged.clone();
                            data.extend((*part).clone());
                            (idx, data)
                        })
                    })
                    .collect();
            }
            acc
        }
    };

    for (index, partial) in combined {
        propagate(nodes, stores, parent, index, partial, ready);
    }
}

fn combined_shape(nodes: &[CompiledNode], state: &ProcessState, node: usize) -> Shape {
    match &nodes[node].kind {
        NodeKind::Leaf { .. } => state
            .leaves
            .get(&node)
            .and_then(|leaf| leaf.shape.clone())
            .unwrap_or(Shape::Item),
        NodeKind::Combine { combine, children } => {
            let mut shapes = children
                .iter()
                .map(|child| combined_shape(nodes, state, *child));
            match combine {
                Combine::Cross => shapes.fold(Shape::Item, |acc, shape| acc.graft(&shape)),
                Combine::Dot => match shapes.next() {
                    Some(first) => shapes.fold(first, |acc, shape| acc.zip(&shape)),
                    None => Shape::Item,
                },
            }
        }
    }
}
