//! Rebuilds output tokens, collection structure included, from the results
//! coming back out of the dispatch stack.

use flowcore::{
    is_prefix, Completion, Index, InvocationContext, IterationEvent, Job, PortSpec, ProcessId,
    Reference, ReferenceError, Token,
};
use std::collections::{BTreeMap, HashMap};

/// Output of the crystallizer: a token for one named output port.
#[derive(Debug, Clone)]
pub struct PortToken {
    pub port: String,
    pub token: Token,
}

/// Inverse of the iteration engine for one processor.
///
/// Results arrive as jobs at full-length indices. Each completion closes
/// the list at its index: the children already collected are assembled
/// into one list reference per output port, as long as the source
/// collection was, and emitted as a job at the shorter index. Positions
/// whose job never produced a result hold error references. Only a source
/// collection of size zero turns into empty lists of the right depth. Completions are always consumed here, so none ever
/// leaves the processor as a raw event.
pub struct Crystallizer {
    processor: String,
    outputs: Vec<PortSpec>,
    wrapping_depth: usize,
    results: HashMap<ProcessId, BTreeMap<Index, HashMap<String, Reference>>>,
}

impl Crystallizer {
    pub fn new(processor: impl Into<String>, outputs: Vec<PortSpec>, wrapping_depth: usize) -> Self {
        Self {
            processor: processor.into(),
            outputs,
            wrapping_depth,
            results: HashMap::new(),
        }
    }

    pub fn wrapping_depth(&self) -> usize {
        self.wrapping_depth
    }

    /// Invocations with results still waiting for their enclosing list.
    pub fn pending_processes(&self) -> usize {
        self.results.len()
    }

    pub fn receive(&mut self, event: IterationEvent) -> Result<Vec<PortToken>, ReferenceError> {
        match event {
            IterationEvent::Job(job) => {
                if job.index.is_empty() {
                    self.results.remove(&job.owning_process);
                } else {
                    self.results
                        .entry(job.owning_process.clone())
                        .or_default()
                        .insert(job.index.clone(), job.data.clone());
                }
                Ok(self.job_created(&job))
            }
            IterationEvent::Completion(completion) => self.close(completion),
        }
    }

    /// One token per output port at the job's coordinate, in the enclosing
    /// process.
    pub fn job_created(&self, job: &Job) -> Vec<PortToken> {
        let process = job.owning_process.enclosing();
        self.outputs
            .iter()
            .filter_map(|port| {
                let data = job.data.get(&port.name)?;
                Some(PortToken {
                    port: port.name.clone(),
                    token: Token::new(
                        process.clone(),
                        job.index.clone(),
                        data.clone(),
                        job.context.clone(),
                    ),
                })
            })
            .collect()
    }

    /// A job whose every output is an empty list, for a collection that
    /// turned out to have nothing in it.
    pub fn get_empty_job(
        &self,
        owning_process: &ProcessId,
        index: Index,
        context: &InvocationContext,
    ) -> Result<Job, ReferenceError> {
        let depth = self.wrapping_depth.saturating_sub(index.len());
        let refs = context.references();
        let mut data = HashMap::with_capacity(self.outputs.len());
        for port in &self.outputs {
            data.insert(port.name.clone(), refs.register_empty_list(depth + port.depth)?);
        }
        Ok(Job::new(owning_process.clone(), index, data, context.clone()))
    }

    fn close(&mut self, completion: Completion) -> Result<Vec<PortToken>, ReferenceError> {
        let Completion {
            owning_process,
            index,
            size,
            context,
        } = completion;
        let collected = self.results.entry(owning_process.clone()).or_default();
        let below: Vec<Index> = collected
            .range(index.clone()..)
            .take_while(|(key, _)| is_prefix(&index, key))
            .map(|(key, _)| key.clone())
            .collect();
        let mut children: BTreeMap<usize, HashMap<String, Reference>> = BTreeMap::new();
        for key in below {
            if let Some(data) = collected.remove(&key) {
                if key.len() == index.len() + 1 {
                    children.insert(key[index.len()], data);
                }
            }
        }

        let job = if size == 0 {
            tracing::debug!(
                "Empty collection at {:?} for '{}' in {}",
                index,
                self.processor,
                owning_process
            );
            self.get_empty_job(&owning_process, index.clone(), &context)?
        } else {
            if children.len() < size {
                tracing::warn!(
                    "'{}' closing {:?} in {} with {} of {} results",
                    self.processor,
                    index,
                    owning_process,
                    children.len(),
                    size
                );
            }
            self.assemble(&owning_process, index.clone(), &context, size, children)?
        };

        if index.is_empty() {
            self.results.remove(&owning_process);
        } else if let Some(collected) = self.results.get_mut(&owning_process) {
            collected.insert(index, job.data.clone());
        }
        Ok(self.job_created(&job))
    }

    fn assemble(
        &self,
        owning_process: &ProcessId,
        index: Index,
        context: &InvocationContext,
        len: usize,
        children: BTreeMap<usize, HashMap<String, Reference>>,
    ) -> Result<Job, ReferenceError> {
        let refs = context.references();
        let list_depth = self.wrapping_depth.saturating_sub(index.len());
        let mut data = HashMap::with_capacity(self.outputs.len());
        for port in &self.outputs {
            let depth = list_depth + port.depth;
            let mut items = Vec::with_capacity(len);
            for position in 0..len {
                let item = children
                    .get(&position)
                    .and_then(|child| child.get(&port.name))
                    .cloned();
                items.push(match item {
                    Some(item) => item,
                    None => refs.register_error(
                        depth.saturating_sub(1),
                        format!(
                            "no result from '{}' for port '{}' at position {} of {:?}",
                            self.processor, port.name, position, index
                        ),
                    ),
                });
            }
            data.insert(port.name.clone(), refs.register_list(items, depth)?);
        }
        Ok(Job::new(owning_process.clone(), index, data, context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{
        render, EventEmitter, InMemoryReferenceService, ReferenceService, Value,
    };
    use std::sync::Arc;
    use uuid::Uuid;

    fn context() -> InvocationContext {
        let id = Uuid::new_v4();
        InvocationContext::new(
            id,
            Arc::new(InMemoryReferenceService::new()),
            EventEmitter::detached(id),
        )
    }

    fn result(ctx: &InvocationContext, process: &ProcessId, index: Index, value: f64) -> Job {
        let mut data = HashMap::new();
        data.insert(
            "out".to_string(),
            ctx.references().register_value(Value::Number(value)),
        );
        Job::new(process.clone(), index, data, ctx.clone())
    }

    #[test]
    fn empty_job_depth_accounts_for_index_and_port() {
        let ctx = context();
        let crystallizer = Crystallizer::new("p", vec![PortSpec::output("out", 1)], 2);
        let process = ProcessId::new("run").child("p");

        let job = crystallizer.get_empty_job(&process, vec![3], &ctx).unwrap();

        let reference = &job.data["out"];
        assert_eq!(reference.depth(), 2);
        assert_eq!(render(ctx.references(), reference).unwrap(), Value::Array(vec![]));
        assert_eq!(job.index, vec![3]);
    }

    #[test]
    fn results_are_emitted_in_enclosing_process() {
        let ctx = context();
        let mut crystallizer = Crystallizer::new("p", vec![PortSpec::output("out", 0)], 1);
        let process = ProcessId::new("run").child("p");

        let tokens = crystallizer
            .receive(IterationEvent::Job(result(&ctx, &process, vec![0], 1.0)))
            .unwrap();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].port, "out");
        assert_eq!(tokens[0].token.owning_process, ProcessId::new("run"));
        assert_eq!(tokens[0].token.index, vec![0]);
    }

    #[test]
    fn completion_assembles_list_and_fills_gaps() {
        let ctx = context();
        let mut crystallizer = Crystallizer::new("p", vec![PortSpec::output("out", 0)], 1);
        let process = ProcessId::new("run").child("p");
        crystallizer
            .receive(IterationEvent::Job(result(&ctx, &process, vec![2], 3.0)))
            .unwrap();
        crystallizer
            .receive(IterationEvent::Job(result(&ctx, &process, vec![0], 1.0)))
            .unwrap();

        let tokens = crystallizer
            .receive(IterationEvent::Completion(Completion::new(
                process.clone(),
                vec![],
                3,
                ctx.clone(),
            )))
            .unwrap();

        assert_eq!(tokens.len(), 1);
        let value = render(ctx.references(), &tokens[0].token.data).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Value::Number(1.0));
        assert!(items[1].is_error());
        assert_eq!(items[2], Value::Number(3.0));
        assert_eq!(crystallizer.pending_processes(), 0);
    }

    #[test]
    fn missing_trailing_results_become_errors() {
        let ctx = context();
        let mut crystallizer = Crystallizer::new("p", vec![PortSpec::output("out", 0)], 1);
        let process = ProcessId::new("run").child("p");
        crystallizer
            .receive(IterationEvent::Job(result(&ctx, &process, vec![0], 2.0)))
            .unwrap();

        let tokens = crystallizer
            .receive(IterationEvent::Completion(Completion::new(
                process.clone(),
                vec![],
                3,
                ctx.clone(),
            )))
            .unwrap();

        let value = render(ctx.references(), &tokens[0].token.data).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Value::Number(2.0));
        assert!(items[1].is_error());
        assert!(items[2].is_error());
    }

    #[test]
    fn all_results_missing_is_not_an_empty_list() {
        let ctx = context();
        let mut crystallizer = Crystallizer::new("p", vec![PortSpec::output("out", 0)], 1);
        let process = ProcessId::new("run").child("p");

        let tokens = crystallizer
            .receive(IterationEvent::Completion(Completion::new(
                process.clone(),
                vec![],
                2,
                ctx.clone(),
            )))
            .unwrap();

        let value = render(ctx.references(), &tokens[0].token.data).unwrap();
        assert_eq!(value.as_array().map(|items| items.len()), Some(2));
        assert!(value.is_error());

        let empty = crystallizer
            .receive(IterationEvent::Completion(Completion::new(
                process.clone(),
                vec![],
                0,
                ctx.clone(),
            )))
            .unwrap();
        let value = render(ctx.references(), &empty[0].token.data).unwrap();
        assert_eq!(value, Value::Array(vec![]));
    }
}
