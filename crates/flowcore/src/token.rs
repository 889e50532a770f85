//! Events carried along data links and through the dispatch stack.

use crate::{InvocationContext, Reference};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Position of an item inside the collections iterated so far, one entry per
/// nesting level.
pub type Index = Vec<usize>;

/// True when `prefix` is a (non-strict) prefix of `index`.
pub fn is_prefix(prefix: &[usize], index: &[usize]) -> bool {
    index.len() >= prefix.len() && index[..prefix.len()] == *prefix
}

/// Hierarchical identity of one dynamic invocation.
///
/// Each nested firing appends a segment, so the same static processor can
/// have many live invocations that never share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(Vec<String>);

impl ProcessId {
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains(':')) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// The enclosing invocation, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Parent if there is one, otherwise the id itself.
    pub fn enclosing(&self) -> Self {
        self.parent().unwrap_or_else(|| self.clone())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn last_segment(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

impl FromStr for ProcessId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segments(s.split(':'))
            .ok_or_else(|| format!("invalid process id '{}'", s))
    }
}

/// A single data item travelling along a link.
#[derive(Clone)]
pub struct Token {
    pub owning_process: ProcessId,
    pub index: Index,
    pub data: Reference,
    pub context: InvocationContext,
}

impl Token {
    pub fn new(
        owning_process: ProcessId,
        index: Index,
        data: Reference,
        context: InvocationContext,
    ) -> Self {
        Self {
            owning_process,
            index,
            data,
            context,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("owning_process", &self.owning_process.to_string())
            .field("index", &self.index)
            .field("data", &self.data)
            .finish()
    }
}

/// The full set of port references for one invocation at one coordinate.
#[derive(Clone)]
pub struct Job {
    pub owning_process: ProcessId,
    pub index: Index,
    pub data: HashMap<String, Reference>,
    pub context: InvocationContext,
}

impl Job {
    pub fn new(
        owning_process: ProcessId,
        index: Index,
        data: HashMap<String, Reference>,
        context: InvocationContext,
    ) -> Self {
        Self {
            owning_process,
            index,
            data,
            context,
        }
    }

    /// Same coordinate, different data.
    pub fn with_data(&self, data: HashMap<String, Reference>) -> Self {
        Self {
            owning_process: self.owning_process.clone(),
            index: self.index.clone(),
            data,
            context: self.context.clone(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.data.values().any(Reference::contains_errors)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("owning_process", &self.owning_process.to_string())
            .field("index", &self.index)
            .field("data", &self.data)
            .finish()
    }
}

/// No more jobs will arrive below `index` for `owning_process`.
///
/// The depth closed by a completion is implied by the processor's result
/// wrapping depth minus `index.len()`. `size` is the number of entries the
/// source collection had at `index`, whether or not their jobs succeeded.
#[derive(Clone)]
pub struct Completion {
    pub owning_process: ProcessId,
    pub index: Index,
    pub size: usize,
    pub context: InvocationContext,
}

impl Completion {
    pub fn new(
        owning_process: ProcessId,
        index: Index,
        size: usize,
        context: InvocationContext,
    ) -> Self {
        Self {
            owning_process,
            index,
            size,
            context,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("owning_process", &self.owning_process.to_string())
            .field("index", &self.index)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum IterationEvent {
    Job(Job),
    Completion(Completion),
}

impl IterationEvent {
    pub fn owning_process(&self) -> &ProcessId {
        match self {
            IterationEvent::Job(job) => &job.owning_process,
            IterationEvent::Completion(completion) => &completion.owning_process,
        }
    }

    pub fn index(&self) -> &[usize] {
        match self {
            IterationEvent::Job(job) => &job.index,
            IterationEvent::Completion(completion) => &completion.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_ids_nest_and_unnest() {
        let run = ProcessId::new("wf").child("run1");
        let job = run.child("Sum");
        assert_eq!(job.to_string(), "wf:run1:Sum");
        assert_eq!(job.parent(), Some(run.clone()));
        assert_eq!(job.last_segment(), "Sum");
        assert_eq!(ProcessId::new("wf").parent(), None);
        assert_eq!("wf:run1:Sum".parse::<ProcessId>().unwrap(), job);
    }

    #[test]
    fn malformed_process_ids_are_rejected() {
        assert!("wf::x".parse::<ProcessId>().is_err());
        assert!("".parse::<ProcessId>().is_err());
        assert!(ProcessId::from_segments(Vec::<String>::new()).is_none());
    }

    #[test]
    fn prefix_matching() {
        assert!(is_prefix(&[], &[1, 2]));
        assert!(is_prefix(&[1], &[1, 2]));
        assert!(is_prefix(&[1, 2], &[1, 2]));
        assert!(!is_prefix(&[2], &[1, 2]));
        assert!(!is_prefix(&[1, 2, 3], &[1, 2]));
    }
}
