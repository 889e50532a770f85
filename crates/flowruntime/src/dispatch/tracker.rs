use flowcore::{is_prefix, Completion, Index, ProcessId};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct Progress {
    outstanding: Vec<Index>,
    held: VecDeque<Completion>,
}

/// What a state change lets through.
#[derive(Debug, Default)]
pub(crate) struct Released {
    pub completions: Vec<Completion>,
    /// The whole invocation is done: either its top-level job or its
    /// top-level completion went out.
    pub finished: bool,
}

/// Holds completions back until every job below their index has returned,
/// so the crystallizer always sees a list's items before the list closes.
#[derive(Debug, Default)]
pub(crate) struct CompletionTracker {
    processes: HashMap<ProcessId, Progress>,
}

impl CompletionTracker {
    pub(crate) fn job_started(&mut self, process: &ProcessId, index: &Index) {
        self.processes
            .entry(process.clone())
            .or_default()
            .outstanding
            .push(index.clone());
    }

    pub(crate) fn job_finished(&mut self, process: &ProcessId, index: &Index) -> Released {
        if let Some(progress) = self.processes.get_mut(process) {
            if let Some(pos) = progress.outstanding.iter().position(|i| i == index) {
                progress.outstanding.swap_remove(pos);
            }
        }
        if index.is_empty() {
            self.processes.remove(process);
            return Released {
                completions: Vec::new(),
                finished: true,
            };
        }
        self.release(process)
    }

    pub(crate) fn completion_arrived(&mut self, completion: Completion) -> Released {
        let process = completion.owning_process.clone();
        self.processes
            .entry(process.clone())
            .or_default()
            .held
            .push_back(completion);
        self.release(&process)
    }

    /// Jobs currently between submission and result, across all processes.
    pub(crate) fn outstanding(&self) -> usize {
        self.processes.values().map(|p| p.outstanding.len()).sum()
    }

    fn release(&mut self, process: &ProcessId) -> Released {
        let Some(progress) = self.processes.get_mut(process) else {
            return Released::default();
        };
        let mut released = Released::default();
        while let Some(front) = progress.held.front() {
            if progress
                .outstanding
                .iter()
                .any(|index| is_prefix(&front.index, index))
            {
                break;
            }
            if let Some(completion) = progress.held.pop_front() {
                released.finished |= completion.index.is_empty();
                released.completions.push(completion);
            }
        }
        if released.finished {
            self.processes.remove(process);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{EventEmitter, InMemoryReferenceService, InvocationContext};
    use std::sync::Arc;
    use uuid::Uuid;

    fn completion(process: &ProcessId, index: Index) -> Completion {
        let id = Uuid::new_v4();
        let context = InvocationContext::new(
            id,
            Arc::new(InMemoryReferenceService::new()),
            EventEmitter::detached(id),
        );
        Completion::new(process.clone(), index, 1, context)
    }

    fn indices(released: &Released) -> Vec<Index> {
        released.completions.iter().map(|c| c.index.clone()).collect()
    }

    #[test]
    fn holds_completion_until_jobs_below_finish() {
        let process = ProcessId::new("run").child("p");
        let mut tracker = CompletionTracker::default();
        tracker.job_started(&process, &vec![0]);
        tracker.job_started(&process, &vec![1]);

        let released = tracker.completion_arrived(completion(&process, vec![]));
        assert!(released.completions.is_empty());
        assert!(!released.finished);

        assert!(indices(&tracker.job_finished(&process, &vec![1])).is_empty());
        let released = tracker.job_finished(&process, &vec![0]);
        assert_eq!(indices(&released), vec![Vec::<usize>::new()]);
        assert!(released.finished);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn releases_in_arrival_order() {
        let process = ProcessId::new("run").child("p");
        let mut tracker = CompletionTracker::default();
        tracker.job_started(&process, &vec![0, 0]);

        assert!(tracker.completion_arrived(completion(&process, vec![0])).completions.is_empty());
        // [1] has nothing outstanding but must not overtake [0]
        assert!(tracker.completion_arrived(completion(&process, vec![1])).completions.is_empty());

        let released = tracker.job_finished(&process, &vec![0, 0]);
        assert_eq!(indices(&released), vec![vec![0], vec![1]]);
        assert!(!released.finished);
    }

    #[test]
    fn top_level_job_finishes_process() {
        let process = ProcessId::new("run").child("p");
        let mut tracker = CompletionTracker::default();
        tracker.job_started(&process, &vec![]);

        let released = tracker.job_finished(&process, &vec![]);
        assert!(released.finished);
        assert!(released.completions.is_empty());
    }
}
