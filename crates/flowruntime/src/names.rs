use std::collections::{HashMap, HashSet};

/// Hands out unique processor names within one dataflow.
///
/// A requested name is used as-is when free, otherwise the first free
/// `name_N` with `N` counting up from 1 per base name.
#[derive(Debug, Default, Clone)]
pub struct NameAllocator {
    taken: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "processor" } else { base };
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Claim an exact name. False if it is already in use.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_string())
    }

    pub fn release(&mut self, name: &str) -> bool {
        self.taken.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_suffixes_taken_names() {
        let mut names = NameAllocator::new();
        assert_eq!(names.allocate("double"), "double");
        assert_eq!(names.allocate("double"), "double_1");
        assert!(names.reserve("double_2"));
        assert_eq!(names.allocate("double"), "double_3");
        assert_eq!(names.allocate(""), "processor");
    }

    #[test]
    fn test_release_frees_name() {
        let mut names = NameAllocator::new();
        names.allocate("sum");
        assert!(!names.reserve("sum"));
        assert!(names.release("sum"));
        assert!(names.reserve("sum"));
    }
}
