use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// Static description of a port.
///
/// `depth` is the collection nesting the port's type implies. For output
/// ports `granular_depth` is the depth at which the activity streams atomic
/// items; it never exceeds `depth`. Input ports consume at `depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub depth: usize,
    pub granular_depth: usize,
    pub direction: PortDirection,
}

impl PortSpec {
    pub fn input(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            depth,
            granular_depth: depth,
            direction: PortDirection::Input,
        }
    }

    pub fn output(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            depth,
            granular_depth: depth,
            direction: PortDirection::Output,
        }
    }

    pub fn with_granular_depth(mut self, granular_depth: usize) -> Self {
        self.granular_depth = granular_depth.min(self.depth);
        self
    }
}
