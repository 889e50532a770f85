use crate::port::{InputPort, OutputPort};
use flowcore::{EditError, Token};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, Default)]
struct LinkDepths {
    resolved: Option<usize>,
    granular: Option<usize>,
}

/// Directed edge from an output port to an input port.
pub struct Datalink {
    source: Weak<OutputPort>,
    source_name: String,
    sink: Arc<InputPort>,
    depths: RwLock<LinkDepths>,
}

impl Datalink {
    pub(crate) fn new(source: &Arc<OutputPort>, sink: Arc<InputPort>) -> Arc<Self> {
        Arc::new(Self {
            source: Arc::downgrade(source),
            source_name: source.name().to_string(),
            sink,
            depths: RwLock::new(LinkDepths::default()),
        })
    }

    pub fn source(&self) -> Option<Arc<OutputPort>> {
        self.source.upgrade()
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn sink(&self) -> &Arc<InputPort> {
        &self.sink
    }

    pub fn resolved_depth(&self) -> Option<usize> {
        self.depths.read().resolved
    }

    pub fn granular_depth(&self) -> Option<usize> {
        self.depths.read().granular
    }

    pub(crate) fn set_depths(&self, resolved: usize, granular: usize) {
        *self.depths.write() = LinkDepths {
            resolved: Some(resolved),
            granular: Some(granular),
        };
    }

    pub fn forward(&self, token: Token) {
        self.sink.receive(token);
    }

    pub(crate) fn not_found(&self) -> EditError {
        EditError::LinkNotFound {
            source_port: self.source_name.clone(),
            sink_port: self.sink.name().to_string(),
        }
    }
}

impl fmt::Debug for Datalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datalink")
            .field("source", &self.source_name)
            .field("sink", &self.sink.name())
            .field("resolved_depth", &self.resolved_depth())
            .finish()
    }
}
