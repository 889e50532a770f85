use crate::datalink::Datalink;
use flowcore::{EditError, PortDirection, PortSpec, Token};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Receives tokens delivered to an input port.
pub trait TokenHandler: Send + Sync {
    fn handle_token(&self, port: &str, token: Token);
}

/// Input side of a link. Holds at most one incoming link.
pub struct InputPort {
    spec: PortSpec,
    incoming: RwLock<Option<Arc<Datalink>>>,
    handler: Weak<dyn TokenHandler>,
}

impl InputPort {
    pub fn new(spec: PortSpec, handler: Weak<dyn TokenHandler>) -> Arc<Self> {
        debug_assert_eq!(spec.direction, PortDirection::Input);
        Arc::new(Self {
            spec,
            incoming: RwLock::new(None),
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub fn declared_depth(&self) -> usize {
        self.spec.depth
    }

    pub fn incoming_link(&self) -> Option<Arc<Datalink>> {
        self.incoming.read().clone()
    }

    /// Depth of the data arriving here, known once the incoming link has
    /// been type checked.
    pub fn resolved_depth(&self) -> Option<usize> {
        self.incoming.read().as_ref().and_then(|link| link.resolved_depth())
    }

    pub(crate) fn attach(&self, link: Arc<Datalink>) -> Result<(), EditError> {
        let mut incoming = self.incoming.write();
        if incoming.is_some() {
            return Err(EditError::SinkAlreadyLinked(self.spec.name.clone()));
        }
        *incoming = Some(link);
        Ok(())
    }

    pub(crate) fn detach(&self, link: &Arc<Datalink>) -> Result<(), EditError> {
        let mut incoming = self.incoming.write();
        match incoming.as_ref() {
            Some(current) if Arc::ptr_eq(current, link) => {
                *incoming = None;
                Ok(())
            }
            _ => Err(link.not_found()),
        }
    }

    /// Hand a token to whoever owns this port.
    pub fn receive(&self, token: Token) {
        match self.handler.upgrade() {
            Some(handler) => handler.handle_token(&self.spec.name, token),
            None => tracing::warn!(
                "Dropping token for port '{}': owner no longer exists",
                self.spec.name
            ),
        }
    }
}

/// Output side of a link. Broadcasts every token to all outgoing links.
pub struct OutputPort {
    spec: PortSpec,
    resolved_depth: RwLock<Option<usize>>,
    links: RwLock<Vec<Arc<Datalink>>>,
}

impl OutputPort {
    pub fn new(spec: PortSpec) -> Arc<Self> {
        debug_assert_eq!(spec.direction, PortDirection::Output);
        Arc::new(Self {
            spec,
            resolved_depth: RwLock::new(None),
            links: RwLock::new(Vec::new()),
        })
    }

    /// A source whose depth is fixed up front, such as a dataflow input.
    pub fn with_resolved_depth(spec: PortSpec) -> Arc<Self> {
        let depth = spec.depth;
        let port = Self::new(spec);
        *port.resolved_depth.write() = Some(depth);
        port
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub fn declared_depth(&self) -> usize {
        self.spec.depth
    }

    pub fn granular_depth(&self) -> usize {
        self.spec.granular_depth
    }

    pub fn resolved_depth(&self) -> Option<usize> {
        *self.resolved_depth.read()
    }

    pub fn links(&self) -> Vec<Arc<Datalink>> {
        self.links.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.links.read().is_empty()
    }

    /// Record the wrapping depth computed by type check and push the
    /// resulting depths onto every outgoing link.
    pub(crate) fn resolve(&self, wrapping_depth: usize) {
        let depth = wrapping_depth + self.spec.depth;
        let granular = wrapping_depth + self.spec.granular_depth;
        *self.resolved_depth.write() = Some(depth);
        for link in self.links.read().iter() {
            link.set_depths(depth, granular);
        }
    }

    pub(crate) fn add_link(&self, link: Arc<Datalink>) {
        if let Some(depth) = self.resolved_depth() {
            let granular = depth - self.spec.depth + self.spec.granular_depth;
            link.set_depths(depth, granular);
        }
        self.links.write().push(link);
    }

    pub(crate) fn remove_link(&self, link: &Arc<Datalink>) -> Result<usize, EditError> {
        let mut links = self.links.write();
        let position = links
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, link))
            .ok_or_else(|| link.not_found())?;
        links.remove(position);
        Ok(position)
    }

    pub(crate) fn insert_link(&self, position: usize, link: Arc<Datalink>) {
        let mut links = self.links.write();
        let position = position.min(links.len());
        links.insert(position, link);
    }

    /// Deliver `token`, unmodified, to every registered link.
    pub fn send(&self, token: Token) {
        let links = self.links.read().clone();
        for link in links {
            link.forward(token.clone());
        }
    }
}
