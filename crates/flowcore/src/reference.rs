//! Opaque data references and the service that resolves them.
//!
//! The engine never looks inside a value; it moves [`Reference`]s around and
//! asks a [`ReferenceService`] to register or resolve them. Depth is part of
//! the reference so iteration and crystallization can reason about nesting
//! without touching the store.

use crate::{ReferenceError, Value};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Value,
    List,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    id: Uuid,
    kind: ReferenceKind,
    depth: usize,
    contains_errors: bool,
}

impl Reference {
    fn new(kind: ReferenceKind, depth: usize, contains_errors: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            depth,
            contains_errors,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReferenceKind::Error
    }

    /// True for error documents and for lists with an error anywhere below.
    pub fn contains_errors(&self) -> bool {
        self.contains_errors
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ReferenceKind::Value => "value",
            ReferenceKind::List => "list",
            ReferenceKind::Error => "error",
        };
        write!(f, "{}/{}/{}", kind, self.depth, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub message: String,
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    List(Vec<Reference>),
    Error(ErrorDocument),
}

/// Storage and identity for data flowing through the engine.
pub trait ReferenceService: Send + Sync {
    /// Register a single value at depth 0.
    fn register_value(&self, value: Value) -> Reference;

    /// Register a list of `depth`; every item must be exactly one level shallower.
    fn register_list(&self, items: Vec<Reference>, depth: usize)
        -> Result<Reference, ReferenceError>;

    /// Register an empty list at `depth` (at least 1).
    fn register_empty_list(&self, depth: usize) -> Result<Reference, ReferenceError> {
        if depth == 0 {
            return Err(ReferenceError::InvalidEmptyListDepth(depth));
        }
        self.register_list(Vec::new(), depth)
    }

    /// Register an error document standing in for data of `depth`.
    fn register_error(&self, depth: usize, message: String) -> Reference;

    fn resolve(&self, reference: &Reference) -> Result<Resolved, ReferenceError>;
}

/// Register `value` as a reference tree of the given depth. Arrays become
/// lists level by level; at depth 0 the value is stored as is.
pub fn register_nested(
    service: &dyn ReferenceService,
    value: Value,
    depth: usize,
) -> Result<Reference, ReferenceError> {
    if depth == 0 {
        return Ok(service.register_value(value));
    }
    match value {
        Value::Array(items) => {
            let children = items
                .into_iter()
                .map(|item| register_nested(service, item, depth - 1))
                .collect::<Result<Vec<_>, _>>()?;
            service.register_list(children, depth)
        }
        Value::Error(message) => Ok(service.register_error(depth, message)),
        _ => Err(ReferenceError::NotAList(depth)),
    }
}

/// Materialise a reference into a plain value, errors included.
pub fn render(service: &dyn ReferenceService, reference: &Reference) -> Result<Value, ReferenceError> {
    match service.resolve(reference)? {
        Resolved::Value(value) => Ok(value),
        Resolved::List(items) => items
            .iter()
            .map(|item| render(service, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Resolved::Error(doc) => Ok(Value::Error(doc.message)),
    }
}

/// Wrap `reference` in singleton lists until it reaches `depth`.
pub fn wrap_to_depth(
    service: &dyn ReferenceService,
    mut reference: Reference,
    depth: usize,
) -> Result<Reference, ReferenceError> {
    while reference.depth() < depth {
        let next = reference.depth() + 1;
        reference = service.register_list(vec![reference], next)?;
    }
    Ok(reference)
}

/// Reference store backed by a concurrent map. Nothing is ever evicted.
#[derive(Default)]
pub struct InMemoryReferenceService {
    entries: DashMap<Uuid, Resolved>,
}

impl InMemoryReferenceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReferenceService for InMemoryReferenceService {
    fn register_value(&self, value: Value) -> Reference {
        let reference = Reference::new(ReferenceKind::Value, 0, false);
        self.entries.insert(reference.id, Resolved::Value(value));
        reference
    }

    fn register_list(
        &self,
        items: Vec<Reference>,
        depth: usize,
    ) -> Result<Reference, ReferenceError> {
        if depth == 0 {
            return Err(ReferenceError::NotAList(depth));
        }
        if let Some(bad) = items.iter().find(|item| item.depth + 1 != depth) {
            return Err(ReferenceError::DepthMismatch {
                expected: depth - 1,
                actual: bad.depth,
            });
        }
        let contains_errors = items.iter().any(Reference::contains_errors);
        let reference = Reference::new(ReferenceKind::List, depth, contains_errors);
        self.entries.insert(reference.id, Resolved::List(items));
        Ok(reference)
    }

    fn register_error(&self, depth: usize, message: String) -> Reference {
        let reference = Reference::new(ReferenceKind::Error, depth, true);
        self.entries
            .insert(reference.id, Resolved::Error(ErrorDocument { message }));
        reference
    }

    fn resolve(&self, reference: &Reference) -> Result<Resolved, ReferenceError> {
        self.entries
            .get(&reference.id)
            .map(|entry| entry.value().clone())
            .ok_or(ReferenceError::NotFound(reference.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_values_round_trip_through_render() {
        let service = InMemoryReferenceService::new();
        let value = Value::Array(vec![
            Value::Array(vec![Value::Number(1.0)]),
            Value::Array(vec![]),
        ]);
        let reference = register_nested(&service, value.clone(), 2).unwrap();
        assert_eq!(reference.depth(), 2);
        assert_eq!(render(&service, &reference).unwrap(), value);
    }

    #[test]
    fn list_items_must_be_one_level_shallower() {
        let service = InMemoryReferenceService::new();
        let scalar = service.register_value(Value::Number(1.0));
        let err = service.register_list(vec![scalar], 2).unwrap_err();
        assert_eq!(err, ReferenceError::DepthMismatch { expected: 1, actual: 0 });
    }

    #[test]
    fn empty_list_needs_positive_depth() {
        let service = InMemoryReferenceService::new();
        assert!(service.register_empty_list(0).is_err());
        let empty = service.register_empty_list(3).unwrap();
        assert_eq!(empty.depth(), 3);
        assert_eq!(service.resolve(&empty).unwrap(), Resolved::List(vec![]));
    }

    #[test]
    fn errors_propagate_into_enclosing_lists() {
        let service = InMemoryReferenceService::new();
        let ok = service.register_value(Value::Number(2.0));
        let bad = service.register_error(0, "boom".into());
        let list = service.register_list(vec![ok, bad], 1).unwrap();
        assert!(list.contains_errors());
        assert!(!list.is_error());
        assert_eq!(
            render(&service, &list).unwrap(),
            Value::Array(vec![Value::Number(2.0), Value::Error("boom".into())])
        );
    }

    #[test]
    fn wrapping_builds_singleton_lists() {
        let service = InMemoryReferenceService::new();
        let scalar = service.register_value(Value::from("x"));
        let wrapped = wrap_to_depth(&service, scalar, 2).unwrap();
        assert_eq!(wrapped.depth(), 2);
        assert_eq!(
            render(&service, &wrapped).unwrap(),
            Value::Array(vec![Value::Array(vec![Value::from("x")])])
        );
    }
}
