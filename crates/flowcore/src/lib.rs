//! Core abstractions for the flow engine
//!
//! This crate provides the data model every other component depends on:
//! references, tokens, jobs, completions, ports, activities and the error
//! taxonomy. It has no engine logic.

mod activity;
mod config;
mod context;
mod error;
pub mod events;
mod port;
mod reference;
mod token;
mod value;

pub use activity::{Activity, ActivityContext, ActivityOutput};
pub use config::{DispatchConfig, RetryConfig};
pub use context::InvocationContext;
pub use error::{ActivityError, EditError, FlowError, ReferenceError, TypeCheckError};
pub use events::*;
pub use port::{PortDirection, PortSpec};
pub use reference::{
    register_nested, render, wrap_to_depth, ErrorDocument, InMemoryReferenceService, Reference,
    ReferenceKind, ReferenceService, Resolved,
};
pub use token::{is_prefix, Completion, Index, IterationEvent, Job, ProcessId, Token};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
