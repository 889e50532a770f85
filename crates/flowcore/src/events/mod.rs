// crates/flowcore/src/events/mod.rs

mod base;

pub use base::{ActivityEvent, EventBus, EventEmitter, ExecutionEvent, ExecutionId};
