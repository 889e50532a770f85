//! Standard activity library
//!
//! Collection of built-in activities for common operations

mod debug;
mod list;
mod math;
mod time;
mod transform;

pub use debug::{DebugActivity, DebugActivityFactory};
pub use list::{ConcatActivity, ConcatActivityFactory, LengthActivity, LengthActivityFactory};
pub use math::{DoubleActivity, DoubleActivityFactory, SumActivity, SumActivityFactory};
pub use time::{DelayActivity, DelayActivityFactory};
pub use transform::{
    JsonParseActivity, JsonParseActivityFactory, JsonStringifyActivity,
    JsonStringifyActivityFactory,
};
use flowruntime::ActivityRegistry;

use std::sync::Arc;

/// Register all standard activities with a registry
pub fn register_all(registry: &mut ActivityRegistry) {
    registry.register(Arc::new(debug::DebugActivityFactory));
    registry.register(Arc::new(list::ConcatActivityFactory));
    registry.register(Arc::new(list::LengthActivityFactory));
    registry.register(Arc::new(math::DoubleActivityFactory));
    registry.register(Arc::new(math::SumActivityFactory));
    registry.register(Arc::new(time::DelayActivityFactory));
    registry.register(Arc::new(transform::JsonParseActivityFactory));
    registry.register(Arc::new(transform::JsonStringifyActivityFactory));
}
