//! Dataflow execution engine
//!
//! Processors connected by datalinks fire as tokens arrive, iterate over
//! nested collections through their iteration strategies and run each job
//! through a layered dispatch stack. Results are crystallized back into
//! tokens, collection structure included.

mod condition;
mod crystallizer;
mod dataflow;
mod datalink;
pub mod dispatch;
pub mod edits;
mod executor;
pub mod iteration;
mod names;
mod port;
mod processor;
mod registry;
mod runtime;

pub use condition::Condition;
pub use crystallizer::{Crystallizer, PortToken};
pub use dataflow::{Dataflow, DataflowOutput};
pub use datalink::Datalink;
pub use dispatch::{DispatchLayer, DispatchRequest, DispatchStack, Next};
pub use edits::{CompoundEdit, Edit};
pub use executor::{DataflowExecutor, ExecutionResult};
pub use iteration::{IterationNode, IterationStrategy, IterationStrategyStack, PortDepth};
pub use names::NameAllocator;
pub use port::{InputPort, OutputPort, TokenHandler};
pub use processor::{Processor, ProcessorBuilder, ProcessorStatus};
pub use registry::{ActivityFactory, ActivityMetadata, ActivityRegistry};
pub use runtime::{FlowRuntime, RuntimeConfig};
