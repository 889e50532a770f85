//! Built-in demonstration dataflows

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, DispatchConfig, Value};
use flowruntime::{ActivityRegistry, Dataflow, Processor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `x + y` over two single values
    Sum,
    /// Double every number of a list
    Double,
    /// An activity that fails twice before succeeding
    Retry,
    /// Double an empty list
    Empty,
}

impl Demo {
    pub fn build(
        self,
        registry: &ActivityRegistry,
        dispatch: &DispatchConfig,
    ) -> Result<(Dataflow, HashMap<String, Value>)> {
        let mut dataflow = Dataflow::new(format!("demo-{:?}", self).to_lowercase());
        let none = HashMap::new();

        let inputs = match self {
            Demo::Sum => {
                dataflow.add_processor(registry.build_processor("sum", "math.sum", &none, dispatch)?)?;
                dataflow.add_input("x", 0)?;
                dataflow.add_input("y", 0)?;
                dataflow.add_output("sum")?;
                dataflow.link_input("x", "sum", "x")?;
                dataflow.link_input("y", "sum", "y")?;
                dataflow.link_output("sum", "sum", "sum")?;
                HashMap::from([
                    ("x".to_string(), Value::Number(3.0)),
                    ("y".to_string(), Value::Number(4.0)),
                ])
            }
            Demo::Double | Demo::Empty => {
                dataflow.add_processor(registry.build_processor(
                    "double",
                    "math.double",
                    &none,
                    dispatch,
                )?)?;
                dataflow.add_input("numbers", 1)?;
                dataflow.add_output("result")?;
                dataflow.link_input("numbers", "double", "value")?;
                dataflow.link_output("double", "result", "result")?;
                let numbers = if self == Demo::Empty {
                    vec![]
                } else {
                    vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
                };
                HashMap::from([("numbers".to_string(), Value::Array(numbers))])
            }
            Demo::Retry => {
                let inner = registry.create_activity("math.double", &none)?;
                let processor = Processor::builder("flaky")
                    .input("value", 0)
                    .output("result", 0)
                    .activity(Arc::new(Flaky::new(2, inner)))
                    .dispatch_config(dispatch)
                    .build()?;
                dataflow.add_processor(processor)?;
                dataflow.add_input("value", 0)?;
                dataflow.add_output("result")?;
                dataflow.link_input("value", "flaky", "value")?;
                dataflow.link_output("flaky", "result", "result")?;
                HashMap::from([("value".to_string(), Value::Number(21.0))])
            }
        };

        Ok((dataflow, inputs))
    }
}

/// Fails the first `failures` calls, then delegates.
struct Flaky {
    failures: u32,
    calls: AtomicU32,
    inner: Arc<dyn Activity>,
}

impl Flaky {
    fn new(failures: u32, inner: Arc<dyn Activity>) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            inner,
        }
    }
}

#[async_trait]
impl Activity for Flaky {
    fn activity_type(&self) -> &str {
        "demo.flaky"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            ctx.warn(format!("simulated failure {} of {}", call, self.failures));
            return Err(ActivityError::ExecutionFailed(format!(
                "simulated failure on call {}",
                call
            )));
        }
        self.inner.invoke(ctx).await
    }
}
