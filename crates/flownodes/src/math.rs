use async_trait::async_trait;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, PortSpec, Value};
use flowruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// `sum = x + y`
pub struct SumActivity;

#[async_trait]
impl Activity for SumActivity {
    fn activity_type(&self) -> &str {
        "math.sum"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let x = ctx.require_number("x")?;
        let y = ctx.require_number("y")?;
        Ok(ActivityOutput::new().with_output("sum", x + y))
    }
}

pub struct SumActivityFactory;

impl ActivityFactory for SumActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(SumActivity))
    }

    fn activity_type(&self) -> &str {
        "math.sum"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Add two numbers".to_string(),
            category: "math".to_string(),
            inputs: vec![PortSpec::input("x", 0), PortSpec::input("y", 0)],
            outputs: vec![PortSpec::output("sum", 0)],
        }
    }
}

/// `result = value * factor`, factor 2 unless configured
pub struct DoubleActivity {
    factor: f64,
}

impl DoubleActivity {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Default for DoubleActivity {
    fn default() -> Self {
        Self::new(2.0)
    }
}

#[async_trait]
impl Activity for DoubleActivity {
    fn activity_type(&self) -> &str {
        "math.double"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_number("value")?;
        Ok(ActivityOutput::new().with_output("result", value * self.factor))
    }
}

pub struct DoubleActivityFactory;

impl ActivityFactory for DoubleActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let factor = match config.get("factor") {
            None => 2.0,
            Some(value) => value.as_f64().ok_or_else(|| {
                ActivityError::Configuration(format!("factor must be a number, got {}", value.kind()))
            })?,
        };
        Ok(Arc::new(DoubleActivity::new(factor)))
    }

    fn activity_type(&self) -> &str {
        "math.double"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Multiply a number by a constant factor (default 2)".to_string(),
            category: "math".to_string(),
            inputs: vec![PortSpec::input("value", 0)],
            outputs: vec![PortSpec::output("result", 0)],
        }
    }
}
