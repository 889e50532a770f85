use async_trait::async_trait;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, PortSpec, Value};
use flowruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Number of items in a list.
pub struct LengthActivity;

#[async_trait]
impl Activity for LengthActivity {
    fn activity_type(&self) -> &str {
        "list.length"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let items = ctx.require_array("items")?;
        Ok(ActivityOutput::new().with_output("length", items.len() as i64))
    }
}

pub struct LengthActivityFactory;

impl ActivityFactory for LengthActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(LengthActivity))
    }

    fn activity_type(&self) -> &str {
        "list.length"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Count the items of a list".to_string(),
            category: "list".to_string(),
            inputs: vec![PortSpec::input("items", 1)],
            outputs: vec![PortSpec::output("length", 0)],
        }
    }
}

/// Joins two values as text with a configurable separator.
pub struct ConcatActivity {
    separator: String,
}

impl ConcatActivity {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

fn as_text(field: &str, value: &Value) -> Result<String, ActivityError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ActivityError::InvalidInputType {
            field: field.to_string(),
            expected: "string".to_string(),
            actual: other.kind().to_string(),
        }),
    }
}

#[async_trait]
impl Activity for ConcatActivity {
    fn activity_type(&self) -> &str {
        "text.concat"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let left = as_text("left", ctx.require_input("left")?)?;
        let right = as_text("right", ctx.require_input("right")?)?;
        Ok(ActivityOutput::new().with_output("text", format!("{}{}{}", left, self.separator, right)))
    }
}

pub struct ConcatActivityFactory;

impl ActivityFactory for ConcatActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let separator = config
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(Arc::new(ConcatActivity::new(separator)))
    }

    fn activity_type(&self) -> &str {
        "text.concat"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Join two values as text".to_string(),
            category: "text".to_string(),
            inputs: vec![PortSpec::input("left", 0), PortSpec::input("right", 0)],
            outputs: vec![PortSpec::output("text", 0)],
        }
    }
}
