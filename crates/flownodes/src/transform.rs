use async_trait::async_trait;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, PortSpec, Value};
use flowruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Parse JSON string to Value
pub struct JsonParseActivity;

#[async_trait]
impl Activity for JsonParseActivity {
    fn activity_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_input("json")?;
        let input = value.as_str().ok_or_else(|| ActivityError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: value.kind().to_string(),
        })?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| ActivityError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(ActivityOutput::new().with_output("parsed", Value::Json(parsed)))
    }
}

pub struct JsonParseActivityFactory;

impl ActivityFactory for JsonParseActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(JsonParseActivity))
    }

    fn activity_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortSpec::input("json", 0)],
            outputs: vec![PortSpec::output("parsed", 0)],
        }
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyActivity {
    pretty: bool,
}

impl JsonStringifyActivity {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

#[async_trait]
impl Activity for JsonStringifyActivity {
    fn activity_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_input("value")?;

        let json = to_json(value);
        let result = if self.pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        let json_str = result
            .map_err(|e| ActivityError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(ActivityOutput::new().with_output("json", json_str))
    }
}

/// Untagged JSON view of a value; bytes become an array of numbers.
fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => bytes.iter().map(|b| serde_json::Value::from(*b)).collect(),
        Value::Json(json) => json.clone(),
        Value::Array(items) => items.iter().map(to_json).collect(),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        Value::Error(message) => serde_json::json!({ "error": message }),
    }
}

pub struct JsonStringifyActivityFactory;

impl ActivityFactory for JsonStringifyActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let pretty = config.get("pretty").and_then(Value::as_bool).unwrap_or(false);
        Ok(Arc::new(JsonStringifyActivity::new(pretty)))
    }

    fn activity_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortSpec::input("value", 0)],
            outputs: vec![PortSpec::output("json", 0)],
        }
    }
}
