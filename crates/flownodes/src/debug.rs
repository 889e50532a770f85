use async_trait::async_trait;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, PortSpec, Value};
use flowruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Simple debug activity that logs its input and passes it on
pub struct DebugActivity;

#[async_trait]
impl Activity for DebugActivity {
    fn activity_type(&self) -> &str {
        "debug.log"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let message = ctx.require_input("message")?.clone();
        let text = match &message {
            Value::String(s) => s.clone(),
            other => format!("{:?}", other),
        };

        tracing::info!("[{} {:?}] {}", ctx.processor, ctx.index, text);
        ctx.info(format!("DEBUG: {}", text));

        Ok(ActivityOutput::new().with_output("message", message))
    }
}

pub struct DebugActivityFactory;

impl ActivityFactory for DebugActivityFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(Arc::new(DebugActivity))
    }

    fn activity_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![PortSpec::input("message", 0)],
            outputs: vec![PortSpec::output("message", 0)],
        }
    }
}
