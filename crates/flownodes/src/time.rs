use async_trait::async_trait;
use flowcore::{Activity, ActivityContext, ActivityError, ActivityOutput, PortSpec, Value};
use flowruntime::{ActivityFactory, ActivityMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Delay, then pass the input through unchanged
pub struct DelayActivity {
    delay: Duration,
}

impl DelayActivity {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Activity for DelayActivity {
    fn activity_type(&self) -> &str {
        "time.delay"
    }

    async fn invoke(&self, ctx: ActivityContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_input("value")?.clone();
        ctx.info(format!("Delaying for {}ms", self.delay.as_millis()));

        tokio::select! {
            _ = sleep(self.delay) => {}
            _ = ctx.invocation.cancellation().cancelled() => return Err(ActivityError::Cancelled),
        }

        Ok(ActivityOutput::new().with_output("value", value))
    }
}

pub struct DelayActivityFactory;

impl ActivityFactory for DelayActivityFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        let delay_ms = config
            .get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(1000.0); // Default to 1 second if not specified
        if delay_ms < 0.0 {
            return Err(ActivityError::Configuration(format!(
                "delay_ms must not be negative, got {}",
                delay_ms
            )));
        }
        Ok(Arc::new(DelayActivity::new(Duration::from_millis(delay_ms as u64))))
    }

    fn activity_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata {
            description: "Delay for the configured milliseconds, then pass the value on".to_string(),
            category: "time".to_string(),
            inputs: vec![PortSpec::input("value", 0)],
            outputs: vec![PortSpec::output("value", 0)],
        }
    }
}
