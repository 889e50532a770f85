use crate::processor::Processor;
use flowcore::{Activity, ActivityError, DispatchConfig, FlowError, PortSpec, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating activity instances
pub trait ActivityFactory: Send + Sync {
    /// Create a new instance of the activity with given configuration
    fn create(&self, config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError>;

    fn activity_type(&self) -> &str;

    /// Description and port layout of the activity type.
    fn metadata(&self) -> ActivityMetadata {
        ActivityMetadata::default()
    }
}

#[derive(Debug, Clone)]
pub struct ActivityMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
}

impl Default for ActivityMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// Registry of available activity types
pub struct ActivityRegistry {
    factories: HashMap<String, Arc<dyn ActivityFactory>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn ActivityFactory>) {
        let activity_type = factory.activity_type().to_string();
        tracing::info!("Registering activity type: {}", activity_type);
        self.factories.insert(activity_type, factory);
    }

    pub fn create_activity(
        &self,
        activity_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn Activity>, FlowError> {
        let factory = self
            .factories
            .get(activity_type)
            .ok_or_else(|| FlowError::UnknownActivity(activity_type.to_string()))?;
        Ok(factory.create(config)?)
    }

    /// Registered activity types, sorted.
    pub fn list_activity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, activity_type: &str) -> Option<ActivityMetadata> {
        self.factories.get(activity_type).map(|f| f.metadata())
    }

    /// A processor named `name` running one `activity_type` activity, with
    /// ports taken from the type's metadata.
    pub fn build_processor(
        &self,
        name: impl Into<String>,
        activity_type: &str,
        config: &HashMap<String, Value>,
        dispatch: &DispatchConfig,
    ) -> Result<Arc<Processor>, FlowError> {
        let activity = self.create_activity(activity_type, config)?;
        let metadata = self.get_metadata(activity_type).unwrap_or_default();
        let mut builder = Processor::builder(name)
            .activity(activity)
            .dispatch_config(dispatch);
        for spec in metadata.inputs.into_iter().chain(metadata.outputs) {
            builder = builder.port(spec);
        }
        Ok(builder.build()?)
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
