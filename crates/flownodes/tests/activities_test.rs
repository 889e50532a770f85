use flowcore::{
    ActivityContext, ActivityError, DispatchConfig, EventEmitter, ExecutionId,
    InMemoryReferenceService, InvocationContext, ProcessId, Value,
};
use flowruntime::{ActivityRegistry, Dataflow, FlowRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn registry() -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    flownodes::register_all(&mut registry);
    registry
}

fn context(inputs: Vec<(&str, Value)>) -> ActivityContext {
    let execution_id = ExecutionId::new_v4();
    let invocation = InvocationContext::new(
        execution_id,
        Arc::new(InMemoryReferenceService::new()),
        EventEmitter::detached(execution_id),
    );
    ActivityContext {
        processor: "test".to_string(),
        owning_process: ProcessId::new("run"),
        index: vec![],
        inputs: inputs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
        invocation,
    }
}

fn config(entries: Vec<(&str, Value)>) -> HashMap<String, Value> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[test]
fn registers_every_standard_activity() {
    let types = registry().list_activity_types();
    assert_eq!(
        types,
        vec![
            "debug.log",
            "list.length",
            "math.double",
            "math.sum",
            "text.concat",
            "time.delay",
            "transform.json_parse",
            "transform.json_stringify",
        ]
    );
}

#[test]
fn metadata_declares_port_depths() {
    let metadata = registry().get_metadata("list.length").unwrap();
    assert_eq!(metadata.category, "list");
    assert_eq!(metadata.inputs.len(), 1);
    assert_eq!(metadata.inputs[0].name, "items");
    assert_eq!(metadata.inputs[0].depth, 1);
    assert_eq!(metadata.outputs[0].name, "length");
}

#[tokio::test]
async fn sum_adds_inputs() {
    let activity = registry().create_activity("math.sum", &HashMap::new()).unwrap();
    let output = activity
        .invoke(context(vec![("x", Value::Number(3.0)), ("y", Value::Number(4.0))]))
        .await
        .unwrap();
    assert_eq!(output.outputs["sum"], Value::Number(7.0));
}

#[tokio::test]
async fn sum_rejects_non_numbers() {
    let activity = registry().create_activity("math.sum", &HashMap::new()).unwrap();
    let error = activity
        .invoke(context(vec![("x", Value::from("three")), ("y", Value::Number(4.0))]))
        .await
        .unwrap_err();
    assert!(matches!(error, ActivityError::InvalidInputType { ref field, .. } if field == "x"));
}

#[tokio::test]
async fn double_uses_configured_factor() {
    let registry = registry();
    let activity = registry
        .create_activity("math.double", &config(vec![("factor", Value::Number(3.0))]))
        .unwrap();
    let output = activity
        .invoke(context(vec![("value", Value::Number(5.0))]))
        .await
        .unwrap();
    assert_eq!(output.outputs["result"], Value::Number(15.0));

    let error = registry
        .create_activity("math.double", &config(vec![("factor", Value::from("x"))]))
        .err()
        .unwrap();
    assert!(error.to_string().contains("factor"));
}

#[tokio::test]
async fn length_counts_items() {
    let activity = registry().create_activity("list.length", &HashMap::new()).unwrap();
    let items = Value::Array(vec![Value::Null, Value::Bool(true), Value::from("x")]);
    let output = activity.invoke(context(vec![("items", items)])).await.unwrap();
    assert_eq!(output.outputs["length"], Value::Number(3.0));
}

#[tokio::test]
async fn concat_joins_with_separator() {
    let activity = registry()
        .create_activity("text.concat", &config(vec![("separator", Value::from("-"))]))
        .unwrap();
    let output = activity
        .invoke(context(vec![("left", Value::from("a")), ("right", Value::Number(2.0))]))
        .await
        .unwrap();
    assert_eq!(output.outputs["text"], Value::from("a-2"));
}

#[tokio::test]
async fn json_parse_and_stringify() {
    let registry = registry();
    let parse = registry
        .create_activity("transform.json_parse", &HashMap::new())
        .unwrap();
    let parsed = parse
        .invoke(context(vec![("json", Value::from(r#"{"a":[1,2]}"#))]))
        .await
        .unwrap();
    assert_eq!(
        parsed.outputs["parsed"],
        Value::Json(serde_json::json!({"a": [1, 2]}))
    );

    let stringify = registry
        .create_activity("transform.json_stringify", &HashMap::new())
        .unwrap();
    let list = Value::Array(vec![Value::from("x"), Value::Bool(false)]);
    let output = stringify.invoke(context(vec![("value", list)])).await.unwrap();
    assert_eq!(output.outputs["json"], Value::from(r#"["x",false]"#));

    let error = parse
        .invoke(context(vec![("json", Value::from("{"))]))
        .await
        .unwrap_err();
    assert!(matches!(error, ActivityError::ExecutionFailed(_)));
}

#[tokio::test]
async fn debug_passes_message_through() {
    let activity = registry().create_activity("debug.log", &HashMap::new()).unwrap();
    let output = activity
        .invoke(context(vec![("message", Value::from("hello"))]))
        .await
        .unwrap();
    assert_eq!(output.outputs["message"], Value::from("hello"));
}

#[tokio::test(start_paused = true)]
async fn delay_waits_then_passes_value() {
    let activity = registry()
        .create_activity("time.delay", &config(vec![("delay_ms", Value::Number(250.0))]))
        .unwrap();
    let started = tokio::time::Instant::now();
    let output = activity
        .invoke(context(vec![("value", Value::Number(1.0))]))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(output.outputs["value"], Value::Number(1.0));
}

#[tokio::test]
async fn delay_stops_when_cancelled() {
    let activity = registry()
        .create_activity("time.delay", &config(vec![("delay_ms", Value::Number(60_000.0))]))
        .unwrap();
    let ctx = context(vec![("value", Value::Number(1.0))]);
    ctx.invocation.cancellation().cancel();
    let error = activity.invoke(ctx).await.unwrap_err();
    assert_eq!(error, ActivityError::Cancelled);
}

#[test]
fn unknown_activity_type_is_reported() {
    let error = registry()
        .create_activity("nope", &HashMap::new())
        .err()
        .unwrap();
    assert!(error.to_string().contains("nope"));
}

#[tokio::test]
async fn registry_processors_run_in_a_dataflow() {
    let registry = Arc::new(registry());
    let dispatch = DispatchConfig::default().with_max_jobs(4);

    let double = registry
        .build_processor("double", "math.double", &HashMap::new(), &dispatch)
        .unwrap();
    let length = registry
        .build_processor("length", "list.length", &HashMap::new(), &dispatch)
        .unwrap();

    let mut dataflow = Dataflow::new("pipeline");
    dataflow.add_processor(double).unwrap();
    dataflow.add_processor(length).unwrap();
    dataflow.add_input("numbers", 1).unwrap();
    dataflow.add_output("doubled").unwrap();
    dataflow.add_output("count").unwrap();
    dataflow.link_input("numbers", "double", "value").unwrap();
    dataflow.link("double", "result", "length", "items").unwrap();
    dataflow.link_output("double", "result", "doubled").unwrap();
    dataflow.link_output("length", "length", "count").unwrap();

    let runtime = FlowRuntime::with_registry(registry, RuntimeConfig::default());
    runtime.register_dataflow(dataflow).await;

    let numbers = Value::Array(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
    let result = runtime
        .execute_dataflow("pipeline", HashMap::from([("numbers".to_string(), numbers)]))
        .await
        .unwrap();

    assert!(!result.has_errors());
    assert_eq!(
        result.output("doubled"),
        Some(&Value::Array(vec![
            Value::Number(2.0),
            Value::Number(4.0),
            Value::Number(6.0)
        ]))
    );
    assert_eq!(result.output("count"), Some(&Value::Number(3.0)));
}
