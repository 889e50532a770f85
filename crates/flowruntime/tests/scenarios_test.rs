mod common;

use common::*;
use flowcore::{DispatchConfig, ExecutionEvent, RetryConfig, Value};
use flowruntime::{Dataflow, Processor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn sum_dataflow() -> Dataflow {
    let mut dataflow = Dataflow::new("sum");
    dataflow.add_input("x", 0).unwrap();
    dataflow.add_input("y", 0).unwrap();
    dataflow.add_output("total").unwrap();
    let sum = Processor::builder("Sum")
        .input("x", 0)
        .input("y", 0)
        .output("sum", 0)
        .activity(Arc::new(Sum))
        .build()
        .unwrap();
    dataflow.add_processor(sum).unwrap();
    dataflow.link_input("x", "Sum", "x").unwrap();
    dataflow.link_input("y", "Sum", "y").unwrap();
    dataflow.link_output("Sum", "sum", "total").unwrap();
    dataflow
}

fn double_dataflow(activity: Arc<dyn flowcore::Activity>, dispatch: &DispatchConfig) -> Dataflow {
    let mut dataflow = Dataflow::new("double");
    dataflow.add_input("values", 1).unwrap();
    dataflow.add_output("doubled").unwrap();
    let double = Processor::builder("Double")
        .input("value", 0)
        .output("result", 0)
        .activity(activity)
        .dispatch_config(dispatch)
        .build()
        .unwrap();
    dataflow.add_processor(double).unwrap();
    dataflow.link_input("values", "Double", "value").unwrap();
    dataflow.link_output("Double", "result", "doubled").unwrap();
    dataflow
}

#[tokio::test]
async fn test_scalar_inputs_produce_one_job() {
    init_tracing();
    let dataflow = sum_dataflow();

    let (result, events) = run(
        &dataflow,
        inputs(vec![("x", Value::Number(3.0)), ("y", Value::Number(4.0))]),
    )
    .await;

    assert_eq!(result.output("total"), Some(&Value::Number(7.0)));
    assert_eq!(started_indices(&events, "Sum"), vec![Vec::<usize>::new()]);
    assert!(released_indices(&events, "Sum").is_empty());
    assert_eq!(dataflow.processor("Sum").unwrap().result_wrapping_depth(), Some(0));
}

#[tokio::test]
async fn test_list_input_iterates_per_element() {
    init_tracing();
    let double = Arc::new(Double::default());
    let dataflow = double_dataflow(double.clone(), &DispatchConfig::default());

    let (result, events) = run(&dataflow, inputs(vec![("values", numbers(&[1.0, 2.0, 3.0]))])).await;

    assert_eq!(result.output("doubled"), Some(&numbers(&[2.0, 4.0, 6.0])));
    assert_eq!(
        started_indices(&events, "Double"),
        vec![vec![0], vec![1], vec![2]]
    );
    assert_eq!(released_indices(&events, "Double"), vec![Vec::<usize>::new()]);
    assert_eq!(double.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_with_backoff() {
    init_tracing();
    let flaky = Arc::new(Flaky::new(2));
    let dispatch = DispatchConfig::default().with_retry(RetryConfig::new(2, 100, 1000, 2.0));
    let dataflow = double_dataflow(flaky.clone(), &dispatch);

    let start = tokio::time::Instant::now();
    let (result, events) = run(&dataflow, inputs(vec![("values", numbers(&[5.0]))])).await;
    let elapsed = start.elapsed();

    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.output("doubled"), Some(&numbers(&[10.0])));
    assert!(!result.has_errors());

    let delays: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::RetryScheduled { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![100, 200]);
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "elapsed {:?}", elapsed);
    assert!(!events
        .iter()
        .any(|event| matches!(event, ExecutionEvent::ErrorBounced { .. })));
}

#[tokio::test]
async fn test_empty_list_yields_empty_list() {
    init_tracing();
    let double = Arc::new(Double::default());
    let dataflow = double_dataflow(double.clone(), &DispatchConfig::default());

    let (result, events) = run(&dataflow, inputs(vec![("values", Value::Array(vec![]))])).await;

    assert_eq!(result.output("doubled"), Some(&Value::Array(vec![])));
    assert!(!result.has_errors());
    assert!(started_indices(&events, "Double").is_empty());
    assert_eq!(released_indices(&events, "Double"), vec![Vec::<usize>::new()]);
    assert_eq!(double.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dataflow_runs_repeatedly() {
    init_tracing();
    let dataflow = sum_dataflow();

    for (x, y) in [(1.0, 2.0), (10.0, 20.0)] {
        let (result, _) = run(
            &dataflow,
            inputs(vec![("x", Value::Number(x)), ("y", Value::Number(y))]),
        )
        .await;
        assert_eq!(result.output("total"), Some(&Value::Number(x + y)));
    }
}

#[tokio::test]
async fn test_missing_input_is_rejected() {
    init_tracing();
    let dataflow = sum_dataflow();
    let bus = flowcore::EventBus::new(16);
    let executor = flowruntime::DataflowExecutor::default();

    let error = executor
        .execute(&dataflow, references(), &bus, inputs(vec![("x", Value::Number(1.0))]))
        .await
        .unwrap_err();

    assert!(error.to_string().contains("y"), "unexpected error: {}", error);
}
