mod common;

use common::*;
use flowcore::{register_nested, DispatchConfig, ExecutionEvent, ProcessId, Token, TypeCheckError, Value};
use flowruntime::{
    Dataflow, IterationStrategy, IterationStrategyStack, Processor,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn sum_over(strategy: Option<IterationStrategyStack>, x_depth: usize, y_depth: usize) -> Dataflow {
    let mut dataflow = Dataflow::new("pairs");
    dataflow.add_input("xs", x_depth).unwrap();
    dataflow.add_input("ys", y_depth).unwrap();
    dataflow.add_output("sums").unwrap();
    let mut builder = Processor::builder("Sum")
        .input("x", 0)
        .input("y", 0)
        .output("sum", 0)
        .activity(Arc::new(Sum));
    if let Some(strategy) = strategy {
        builder = builder.iteration(strategy);
    }
    dataflow.add_processor(builder.build().unwrap()).unwrap();
    dataflow.link_input("xs", "Sum", "x").unwrap();
    dataflow.link_input("ys", "Sum", "y").unwrap();
    dataflow.link_output("Sum", "sum", "sums").unwrap();
    dataflow
}

fn dot() -> IterationStrategyStack {
    IterationStrategyStack::new().with_strategy(IterationStrategy::dot(["x", "y"]))
}

fn double_over(depth: usize, double: Arc<Double>) -> Dataflow {
    let mut dataflow = Dataflow::new("doubles");
    dataflow.add_input("values", depth).unwrap();
    dataflow.add_output("doubled").unwrap();
    let processor = Processor::builder("Double")
        .input("value", 0)
        .output("result", 0)
        .activity(double)
        .build()
        .unwrap();
    dataflow.add_processor(processor).unwrap();
    dataflow.link_input("values", "Double", "value").unwrap();
    dataflow.link_output("Double", "result", "doubled").unwrap();
    dataflow
}

#[tokio::test]
async fn test_cross_product_nests_in_port_order() {
    init_tracing();
    let dataflow = sum_over(None, 1, 1);

    let (result, events) = run(
        &dataflow,
        inputs(vec![
            ("xs", numbers(&[1.0, 2.0])),
            ("ys", numbers(&[10.0, 20.0, 30.0])),
        ]),
    )
    .await;

    assert_eq!(
        result.output("sums"),
        Some(&Value::Array(vec![
            numbers(&[11.0, 21.0, 31.0]),
            numbers(&[12.0, 22.0, 32.0]),
        ]))
    );
    assert_eq!(started_indices(&events, "Sum").len(), 6);
    assert_eq!(
        released_indices(&events, "Sum"),
        vec![vec![0], vec![1], vec![]]
    );
    assert_eq!(dataflow.processor("Sum").unwrap().result_wrapping_depth(), Some(2));
}

#[tokio::test]
async fn test_cross_with_scalar_port() {
    init_tracing();
    let dataflow = sum_over(None, 1, 0);

    let (result, _) = run(
        &dataflow,
        inputs(vec![("xs", numbers(&[1.0, 2.0, 3.0])), ("ys", Value::Number(100.0))]),
    )
    .await;

    assert_eq!(result.output("sums"), Some(&numbers(&[101.0, 102.0, 103.0])));
}

#[tokio::test]
async fn test_dot_product_pairs_by_index() {
    init_tracing();
    let dataflow = sum_over(Some(dot()), 1, 1);

    let (result, events) = run(
        &dataflow,
        inputs(vec![
            ("xs", numbers(&[1.0, 2.0, 3.0])),
            ("ys", numbers(&[10.0, 20.0, 30.0])),
        ]),
    )
    .await;

    assert_eq!(result.output("sums"), Some(&numbers(&[11.0, 22.0, 33.0])));
    assert_eq!(
        started_indices(&events, "Sum"),
        vec![vec![0], vec![1], vec![2]]
    );
}

#[tokio::test]
async fn test_dot_product_truncates_to_shortest() {
    init_tracing();
    let dataflow = sum_over(Some(dot()), 1, 1);

    let (result, _) = run(
        &dataflow,
        inputs(vec![
            ("xs", numbers(&[1.0, 2.0, 3.0])),
            ("ys", numbers(&[10.0, 20.0])),
        ]),
    )
    .await;

    assert_eq!(result.output("sums"), Some(&numbers(&[11.0, 22.0])));
}

#[test]
fn test_dot_product_depth_mismatch_fails_type_check() {
    let dataflow = sum_over(Some(dot()), 1, 2);

    let error = dataflow.type_check().unwrap_err();

    assert!(matches!(error, TypeCheckError::IterationMismatch { .. }));
}

#[tokio::test]
async fn test_nested_lists_keep_empty_sublists() {
    init_tracing();
    let double = Arc::new(Double::default());
    let dataflow = double_over(2, double.clone());

    let nested = Value::Array(vec![
        numbers(&[1.0]),
        Value::Array(vec![]),
        numbers(&[2.0, 3.0]),
    ]);
    let (result, events) = run(&dataflow, inputs(vec![("values", nested)])).await;

    assert_eq!(
        result.output("doubled"),
        Some(&Value::Array(vec![
            numbers(&[2.0]),
            Value::Array(vec![]),
            numbers(&[4.0, 6.0]),
        ]))
    );
    assert_eq!(double.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        released_indices(&events, "Double"),
        vec![vec![0], vec![1], vec![2], vec![]]
    );
}

#[tokio::test]
async fn test_shallow_input_is_wrapped() {
    init_tracing();
    let mut dataflow = Dataflow::new("length");
    dataflow.add_input("item", 0).unwrap();
    dataflow.add_output("length").unwrap();
    let length = Processor::builder("Length")
        .input("items", 1)
        .output("length", 0)
        .activity(Arc::new(Length))
        .build()
        .unwrap();
    dataflow.add_processor(length).unwrap();
    dataflow.link_input("item", "Length", "items").unwrap();
    dataflow.link_output("Length", "length", "length").unwrap();

    let (result, _) = run(&dataflow, inputs(vec![("item", Value::Number(5.0))])).await;

    assert_eq!(result.output("length"), Some(&Value::Number(1.0)));
}

#[tokio::test]
async fn test_failed_element_does_not_affect_siblings() {
    init_tracing();
    let double = Arc::new(Double::default());
    let dataflow = double_over(1, double.clone());

    let values = Value::Array(vec![
        Value::Number(1.0),
        Value::String("two".to_string()),
        Value::Number(3.0),
    ]);
    let (result, _) = run(&dataflow, inputs(vec![("values", values)])).await;

    let doubled = result.output("doubled").and_then(Value::as_array).unwrap();
    assert_eq!(doubled.len(), 3);
    assert_eq!(doubled[0], Value::Number(2.0));
    assert!(doubled[1].is_error());
    assert_eq!(doubled[2], Value::Number(6.0));
    assert!(result.has_errors());
}

#[tokio::test]
async fn test_tokens_in_any_order_are_deduplicated() {
    init_tracing();
    let double = Arc::new(Double::default());
    let dataflow = double_over(1, double.clone());
    assert!(dataflow.type_check().unwrap());

    let refs = references();
    let ctx = context(refs.clone());
    let process = ProcessId::new("streamed");
    let source = dataflow.input("values").unwrap();
    let send = |index: Vec<usize>, value: Value, depth: usize| {
        let data = register_nested(refs.as_ref(), value, depth).unwrap();
        source.send(Token::new(process.clone(), index, data, ctx.clone()));
    };

    send(vec![1], Value::Number(20.0), 0);
    send(vec![0], Value::Number(10.0), 0);
    send(vec![], numbers(&[10.0, 20.0]), 1);

    let output = dataflow.output("doubled").unwrap();
    let reference = output.wait(&process).await;
    let value = flowcore::render(refs.as_ref(), &reference).unwrap();

    assert_eq!(value, numbers(&[20.0, 40.0]));
    assert_eq!(double.calls.load(Ordering::SeqCst), 2);
    let partial: Vec<Vec<usize>> = output
        .tokens(&process)
        .into_iter()
        .map(|token| token.index)
        .filter(|index| !index.is_empty())
        .collect();
    assert_eq!(partial.len(), 2);
}

#[test]
fn test_unlinked_input_is_not_ready() {
    let mut dataflow = Dataflow::new("partial");
    let processor = Processor::builder("Sum")
        .input("x", 0)
        .input("y", 0)
        .output("sum", 0)
        .activity(Arc::new(Sum))
        .build()
        .unwrap();
    dataflow.add_processor(processor).unwrap();
    dataflow.add_input("x", 0).unwrap();
    dataflow.link_input("x", "Sum", "x").unwrap();

    assert!(!dataflow.type_check().unwrap());
    assert_eq!(dataflow.processor("Sum").unwrap().result_wrapping_depth(), None);
}

#[test]
fn test_cycle_is_rejected() {
    let mut dataflow = Dataflow::new("loop");
    for name in ["a", "b"] {
        let processor = Processor::builder(name)
            .input("in", 0)
            .output("out", 0)
            .activity(Arc::new(Double::default()))
            .build()
            .unwrap();
        dataflow.add_processor(processor).unwrap();
    }
    dataflow.link("a", "out", "b", "in").unwrap();
    dataflow.link("b", "out", "a", "in").unwrap();

    assert_eq!(dataflow.type_check().unwrap_err(), TypeCheckError::CyclicDependency);
}

#[tokio::test]
async fn test_chained_processors_propagate_depth() {
    init_tracing();
    let mut dataflow = Dataflow::new("chain");
    dataflow.add_input("values", 1).unwrap();
    dataflow.add_output("length").unwrap();
    let double = Processor::builder("Double")
        .input("value", 0)
        .output("result", 0)
        .activity(Arc::new(Double::default()))
        .build()
        .unwrap();
    let length = Processor::builder("Length")
        .input("items", 1)
        .output("length", 0)
        .activity(Arc::new(Length))
        .build()
        .unwrap();
    dataflow.add_processor(double).unwrap();
    dataflow.add_processor(length).unwrap();
    dataflow.link_input("values", "Double", "value").unwrap();
    dataflow.link("Double", "result", "Length", "items").unwrap();
    dataflow.link_output("Length", "length", "length").unwrap();

    let (result, _) = run(&dataflow, inputs(vec![("values", numbers(&[1.0, 2.0, 3.0, 4.0]))])).await;

    assert_eq!(result.output("length"), Some(&Value::Number(4.0)));
    let link = dataflow
        .processor("Double")
        .unwrap()
        .output_port("result")
        .unwrap()
        .links()
        .remove(0);
    assert_eq!(link.resolved_depth(), Some(1));
    assert_eq!(dataflow.processor("Length").unwrap().result_wrapping_depth(), Some(0));
}

fn unbounced_over(activity: Arc<dyn flowcore::Activity>) -> Dataflow {
    let mut dataflow = Dataflow::new("unbounced");
    dataflow.add_input("values", 1).unwrap();
    dataflow.add_output("doubled").unwrap();
    let processor = Processor::builder("Double")
        .input("value", 0)
        .output("result", 0)
        .activity(activity)
        .dispatch_config(&DispatchConfig::default().without_error_bounce())
        .build()
        .unwrap();
    dataflow.add_processor(processor).unwrap();
    dataflow.link_input("values", "Double", "value").unwrap();
    dataflow.link_output("Double", "result", "doubled").unwrap();
    dataflow
}

fn run_succeeded(events: &[ExecutionEvent]) -> Option<bool> {
    events.iter().find_map(|event| match event {
        ExecutionEvent::RunCompleted { success, .. } => Some(*success),
        _ => None,
    })
}

#[tokio::test]
async fn test_unbounced_failures_keep_list_length() {
    init_tracing();
    let dataflow = unbounced_over(Arc::new(Broken::default()));

    let (result, events) = run(&dataflow, inputs(vec![("values", numbers(&[1.0, 2.0, 3.0]))])).await;

    let doubled = result.output("doubled").unwrap();
    let items = doubled.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(Value::is_error));
    assert!(result.has_errors());
    assert_eq!(run_succeeded(&events), Some(false));
}

#[tokio::test]
async fn test_unbounced_trailing_failure_is_not_truncated() {
    init_tracing();
    let dataflow = unbounced_over(Arc::new(Double::default()));

    let values = Value::Array(vec![Value::Number(1.0), Value::Number(2.0), Value::from("x")]);
    let (result, events) = run(&dataflow, inputs(vec![("values", values)])).await;

    let doubled = result.output("doubled").unwrap();
    let items = doubled.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0], Value::Number(2.0));
    assert_eq!(items[1], Value::Number(4.0));
    assert!(items[2].is_error());
    assert_eq!(run_succeeded(&events), Some(false));
}

#[tokio::test]
async fn test_unbounced_empty_source_stays_empty() {
    init_tracing();
    let dataflow = unbounced_over(Arc::new(Broken::default()));

    let (result, _) = run(&dataflow, inputs(vec![("values", numbers(&[]))])).await;

    assert_eq!(result.output("doubled"), Some(&Value::Array(vec![])));
    assert!(!result.has_errors());
}
