// crates/flowcli/src/main.rs

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use demo::Demo;
use flowcore::{ActivityEvent, ExecutionEvent, RetryConfig, Value};
use flowruntime::{ActivityRegistry, FlowRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Dataflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available activity types
    Activities,

    /// Run one of the built-in demonstration dataflows
    Demo {
        #[arg(value_enum)]
        demo: Demo,

        /// Jobs allowed to run concurrently per processor
        #[arg(long)]
        max_jobs: Option<usize>,

        /// Retries after a failed invocation
        #[arg(long)]
        retries: Option<u32>,

        /// Runtime configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input data as JSON object, replacing the demo's inputs
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Convert a serde_json::Value to flowcore::Value
fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect();
            Value::Object(map)
        }
    }
}

fn registry() -> ActivityRegistry {
    let mut registry = ActivityRegistry::new();
    flownodes::register_all(&mut registry);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Activities => {
            init_logging(false);
            list_activities();
        }

        Commands::Demo {
            demo,
            max_jobs,
            retries,
            config,
            input,
            verbose,
        } => {
            init_logging(verbose);
            let config = load_config(config, demo, max_jobs, retries)?;
            run_demo(demo, config, input).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(
    path: Option<PathBuf>,
    demo: Demo,
    max_jobs: Option<usize>,
    retries: Option<u32>,
) -> Result<RuntimeConfig> {
    let mut config: RuntimeConfig = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };

    if let Some(max_jobs) = max_jobs {
        config.dispatch = config.dispatch.with_max_jobs(max_jobs);
    }
    if let Some(retries) = retries {
        config.dispatch.retry.max_retries = retries;
    }
    // The retry demo needs some retries to get past its failures
    if demo == Demo::Retry && config.dispatch.retry.max_retries == 0 && retries.is_none() {
        config.dispatch.retry = RetryConfig::new(2, 100, 1000, 2.0);
    }

    tracing::debug!("dispatch configuration: {:?}", config.dispatch);
    Ok(config)
}

async fn run_demo(demo: Demo, config: RuntimeConfig, input: Option<String>) -> Result<()> {
    let runtime = FlowRuntime::with_registry(Arc::new(registry()), config);
    let (dataflow, mut inputs) = demo.build(runtime.registry(), runtime.dispatch_config())?;

    if let Some(input_str) = input {
        let json: serde_json::Value = serde_json::from_str(&input_str)?;
        if let serde_json::Value::Object(obj) = json {
            inputs = obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect();
        } else {
            return Err(anyhow::anyhow!("Input must be a JSON object"));
        }
    }

    println!("🚀 Running {}", dataflow.name());
    for (name, value) in &inputs {
        println!("   {} = {:?}", name, value);
    }
    println!();

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let result = runtime.execute(&dataflow, inputs).await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let result = result?;
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", result.execution_id);
    println!("   Duration: {}ms", result.duration_ms);
    println!();
    println!("📤 Outputs:");
    let mut names: Vec<_> = result.outputs.keys().collect();
    names.sort();
    for name in names {
        println!("   {}: {:?}", name, result.outputs[name]);
    }
    if result.has_errors() {
        println!();
        println!("⚠️  Some outputs contain error documents");
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { dataflow, .. } => {
            println!("▶️  Run of {} started", dataflow);
        }
        ExecutionEvent::JobStarted { processor, index, activity, .. } => {
            println!("  ⚡ {} {:?} invoking {}", processor, index, activity);
        }
        ExecutionEvent::JobCompleted { processor, index, duration_ms, .. } => {
            println!("  ✅ {} {:?} completed in {}ms", processor, index, duration_ms);
        }
        ExecutionEvent::JobFailed { processor, index, error, .. } => {
            println!("  ❌ {} {:?} failed: {}", processor, index, error);
        }
        ExecutionEvent::RetryScheduled { processor, index, attempt, delay_ms, .. } => {
            println!("  🔁 {} {:?} retry {} in {}ms", processor, index, attempt, delay_ms);
        }
        ExecutionEvent::FailedOver { processor, index, from_activity, error, .. } => {
            println!(
                "  ↪️  {} {:?} failing over from activity {}: {}",
                processor, index, from_activity, error
            );
        }
        ExecutionEvent::ErrorBounced { processor, index, error, .. } => {
            println!("  🧱 {} {:?} bounced error: {}", processor, index, error);
        }
        ExecutionEvent::CompletionReleased { processor, index, .. } => {
            println!("  📦 {} released {:?}", processor, index);
        }
        ExecutionEvent::ConditionSatisfied { control, target, .. } => {
            println!("  🔓 {} -> {} satisfied", control, target);
        }
        ExecutionEvent::Activity { processor, event, .. } => match event {
            ActivityEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", processor, message);
            }
            ActivityEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", processor, message);
            }
            ActivityEvent::Progress { percent, message } => {
                if let Some(msg) = message {
                    println!("     📊 [{}] {}% - {}", processor, percent, msg);
                } else {
                    println!("     📊 [{}] {}%", processor, percent);
                }
            }
        },
        ExecutionEvent::RunCompleted { success, duration_ms, .. } => {
            if success {
                println!("✨ Run completed successfully in {}ms", duration_ms);
            } else {
                println!("💥 Run failed after {}ms", duration_ms);
            }
        }
    }
}

fn list_activities() {
    println!("📦 Available Activity Types:");
    println!();

    let registry = registry();
    for activity_type in registry.list_activity_types() {
        if let Some(metadata) = registry.get_metadata(&activity_type) {
            println!("  • {} ({})", activity_type, metadata.category);
            println!("    {}", metadata.description);
            let ports = |specs: &[flowcore::PortSpec]| {
                specs
                    .iter()
                    .map(|p| format!("{}:{}", p.name, p.depth))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!("    in [{}] out [{}]", ports(&metadata.inputs), ports(&metadata.outputs));
        } else {
            println!("  • {}", activity_type);
        }
    }
}
