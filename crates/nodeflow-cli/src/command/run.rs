//! `run` subcommand.

use std::sync::Arc;

use anyhow::Context;
use nodeflow_http::{ReqwestConfig, ReqwestExecutor};
use nodeflow_runtime::definition::TriggerEvent;
use nodeflow_runtime::engine::{Engine, ExecutionEvent};
use nodeflow_runtime::execution::ExecutionStatus;
use nodeflow_runtime::provider::TokioClock;
use nodeflow_runtime::registry::NodeRegistry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{load_workflow, print};
use crate::config::{EngineArgs, RunArgs};
use crate::{TRACING_TARGET_COMMAND, shutdown};

/// Runs the workflow once and prints the execution result.
///
/// Returns whether the execution succeeded.
pub async fn run(args: &RunArgs, engine: &EngineArgs, http: &ReqwestConfig) -> anyhow::Result<bool> {
    let workflow = load_workflow(&args.path).await?;
    let trigger = load_trigger(args).await?;

    let network = ReqwestExecutor::new(http.clone()).context("failed to create HTTP client")?;
    let registry = NodeRegistry::builtin(Arc::new(network), Arc::new(TokioClock));
    let engine = Engine::new(engine.to_config()?, registry);

    let progress = log_progress(engine.subscribe());
    let cancel = CancellationToken::new();
    let signal = tokio::spawn(shutdown::cancel_on_signal(cancel.clone()));

    let result = engine
        .run_with_cancellation(&workflow, trigger, cancel)
        .await;

    signal.abort();
    progress.abort();

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        workflow_id = %result.workflow_id,
        execution_id = %result.execution_id,
        status = %result.status,
        executed = result.executed_nodes.len(),
        errors = result.errors.len(),
        duration_secs = ?result.duration,
        "Workflow run finished"
    );

    print(&result, args.pretty)?;
    Ok(result.status == ExecutionStatus::Success)
}

/// Builds the trigger event from the optional event file and overrides.
async fn load_trigger(args: &RunArgs) -> anyhow::Result<TriggerEvent> {
    let mut event = match &args.trigger {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read trigger file {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("failed to parse trigger file {}", path.display()))?
        }
        None => TriggerEvent::default(),
    };

    if let Some(trigger_type) = args.trigger_type {
        event.trigger_type = trigger_type;
    }
    if let Some(trigger_id) = &args.trigger_id {
        event.trigger_id = Some(trigger_id.clone());
    }

    Ok(event)
}

/// Logs engine events until aborted.
fn log_progress(mut events: broadcast::Receiver<ExecutionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(target: TRACING_TARGET_COMMAND, event = ?event, "Execution progress");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: TRACING_TARGET_COMMAND, skipped, "Progress events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use clap::Parser;
    use nodeflow_runtime::definition::TriggerType;
    use serde_json::json;

    use super::*;
    use crate::config::Cli;

    fn args(trigger: Option<PathBuf>) -> RunArgs {
        RunArgs {
            path: PathBuf::from("workflow.json"),
            trigger,
            trigger_type: None,
            trigger_id: None,
            pretty: false,
        }
    }

    #[tokio::test]
    async fn test_default_trigger_is_manual() {
        let event = load_trigger(&args(None)).await.unwrap();
        assert_eq!(event.trigger_type, TriggerType::Manual);
        assert_eq!(event.payload, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_trigger_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "type": "manual", "service": "stripe", "payload": {{ "amount": 42 }} }}"#
        )
        .unwrap();

        let mut args = args(Some(file.path().to_path_buf()));
        args.trigger_type = Some(TriggerType::Webhook);
        args.trigger_id = Some("payments".into());

        let event = load_trigger(&args).await.unwrap();
        assert_eq!(event.trigger_type, TriggerType::Webhook);
        assert_eq!(event.trigger_id.as_deref(), Some("payments"));
        assert_eq!(event.service.as_deref(), Some("stripe"));
        assert_eq!(event.payload, json!({ "amount": 42 }));
    }

    #[tokio::test]
    async fn test_run_transform_workflow() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "id": "wf",
                "nodes": [{{ "id": "shape", "type": "data_transform", "data": {{
                    "mappings": [{{ "id": "m1", "source": "trigger.orderId", "target": "order" }}]
                }} }}],
                "edge": []
            }}"#
        )
        .unwrap();

        let mut args = args(None);
        args.path = file.path().to_path_buf();

        let cli = Cli::try_parse_from(["nodeflow", "validate", "unused.json"]).unwrap();
        let succeeded = run(&args, &cli.engine, &cli.http).await.unwrap();
        assert!(succeeded);
    }
}
