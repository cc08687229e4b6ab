//! Workflow execution engine.

use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use super::event::EVENT_CHANNEL_CAPACITY;
use super::retry::Retrier;
use super::scheduler::{RunEnv, Scheduler};
use super::{EngineConfig, ExecutionEvent, TRACING_TARGET};
use crate::context::{ContextStore, ExecutionContext, ExecutionMetadata};
use crate::definition::{NodeId, TriggerEvent, TriggerType, Workflow, WorkflowId};
use crate::error::{WorkflowError, WorkflowResult};
use crate::execution::{ExecutionError, ExecutionId, ExecutionResult, ExecutionStatus};
use crate::graph::WorkflowGraph;
use crate::provider::{Clock, TokioClock, WorkflowStore};
use crate::registry::NodeRegistry;
use crate::validation::{ValidationResult, Validator};

/// The workflow execution engine.
///
/// Validates definitions, resolves the entry nodes of an invocation and
/// schedules nodes until the run completes. Runs share nothing but the
/// engine's configuration and behaviors; at most
/// [`EngineConfig::max_concurrent_runs`] execute at once.
///
/// Cloning the engine is cheap and shares the concurrency limit.
#[derive(Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    registry: NodeRegistry,
    validator: Validator,
    clock: Arc<dyn Clock>,
    semaphore: Arc<Semaphore>,
    events: broadcast::Sender<ExecutionEvent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates a new engine with the given configuration and behaviors.
    pub fn new(config: EngineConfig, registry: NodeRegistry) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_runs));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            target: TRACING_TARGET,
            max_concurrent_runs = config.max_concurrent_runs,
            max_parallel_nodes = config.max_parallel_nodes,
            execution_timeout_ms = config.execution_timeout.map(|t| t.as_millis() as u64),
            "Workflow engine initialized"
        );

        Self {
            config: Arc::new(config),
            validator: Validator::with_registry(registry.clone()),
            registry,
            clock: Arc::new(TokioClock),
            semaphore,
            events,
        }
    }

    /// Replaces the clock used for retry backoff.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the node behaviors of the engine.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Validates a workflow without running it.
    pub fn validate(&self, workflow: &Workflow) -> ValidationResult {
        self.validator.validate(workflow)
    }

    /// Subscribes to progress events of every run of this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Executes a workflow for the given trigger event.
    ///
    /// Always produces a result: failures before the first node ran, such
    /// as validation errors or an invocation no trigger accepts, are
    /// reported as typed errors on an `error` result.
    pub async fn run(&self, workflow: &Workflow, trigger: TriggerEvent) -> ExecutionResult {
        self.run_with_cancellation(workflow, trigger, CancellationToken::new())
            .await
    }

    /// Executes a workflow, stopping cooperatively once `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        workflow: &Workflow,
        trigger: TriggerEvent,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let execution_id = ExecutionId::new();
        let mut result =
            ExecutionResult::new(workflow.id.clone(), execution_id, trigger.payload.clone());

        let _permit = tokio::select! {
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    let error = WorkflowError::Internal(format!("semaphore closed: {}", e));
                    return result.fail(ExecutionError::from(&error));
                }
            },
            () = cancel.cancelled() => {
                result.finish(ExecutionStatus::Cancelled);
                return result;
            }
        };

        if !workflow.status.is_runnable() {
            let error = WorkflowError::NotRunnable(workflow.id.clone());
            return result.fail(ExecutionError::from(&error));
        }

        let validation = self.validate(workflow);
        if !validation.is_valid {
            tracing::warn!(
                target: TRACING_TARGET,
                workflow_id = %workflow.id,
                execution_id = %execution_id,
                errors = validation.errors.len(),
                "Workflow failed validation"
            );
            for issue in &validation.errors {
                result.push_error(ExecutionError::from(issue));
            }
            result.finish(ExecutionStatus::Error);
            return result;
        }

        let graph = WorkflowGraph::new(workflow);
        let entries = match entry_nodes(workflow, &graph, &trigger) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    workflow_id = %workflow.id,
                    execution_id = %execution_id,
                    error = %error,
                    "Invocation rejected"
                );
                return result.fail(ExecutionError::from(&error));
            }
        };

        tracing::info!(
            target: TRACING_TARGET,
            workflow_id = %workflow.id,
            execution_id = %execution_id,
            trigger_type = %trigger.trigger_type,
            node_count = graph.node_count(),
            entry_count = entries.len(),
            "Starting workflow execution"
        );

        let metadata = ExecutionMetadata {
            start_time: Timestamp::now(),
            trigger_type: trigger.trigger_type,
            trigger_data: trigger.payload.clone(),
            user_id: None,
            environment: self.config.environment,
        };
        let store = ContextStore::new(ExecutionContext::new(
            workflow.id.clone(),
            execution_id,
            metadata,
        ));

        result.start();
        let _ = self.events.send(ExecutionEvent::Started {
            workflow_id: workflow.id.clone(),
            execution_id,
        });

        let env = RunEnv {
            config: &self.config,
            registry: &self.registry,
            retrier: Retrier::new(Arc::clone(&self.clock)),
            events: self.events.clone(),
        };
        let result = Scheduler::new(env, &graph, &entries, store, trigger, result)
            .run(&cancel)
            .await;

        tracing::info!(
            target: TRACING_TARGET,
            workflow_id = %workflow.id,
            execution_id = %execution_id,
            status = %result.status,
            executed = result.executed_nodes.len(),
            errors = result.errors.len(),
            duration_secs = result.duration,
            "Workflow execution finished"
        );

        result
    }

    /// Loads a workflow from the store, runs it and persists the result.
    pub async fn run_stored(
        &self,
        store: &dyn WorkflowStore,
        workflow_id: &WorkflowId,
        trigger: TriggerEvent,
    ) -> WorkflowResult<ExecutionResult> {
        let workflow = store.load_workflow(workflow_id).await?;
        let result = self.run(&workflow, trigger).await;
        store.save_execution_result(&result).await?;
        Ok(result)
    }
}

/// Resolves the entry nodes of an invocation.
///
/// A workflow without any declared trigger accepts manual invocations at its
/// root nodes.
fn entry_nodes(
    workflow: &Workflow,
    graph: &WorkflowGraph,
    trigger: &TriggerEvent,
) -> WorkflowResult<Vec<NodeId>> {
    if workflow.triggers.is_empty() && trigger.trigger_type == TriggerType::Manual {
        let roots = graph.roots();
        if roots.is_empty() {
            return Err(WorkflowError::NoEntryNodes("manual".to_owned()));
        }
        return Ok(roots);
    }

    let mut matched = None;
    let mut entries: Vec<NodeId> = Vec::new();
    for config in workflow.matching_triggers(trigger) {
        matched.get_or_insert(config.id.as_str());
        for id in graph.entry_nodes(config) {
            if !entries.contains(&id) {
                entries.push(id);
            }
        }
    }

    match matched {
        None => Err(WorkflowError::NoMatchingTrigger {
            workflow_id: workflow.id.clone(),
            trigger_type: trigger.trigger_type,
        }),
        Some(trigger_id) if entries.is_empty() => {
            Err(WorkflowError::NoEntryNodes(trigger_id.to_owned()))
        }
        Some(_) => Ok(entries),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::definition::{
        ApiCallData, ComparisonOperator, Condition, ConditionData, Edge, FieldMapping,
        HttpMethod, LoopData, Node, RetryCondition, RetryConditionType, RetryConfig, TimeUnit,
        TimerData, TransformData, TriggerConfig, WebhookData, WebhookService, WorkflowStatus,
    };
    use crate::execution::{ErrorType, NodeStatus};
    use crate::provider::{MemoryStore, MockNetwork, NetworkExecutor};

    fn engine(network: MockNetwork) -> Engine {
        engine_with(EngineConfig::default(), network)
    }

    fn engine_with(config: EngineConfig, network: MockNetwork) -> Engine {
        let network: Arc<dyn NetworkExecutor> = Arc::new(network);
        Engine::new(config, NodeRegistry::builtin(network, Arc::new(TokioClock)))
    }

    fn api(id: &str, url: &str) -> Node {
        Node::new(id, ApiCallData::new(HttpMethod::Get, url))
    }

    fn status(result: &ExecutionResult, id: &str) -> NodeStatus {
        result
            .node(&NodeId::from(id))
            .map_or(NodeStatus::Pending, |r| r.status)
    }

    #[tokio::test]
    async fn test_linear_workflow_succeeds() {
        let network = MockNetwork::new().respond("https://api.test/orders/7", 200, json!({ "total": 42 }));
        let workflow = Workflow::new("wf", "linear")
            .with_node(api("fetch", "https://api.test/orders/{{trigger.orderId}}"))
            .with_node(Node::new(
                "shape",
                TransformData::new().with_mapping(FieldMapping::new("m1", "fetch.body.total", "amount")),
            ))
            .with_edge(Edge::new("e1", "fetch", "shape"))
            .with_trigger(TriggerConfig::manual("t1"));

        let result = engine(network.clone())
            .run(&workflow, TriggerEvent::manual(json!({ "orderId": 7 })))
            .await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.executed_nodes, vec![NodeId::from("fetch"), NodeId::from("shape")]);
        assert_eq!(result.output, json!({ "amount": 42 }));
        assert_eq!(network.call_count("https://api.test/orders/7"), 1);
        assert!(result.duration.is_some());
    }

    fn routed(threshold: i64, default_path: bool) -> Workflow {
        let mut condition = ConditionData::if_else(vec![Condition::new(
            "big",
            "trigger.amount",
            ComparisonOperator::GreaterThan,
            threshold,
        )]);
        if default_path {
            condition = condition.with_default_path("small");
        }

        Workflow::new("wf", "routing")
            .with_node(Node::new("check", condition))
            .with_node(api("approve", "https://api.test/approve"))
            .with_node(api("review", "https://api.test/review"))
            .with_edge(Edge::new("e1", "check", "approve").with_source_handle("big"))
            .with_edge(Edge::new("e2", "check", "review").with_source_handle("small"))
    }

    #[tokio::test]
    async fn test_condition_routes_matching_branch() {
        let network = MockNetwork::new().respond("https://api.test/approve", 200, json!("ok"));

        let result = engine(network.clone())
            .run(&routed(5, true), TriggerEvent::manual(json!({ "amount": 10 })))
            .await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(status(&result, "approve"), NodeStatus::Success);
        assert_eq!(status(&result, "review"), NodeStatus::Skipped);
        assert_eq!(network.call_count("https://api.test/review"), 0);
    }

    #[tokio::test]
    async fn test_unmatched_condition_without_default_skips() {
        let result = engine(MockNetwork::new())
            .run(&routed(50, false), TriggerEvent::manual(json!({ "amount": 10 })))
            .await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.errors.is_empty());
        assert_eq!(status(&result, "approve"), NodeStatus::Skipped);
        assert_eq!(status(&result, "review"), NodeStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failure_keeps_independent_branch_running() {
        let network = MockNetwork::new()
            .respond("https://api.test/a", 500, json!("down"))
            .respond("https://api.test/b", 200, json!("fine"));
        let workflow = Workflow::new("wf", "partial")
            .with_node(api("a", "https://api.test/a"))
            .with_node(api("after_a", "https://api.test/after"))
            .with_node(api("b", "https://api.test/b"))
            .with_edge(Edge::new("e1", "a", "after_a"));

        let result = engine(network).run(&workflow, TriggerEvent::manual(Value::Null)).await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(status(&result, "a"), NodeStatus::Error);
        assert_eq!(status(&result, "after_a"), NodeStatus::Skipped);
        assert_eq!(status(&result, "b"), NodeStatus::Success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].node_id, Some(NodeId::from("a")));
        assert_eq!(result.errors[0].kind, ErrorType::NetworkError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_with_backoff() {
        let url = "https://api.test/flaky";
        let network = MockNetwork::new()
            .respond(url, 503, json!("busy"))
            .respond(url, 503, json!("busy"))
            .respond(url, 200, json!("ok"));
        let retry = RetryConfig::exponential(3, 100, 1000)
            .with_condition(RetryCondition::new(RetryConditionType::StatusCode, 503));
        let workflow = Workflow::new("wf", "retry").with_node(api("flaky", url).with_retry(retry));
        let engine = engine(network.clone());
        let mut events = engine.subscribe();

        let start = tokio::time::Instant::now();
        let result = engine.run(&workflow, TriggerEvent::manual(Value::Null)).await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(network.call_count(url), 3);
        assert_eq!(result.node(&"flaky".into()).unwrap().retry_count, Some(2));
        assert!(start.elapsed() >= Duration::from_millis(300));

        let mut delays = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ExecutionEvent::NodeRetrying { delay_ms, .. } = event {
                delays.push(delay_ms);
            }
        }
        assert_eq!(delays, vec![100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_without_conditions_runs_once() {
        let url = "https://api.test/flaky";
        let network = MockNetwork::new()
            .respond(url, 503, json!("busy"))
            .respond(url, 200, json!("ok"));
        let workflow = Workflow::new("wf", "no-retry")
            .with_node(api("flaky", url).with_retry(RetryConfig::exponential(3, 100, 1000)));

        let result = engine(network.clone())
            .run(&workflow, TriggerEvent::manual(Value::Null))
            .await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(network.call_count(url), 1);
        assert_eq!(status(&result, "flaky"), NodeStatus::Error);
    }

    /// Drains the events and returns the nodes that succeeded, once per run.
    fn successes(events: &mut broadcast::Receiver<ExecutionEvent>) -> Vec<NodeId> {
        let mut succeeded = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ExecutionEvent::NodeFinished { node_id, status: NodeStatus::Success, .. } = event {
                succeeded.push(node_id);
            }
        }
        succeeded
    }

    fn runs_of(succeeded: &[NodeId], id: &str) -> usize {
        succeeded.iter().filter(|n| n.as_str() == id).count()
    }

    #[tokio::test]
    async fn test_nested_loops_run_inner_body_per_outer_iteration() {
        let workflow = Workflow::new("wf", "nested")
            .with_node(Node::new("outer", LoopData::counted(2)))
            .with_node(Node::new("inner", LoopData::counted(3)))
            .with_node(Node::new("body", TransformData::new()))
            .with_node(Node::new("done", TransformData::new()))
            .with_edge(Edge::new("e1", "outer", "inner").with_source_handle("body"))
            .with_edge(Edge::new("e2", "inner", "body").with_source_handle("body"))
            .with_edge(Edge::new("e3", "body", "inner"))
            .with_edge(Edge::new("e4", "inner", "outer").with_source_handle("exit"))
            .with_edge(Edge::new("e5", "outer", "done").with_source_handle("exit"));
        let engine = engine(MockNetwork::new());
        assert!(engine.validate(&workflow).warnings.is_empty());
        let mut events = engine.subscribe();

        let result = engine.run(&workflow, TriggerEvent::manual(Value::Null)).await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.errors.is_empty());
        assert_eq!(status(&result, "done"), NodeStatus::Success);
        assert_eq!(result.output, json!({ "continue": false, "iterations": 2 }));
        assert_eq!(runs_of(&successes(&mut events), "body"), 6);
    }

    #[tokio::test]
    async fn test_loop_body_with_condition_takes_one_branch_per_item() {
        let check = ConditionData::if_else(vec![Condition::new(
            "big",
            "vars.item",
            ComparisonOperator::GreaterThan,
            2,
        )]);
        let workflow = Workflow::new("wf", "loop-branch")
            .with_node(Node::new("each", LoopData::for_each("trigger.items")))
            .with_node(Node::new("check", check))
            .with_node(Node::new(
                "big",
                TransformData::new().with_mapping(FieldMapping::new("m1", "vars.item", "big")),
            ))
            .with_node(Node::new(
                "small",
                TransformData::new().with_mapping(FieldMapping::new("m1", "vars.item", "small")),
            ))
            .with_node(Node::new("done", TransformData::new()))
            .with_edge(Edge::new("e1", "each", "check").with_source_handle("body"))
            .with_edge(Edge::new("e2", "check", "big").with_source_handle("true"))
            .with_edge(Edge::new("e3", "check", "small").with_source_handle("false"))
            .with_edge(Edge::new("e4", "big", "each"))
            .with_edge(Edge::new("e5", "small", "each"))
            .with_edge(Edge::new("e6", "each", "done").with_source_handle("exit"));
        let engine = engine(MockNetwork::new());
        let mut events = engine.subscribe();

        let result = engine
            .run(&workflow, TriggerEvent::manual(json!({ "items": [1, 5, 3] })))
            .await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(status(&result, "done"), NodeStatus::Success);
        assert_eq!(result.node(&"big".into()).unwrap().output, json!({ "big": 3 }));
        assert_eq!(status(&result, "small"), NodeStatus::Skipped);

        let succeeded = successes(&mut events);
        assert_eq!(runs_of(&succeeded, "check"), 3);
        assert_eq!(runs_of(&succeeded, "big"), 2);
        assert_eq!(runs_of(&succeeded, "small"), 1);
    }

    #[tokio::test]
    async fn test_stalled_run_is_an_error() {
        // `late` only runs after the loop exits, but the body waits on it.
        let workflow = Workflow::new("wf", "stall")
            .with_node(Node::new("each", LoopData::counted(2)))
            .with_node(Node::new("body", TransformData::new()))
            .with_node(Node::new("late", TransformData::new()))
            .with_edge(Edge::new("e1", "each", "body").with_source_handle("body"))
            .with_edge(Edge::new("e2", "body", "each"))
            .with_edge(Edge::new("e3", "each", "late").with_source_handle("exit"))
            .with_edge(Edge::new("e4", "late", "body"));

        let result = engine(MockNetwork::new())
            .run(&workflow, TriggerEvent::manual(Value::Null))
            .await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorType::RuntimeError);
        assert_eq!(
            result.errors[0].details,
            Some(json!({ "nodes": ["body", "late"] }))
        );
        assert_eq!(status(&result, "body"), NodeStatus::Skipped);
    }

    #[test]
    fn test_unresolvable_entries_are_rejected() {
        let pinned = Workflow::new("wf", "pinned")
            .with_node(api("a", "https://api.test/a"))
            .with_trigger(TriggerConfig::manual("t1").with_entry_nodes(["ghost"]));
        let graph = WorkflowGraph::new(&pinned);
        let error = entry_nodes(&pinned, &graph, &TriggerEvent::manual(Value::Null)).unwrap_err();
        assert!(matches!(error, WorkflowError::NoEntryNodes(ref id) if id == "t1"));
        assert_eq!(ExecutionError::from(&error).kind, ErrorType::WorkflowError);

        let cyclic = Workflow::new("wf", "cyclic")
            .with_node(api("a", "https://api.test/a"))
            .with_node(api("b", "https://api.test/b"))
            .with_edge(Edge::new("e1", "a", "b"))
            .with_edge(Edge::new("e2", "b", "a"));
        let graph = WorkflowGraph::new(&cyclic);
        let error = entry_nodes(&cyclic, &graph, &TriggerEvent::manual(Value::Null)).unwrap_err();
        assert!(matches!(error, WorkflowError::NoEntryNodes(ref id) if id == "manual"));
    }

    #[tokio::test]
    async fn test_for_each_loop_runs_body_per_item() {
        let workflow = Workflow::new("wf", "loop")
            .with_node(Node::new("each", LoopData::for_each("trigger.items")))
            .with_node(Node::new(
                "double",
                TransformData::new().with_mapping(FieldMapping::new("m1", "vars.item", "value")),
            ))
            .with_node(Node::new("done", TransformData::new()))
            .with_edge(Edge::new("e1", "each", "double").with_source_handle("body"))
            .with_edge(Edge::new("e2", "double", "each"))
            .with_edge(Edge::new("e3", "each", "done").with_source_handle("exit"));
        let engine = engine(MockNetwork::new());
        let mut events = engine.subscribe();

        let result = engine
            .run(&workflow, TriggerEvent::manual(json!({ "items": ["a", "b", "c"] })))
            .await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(status(&result, "done"), NodeStatus::Success);
        assert_eq!(result.node(&"double".into()).unwrap().output, json!({ "value": "c" }));
        assert_eq!(result.output, json!({ "continue": false, "iterations": 3 }));

        let mut body_runs = 0;
        while let Ok(event) = events.try_recv() {
            if let ExecutionEvent::NodeFinished { node_id, status: NodeStatus::Success, .. } = event
                && node_id.as_str() == "double"
            {
                body_runs += 1;
            }
        }
        assert_eq!(body_runs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_skips_remaining_nodes() {
        let workflow = Workflow::new("wf", "cancel")
            .with_node(Node::new("wait", TimerData::delay(10.0, TimeUnit::Seconds)))
            .with_node(api("after", "https://api.test/after"))
            .with_edge(Edge::new("e1", "wait", "after"));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = engine(MockNetwork::new())
            .run_with_cancellation(&workflow, TriggerEvent::manual(Value::Null), cancel)
            .await;

        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert_eq!(status(&result, "wait"), NodeStatus::Success);
        assert_eq!(status(&result, "after"), NodeStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_timeout() {
        let workflow = Workflow::new("wf", "slow")
            .with_node(Node::new("wait", TimerData::delay(1.0, TimeUnit::Hours)));
        let config = EngineConfig {
            execution_timeout: Some(Duration::from_secs(5)),
            ..EngineConfig::default()
        };

        let result = engine_with(config, MockNetwork::new())
            .run(&workflow, TriggerEvent::manual(Value::Null))
            .await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.errors[0].kind, ErrorType::TimeoutError);
        let wait = result.node(&"wait".into()).unwrap();
        assert_eq!(wait.status, NodeStatus::Error);
        assert!(wait.error.as_ref().unwrap().is_timeout());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let workflow = Workflow::new("wf", "echo").with_node(Node::new(
            "shape",
            TransformData::new().with_mapping(FieldMapping::new("m1", "trigger.n", "n")),
        ));
        let engine = engine(MockNetwork::new());

        let runs = (0..8).map(|n| {
            let engine = engine.clone();
            let workflow = workflow.clone();
            tokio::spawn(async move { engine.run(&workflow, TriggerEvent::manual(json!({ "n": n }))).await })
        });

        for (n, run) in runs.enumerate() {
            let result = run.await.unwrap();
            assert_eq!(result.output, json!({ "n": n }));
        }
    }

    #[tokio::test]
    async fn test_optional_failure_does_not_fail_run() {
        let network = MockNetwork::new().respond("https://api.test/ok", 200, json!("ok"));
        let workflow = Workflow::new("wf", "optional")
            .with_node(api("enrich", "https://api.test/missing").optional())
            .with_node(api("store", "https://api.test/ok"))
            .with_edge(Edge::new("e1", "enrich", "store"));

        let result = engine(network).run(&workflow, TriggerEvent::manual(Value::Null)).await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(status(&result, "enrich"), NodeStatus::Error);
        assert_eq!(status(&result, "store"), NodeStatus::Success);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_invocation_without_matching_trigger() {
        let workflow = Workflow::new("wf", "hooks")
            .with_node(Node::new("hook", WebhookData::new(WebhookService::Stripe, "/hooks")))
            .with_trigger(TriggerConfig::webhook("t1").with_config("service", "stripe"));

        let result = engine(MockNetwork::new())
            .run(&workflow, TriggerEvent::manual(Value::Null))
            .await;

        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.executed_nodes.is_empty());
        assert_eq!(result.errors[0].kind, ErrorType::WorkflowError);

        let result = engine(MockNetwork::new())
            .run(&workflow, TriggerEvent::webhook("stripe", "charge.succeeded", json!({ "id": 1 })))
            .await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output["payload"], json!({ "id": 1 }));
    }

    #[tokio::test]
    async fn test_invalid_and_inactive_workflows_do_not_run() {
        let engine = engine(MockNetwork::new());

        let invalid = Workflow::new("wf", "invalid")
            .with_node(api("a", "https://api.test/a"))
            .with_edge(Edge::new("e1", "a", "ghost"));
        let result = engine.run(&invalid, TriggerEvent::manual(Value::Null)).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.errors[0].kind, ErrorType::ValidationError);
        assert!(result.node_results.is_empty());

        let archived = Workflow::new("wf", "archived")
            .with_node(api("a", "https://api.test/a"))
            .with_status(WorkflowStatus::Archived);
        let result = engine.run(&archived, TriggerEvent::manual(Value::Null)).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.errors[0].kind, ErrorType::WorkflowError);
    }

    #[tokio::test]
    async fn test_run_stored_persists_result() {
        let store = MemoryStore::new();
        store
            .insert_workflow(Workflow::new("wf", "stored").with_node(Node::new("noop", TransformData::new())))
            .await;
        let engine = engine(MockNetwork::new());

        let result = engine
            .run_stored(&store, &"wf".into(), TriggerEvent::manual(json!({ "x": 1 })))
            .await
            .unwrap();
        assert_eq!(result.output, json!({ "x": 1 }));
        assert!(store.execution_result(&result.execution_id).await.is_some());

        let missing = engine
            .run_stored(&store, &"nope".into(), TriggerEvent::manual(Value::Null))
            .await;
        assert!(matches!(missing, Err(WorkflowError::WorkflowNotFound(_))));
    }
}
