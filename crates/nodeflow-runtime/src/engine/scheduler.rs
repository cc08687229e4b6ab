//! Event loop driving one execution.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dispatch::{NodeCompletion, NodeTask, RetryNotice};
use super::frontier::{Frontier, NodeState};
use super::retry::Retrier;
use super::{EngineConfig, ExecutionEvent, TRACING_TARGET};
use crate::context::{ContextStore, NodeContext};
use crate::definition::{NodeId, TriggerEvent};
use crate::execution::{
    ErrorType, ExecutionError, ExecutionResult, ExecutionStatus, NodeError, NodeErrorType,
    NodeStatus,
};
use crate::graph::WorkflowGraph;
use crate::registry::{NodeRegistry, Route};

/// Shared collaborators of a run.
pub(crate) struct RunEnv<'a> {
    pub config: &'a EngineConfig,
    pub registry: &'a NodeRegistry,
    pub retrier: Retrier,
    pub events: broadcast::Sender<ExecutionEvent>,
}

/// Runs the nodes of one execution to completion.
pub(crate) struct Scheduler<'a> {
    env: RunEnv<'a>,
    graph: &'a WorkflowGraph,
    frontier: Frontier<'a>,
    store: ContextStore,
    trigger: Arc<TriggerEvent>,
    result: ExecutionResult,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        env: RunEnv<'a>,
        graph: &'a WorkflowGraph,
        entries: &[NodeId],
        store: ContextStore,
        trigger: TriggerEvent,
        result: ExecutionResult,
    ) -> Self {
        Self {
            env,
            graph,
            frontier: Frontier::new(graph, entries),
            store,
            trigger: Arc::new(trigger),
            result,
        }
    }

    /// Runs until nothing is ready or running and returns the final result.
    ///
    /// Once `cancel` fires no further node starts; running nodes finish (a
    /// pending retry backoff is cut short). The run timeout aborts running
    /// nodes instead.
    pub async fn run(mut self, cancel: &CancellationToken) -> ExecutionResult {
        let node_cancel = cancel.child_token();
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let mut tasks: JoinSet<NodeCompletion> = JoinSet::new();

        let deadline = self.env.config.execution_timeout.map(|t| Instant::now() + t);
        let expired = expire(deadline);
        tokio::pin!(expired);

        let mut cancelled = false;
        let mut timed_out = false;

        self.flush().await;
        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
            }
            let stopping = cancelled || timed_out;

            if !stopping {
                self.dispatch(&mut tasks, &notice_tx, &node_cancel).await;
            }
            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = cancel.cancelled(), if !stopping => {
                    tracing::info!(
                        target: TRACING_TARGET,
                        execution_id = %self.result.execution_id,
                        running = tasks.len(),
                        "Cancellation observed, draining running nodes"
                    );
                    cancelled = true;
                }
                () = &mut expired, if !stopping => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        execution_id = %self.result.execution_id,
                        running = tasks.len(),
                        "Execution timed out"
                    );
                    timed_out = true;
                    node_cancel.cancel();
                    tasks.shutdown().await;
                    let limit = self.env.config.execution_timeout.unwrap_or_default();
                    self.result.push_error(ExecutionError::new(
                        ErrorType::TimeoutError,
                        format!("execution exceeded {}ms", limit.as_millis()),
                    ));
                }
                Some(notice) = notice_rx.recv() => self.on_retry(notice),
                Some(joined) = tasks.join_next() => {
                    while let Ok(notice) = notice_rx.try_recv() {
                        self.on_retry(notice);
                    }
                    match joined {
                        Ok(completion) => self.complete(completion).await,
                        Err(error) if error.is_cancelled() => {}
                        Err(error) => {
                            tracing::error!(
                                target: TRACING_TARGET,
                                execution_id = %self.result.execution_id,
                                error = %error,
                                "Node task panicked"
                            );
                            self.result.push_error(ExecutionError::new(
                                ErrorType::RuntimeError,
                                format!("node task panicked: {error}"),
                            ));
                        }
                    }
                }
            }
        }

        if !cancelled && !timed_out {
            self.check_stalled();
        }
        self.sweep(timed_out);
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else if !self.result.errors.is_empty() {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Success
        };

        self.result.output = self.output().await;
        self.result.finish(status);
        self.emit(ExecutionEvent::Finished {
            execution_id: self.result.execution_id,
            status,
        });
        self.result
    }

    fn emit(&self, event: ExecutionEvent) {
        // Sending only fails without subscribers.
        let _ = self.env.events.send(event);
    }

    async fn dispatch(
        &mut self,
        tasks: &mut JoinSet<NodeCompletion>,
        notices: &mpsc::UnboundedSender<RetryNotice>,
        cancel: &CancellationToken,
    ) {
        while tasks.len() < self.env.config.max_parallel_nodes {
            let Some(node_id) = self.frontier.pop_ready() else {
                break;
            };
            let Some(node) = self.graph.node(&node_id).cloned() else {
                continue;
            };

            let input = self.input_for(&node_id).await;
            self.result.restart_node(&node_id).start(input.clone());
            self.store.set_current_node(&node_id).await;
            self.emit(ExecutionEvent::NodeStarted {
                execution_id: self.result.execution_id,
                node_id: node_id.clone(),
            });

            let behavior = match self.env.registry.resolve(&node.node_type()) {
                Ok(behavior) => behavior,
                Err(error) => {
                    let error = NodeError::new(NodeErrorType::InvalidConfiguration, error.to_string());
                    self.complete(NodeCompletion {
                        node_id,
                        result: Err(error),
                        attempts: 1,
                    })
                    .await;
                    continue;
                }
            };

            tracing::debug!(
                target: TRACING_TARGET,
                execution_id = %self.result.execution_id,
                node_id = %node_id,
                node_type = %node.node_type(),
                "Dispatching node"
            );

            let ctx = NodeContext::new(
                node_id,
                input,
                self.store.snapshot().await,
                Arc::clone(&self.trigger),
            )
            .with_max_loop_iterations(self.env.config.max_loop_iterations);

            let task = NodeTask {
                timeout: node
                    .timeout_ms()
                    .map(Duration::from_millis)
                    .or(self.env.config.default_node_timeout),
                node,
                behavior,
                ctx,
                retrier: self.env.retrier.clone(),
                cancel: cancel.clone(),
                notices: notices.clone(),
            };
            tasks.spawn(task.run());
        }
    }

    /// Builds the input of a node from the outputs of its taken edges.
    ///
    /// Entry nodes receive the trigger payload; a node fed by several
    /// sources receives their outputs keyed by node id.
    async fn input_for(&self, node_id: &NodeId) -> Value {
        let sources = self.frontier.active_sources(node_id);
        match sources.as_slice() {
            [] => self.trigger.payload.clone(),
            [source] => self.store.output(source).await.unwrap_or_default(),
            _ => {
                let mut inputs = Map::new();
                for source in &sources {
                    let output = self.store.output(source).await.unwrap_or_default();
                    inputs.insert(source.as_str().to_owned(), output);
                }
                Value::Object(inputs)
            }
        }
    }

    fn on_retry(&mut self, notice: RetryNotice) {
        tracing::info!(
            target: TRACING_TARGET,
            execution_id = %self.result.execution_id,
            node_id = %notice.node_id,
            attempt = notice.attempt,
            delay_ms = notice.delay.as_millis() as u64,
            error = %notice.error,
            "Node attempt failed, retrying"
        );
        self.result.node_mut(&notice.node_id).retrying(notice.attempt);
        self.emit(ExecutionEvent::NodeRetrying {
            execution_id: self.result.execution_id,
            node_id: notice.node_id,
            attempt: notice.attempt,
            delay_ms: notice.delay.as_millis() as u64,
            error: notice.error.to_string(),
        });
    }

    async fn complete(&mut self, completion: NodeCompletion) {
        let NodeCompletion {
            node_id,
            result,
            attempts,
        } = completion;
        let Some(node) = self.graph.node(&node_id).cloned() else {
            return;
        };
        let retries = attempts.saturating_sub(1);

        match result {
            Ok(output) => {
                self.store
                    .merge(&node_id, node.config.alias.as_deref(), output.value.clone())
                    .await;
                if let Err(error) = self.store.assign_variables(output.variables).await {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        node_id = %node_id,
                        error = %error,
                        "Dropped invalid variable write"
                    );
                }

                tracing::debug!(
                    target: TRACING_TARGET,
                    execution_id = %self.result.execution_id,
                    node_id = %node_id,
                    attempts,
                    "Node completed"
                );
                self.result.node_mut(&node_id).succeed(output.value, retries);
                self.frontier.succeed(&node_id, &output.route);
            }
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    execution_id = %self.result.execution_id,
                    node_id = %node_id,
                    attempts,
                    optional = node.config.optional,
                    error = %error,
                    "Node failed"
                );
                self.result.node_mut(&node_id).fail(error.clone(), retries);

                if node.config.optional {
                    let route = if node.is_loop() {
                        Route::LoopExit
                    } else {
                        Route::Default
                    };
                    self.frontier.succeed(&node_id, &route);
                } else {
                    self.result
                        .push_error(ExecutionError::from_node_error(&node_id, &error));
                    self.frontier.fail(&node_id);
                }
            }
        }

        if !self.result.executed_nodes.contains(&node_id) {
            self.result.executed_nodes.push(node_id.clone());
        }
        let status = self
            .result
            .node(&node_id)
            .map_or(NodeStatus::Pending, |r| r.status);
        self.emit(ExecutionEvent::NodeFinished {
            execution_id: self.result.execution_id,
            node_id,
            status,
        });

        self.flush().await;
    }

    /// Records skipped nodes and clears the state of finished loops.
    async fn flush(&mut self) {
        for node_id in self.frontier.take_skipped() {
            self.result.restart_node(&node_id).skip();
            self.emit(ExecutionEvent::NodeFinished {
                execution_id: self.result.execution_id,
                node_id,
                status: NodeStatus::Skipped,
            });
        }

        for node_id in self.frontier.take_finished_loops() {
            let key = format!("loops[\"{node_id}\"]");
            if let Err(error) = self.store.set(&key, Value::Null).await {
                tracing::warn!(
                    target: TRACING_TARGET,
                    node_id = %node_id,
                    error = %error,
                    "Failed to reset loop state"
                );
            }
        }
    }

    /// Records an error when the run ended with nodes still unresolved.
    fn check_stalled(&mut self) {
        let stalled: Vec<&str> = self
            .graph
            .node_ids()
            .filter(|id| {
                matches!(
                    self.frontier.state(id),
                    Some(NodeState::Waiting | NodeState::Ready)
                )
            })
            .map(NodeId::as_str)
            .collect();
        if stalled.is_empty() {
            return;
        }

        tracing::error!(
            target: TRACING_TARGET,
            execution_id = %self.result.execution_id,
            stalled = ?stalled,
            "Execution stalled with unresolved nodes"
        );
        let message = format!("execution stalled before nodes ran: {}", stalled.join(", "));
        let error = ExecutionError::new(ErrorType::RuntimeError, message)
            .with_details(json!({ "nodes": stalled }));
        self.result.push_error(error);
    }

    /// Gives every node not yet finished a terminal result.
    fn sweep(&mut self, timed_out: bool) {
        for node_id in self.graph.node_ids() {
            match self.frontier.state(node_id) {
                Some(NodeState::Running) => {
                    let node_type = self.graph.node(node_id).map(|n| n.node_type());
                    let kind = node_type
                        .as_ref()
                        .map_or(NodeErrorType::InvalidConfiguration, NodeErrorType::for_node_type);
                    let mut error =
                        NodeError::new(kind, "node did not finish before the execution stopped");
                    if timed_out {
                        error = error.with_category(ErrorType::TimeoutError);
                    }
                    self.result.node_mut(node_id).fail(error, 0);
                }
                Some(NodeState::Waiting | NodeState::Ready) | None => {
                    self.result.node_mut(node_id).skip();
                }
                Some(NodeState::Succeeded | NodeState::Failed | NodeState::Skipped) => {}
            }
        }
    }

    /// Output of the completed sink nodes.
    async fn output(&self) -> Value {
        let mut outputs = Map::new();
        for node_id in self.graph.node_ids() {
            let succeeded = self
                .result
                .node(node_id)
                .is_some_and(|r| r.status == NodeStatus::Success);
            if !self.graph.is_sink(node_id) || !succeeded {
                continue;
            }
            let output = self.store.output(node_id).await.unwrap_or_default();
            outputs.insert(node_id.as_str().to_owned(), output);
        }

        match outputs.len() {
            0 => Value::Null,
            1 => outputs.into_iter().next().map(|(_, v)| v).unwrap_or_default(),
            _ => Value::Object(outputs),
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
