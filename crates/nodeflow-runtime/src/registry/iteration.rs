//! Loop behavior.

use serde_json::{Value, json};

use super::{NodeBehavior, NodeOutput, Route, TRACING_TARGET, evaluate_condition};
use crate::context::{Lookup, NodeContext};
use crate::definition::{LoopData, LoopType, Node, NodeKind};
use crate::execution::{NodeError, NodeErrorType};

/// Variable holding the per-loop iteration state, keyed by node id.
const LOOPS_VARIABLE: &str = "loops";

/// Advances a loop by one iteration.
///
/// Each execution decides whether the body runs again. On continue, the
/// current element is exposed as `variables.item` and its position as
/// `variables.index`; the loop's own output carries both too. The iteration
/// state lives in `variables.loops.<id>` and is cleared on exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopBehavior;

fn state_path(node: &Node) -> String {
    format!("{LOOPS_VARIABLE}[\"{}\"]", node.id)
}

fn current_index(node: &Node, ctx: &NodeContext) -> u64 {
    ctx.variable(LOOPS_VARIABLE)
        .and_then(|loops| loops.get(node.id.as_str()))
        .and_then(|state| state.get("index"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn failed(message: String) -> NodeError {
    NodeError::new(NodeErrorType::LoopExecutionFailed, message)
}

/// Returns the element of the upcoming iteration, or `None` when the loop is
/// done.
fn next_item(data: &LoopData, index: u64, ctx: &NodeContext) -> Result<Option<Value>, NodeError> {
    match data.resolved_type() {
        Some(LoopType::For) => {
            let iterations = data
                .iterations
                .ok_or_else(|| NodeError::missing_field("iterations"))?;
            Ok((index < iterations).then(|| json!(index)))
        }
        Some(LoopType::While) => {
            let condition = data
                .condition
                .as_ref()
                .ok_or_else(|| NodeError::missing_field("condition"))?;
            let holds = evaluate_condition(condition, ctx)
                .map_err(|e| failed(format!("while condition failed: {}", e.message)))?;
            Ok(holds.then(|| json!(index)))
        }
        Some(LoopType::ForEach) => {
            let path = data
                .array_path
                .as_deref()
                .ok_or_else(|| NodeError::missing_field("arrayPath"))?;
            match ctx.get(path) {
                Lookup::Present(Value::Array(items)) => Ok(usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()),
                Lookup::Present(other) => Err(failed(format!(
                    "`{path}` is not an array: {other}"
                ))),
                Lookup::Absent => Err(failed(format!("`{path}` does not exist"))),
            }
        }
        None => Err(NodeError::missing_field("loopType")),
    }
}

#[async_trait::async_trait]
impl NodeBehavior for LoopBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::Loop(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected a loop node, found `{}`", node.node_type()),
            ));
        };

        let index = current_index(node, ctx);
        let Some(item) = next_item(data, index, ctx)? else {
            tracing::debug!(
                target: TRACING_TARGET,
                node_id = %node.id,
                iterations = index,
                "Loop finished"
            );
            return Ok(NodeOutput::new(json!({ "continue": false, "iterations": index }))
                .with_variable(state_path(node), Value::Null)
                .with_route(Route::LoopExit));
        };

        let limit = ctx.max_loop_iterations();
        if index >= limit {
            return Err(failed(format!("loop exceeded the limit of {limit} iterations"))
                .with_details(json!({ "iterations": index, "limit": limit })));
        }

        tracing::trace!(
            target: TRACING_TARGET,
            node_id = %node.id,
            index,
            "Loop iteration"
        );

        Ok(NodeOutput::new(json!({ "continue": true, "index": index, "item": item }))
            .with_variable(state_path(node), json!({ "index": index + 1 }))
            .with_variable("item", item)
            .with_variable("index", json!(index))
            .with_route(Route::LoopContinue))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::ExecutionContext;
    use crate::context::tests::context;
    use crate::definition::{ComparisonOperator, Condition, TriggerEvent};

    struct Harness {
        snapshot: ExecutionContext,
        limit: u64,
    }

    impl Harness {
        fn new(trigger: Value) -> Self {
            Self {
                snapshot: context(trigger),
                limit: 1000,
            }
        }

        async fn step(&mut self, node: &Node) -> Result<NodeOutput, NodeError> {
            let ctx = NodeContext::new(
                node.id.clone(),
                Value::Null,
                Arc::new(self.snapshot.clone()),
                Arc::new(TriggerEvent::manual(self.snapshot.metadata.trigger_data.clone())),
            )
            .with_max_loop_iterations(self.limit);
            let output = LoopBehavior.execute(node, &ctx).await?;
            self.snapshot
                .assign_variables(output.variables.clone())
                .unwrap();
            Ok(output)
        }
    }

    #[tokio::test]
    async fn test_counted_loop() {
        let node = Node::new("each", LoopData::counted(2));
        let mut harness = Harness::new(Value::Null);

        let first = harness.step(&node).await.unwrap();
        assert_eq!(first.route, Route::LoopContinue);
        assert_eq!(first.value["index"], 0);

        let second = harness.step(&node).await.unwrap();
        assert_eq!(second.value["index"], 1);
        assert_eq!(harness.snapshot.get("vars.index"), Lookup::Present(json!(1)));

        let done = harness.step(&node).await.unwrap();
        assert_eq!(done.route, Route::LoopExit);
        assert_eq!(done.value, json!({ "continue": false, "iterations": 2 }));
        assert_eq!(harness.snapshot.get("vars.loops.each"), Lookup::Present(Value::Null));

        let again = harness.step(&node).await.unwrap();
        assert_eq!(again.value["index"], 0);
    }

    #[tokio::test]
    async fn test_for_each_exposes_items() {
        let node = Node::new("each", LoopData::for_each("trigger.orders"));
        let mut harness = Harness::new(json!({ "orders": [{ "id": 1 }, { "id": 2 }] }));

        harness.step(&node).await.unwrap();
        assert_eq!(harness.snapshot.get("vars.item.id"), Lookup::Present(json!(1)));

        let output = harness.step(&node).await.unwrap();
        assert_eq!(output.value["item"], json!({ "id": 2 }));
        assert_eq!(harness.snapshot.get("vars.item"), Lookup::Present(json!({ "id": 2 })));

        assert_eq!(harness.step(&node).await.unwrap().route, Route::LoopExit);
    }

    #[tokio::test]
    async fn test_for_each_requires_array() {
        let node = Node::new("each", LoopData::for_each("trigger.orders"));
        let mut harness = Harness::new(json!({ "orders": "nope" }));

        let error = harness.step(&node).await.unwrap_err();
        assert_eq!(error.kind, NodeErrorType::LoopExecutionFailed);
    }

    #[tokio::test]
    async fn test_while_loop_is_bounded() {
        let condition = Condition::new("c", "trigger.running", ComparisonOperator::Equals, true);
        let node = Node::new("spin", LoopData::repeat_while(condition));
        let mut harness = Harness::new(json!({ "running": true }));
        harness.limit = 3;

        for _ in 0..3 {
            assert_eq!(harness.step(&node).await.unwrap().route, Route::LoopContinue);
        }
        let error = harness.step(&node).await.unwrap_err();
        assert_eq!(error.kind, NodeErrorType::LoopExecutionFailed);
    }
}
