//! Structural and per-node checks.

use std::collections::HashSet;

use url::Url;

use super::{TRACING_TARGET, ValidationIssue, ValidationResult, ValidationType};
use crate::context::path::Path;
use crate::context::template::mask_placeholders;
use crate::definition::{
    ConditionData, LoopType, Node, NodeId, NodeKind, TransformData, Workflow,
};
use crate::graph::{EdgeRole, FALSE_HANDLE, TRUE_HANDLE, WorkflowGraph};
use crate::registry::NodeRegistry;

/// Validates workflow definitions.
///
/// Validation is read-only and idempotent. When constructed with a
/// [`NodeRegistry`], nodes without a registered behavior are rejected too.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    registry: Option<NodeRegistry>,
}

impl Validator {
    /// Creates a validator that accepts any node type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator that rejects node types unknown to `registry`.
    pub fn with_registry(registry: NodeRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Validates a workflow.
    pub fn validate(&self, workflow: &Workflow) -> ValidationResult {
        let mut result = ValidationResult::default();

        if workflow.nodes.is_empty() {
            result.error(
                ValidationIssue::new(
                    ValidationType::RequiredFieldMissing,
                    "workflow has no nodes",
                )
                .with_field("nodes"),
            );
            return result;
        }

        check_unique_ids(workflow, &mut result);
        for node in &workflow.nodes {
            self.check_node(node, &mut result);
        }
        check_edges(workflow, &mut result);
        check_triggers(workflow, &mut result);

        let graph = WorkflowGraph::new(workflow);
        check_cycles(&graph, &mut result);
        check_branches(&graph, &mut result);
        check_reachability(workflow, &graph, &mut result);

        tracing::debug!(
            target: TRACING_TARGET,
            workflow_id = %workflow.id,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Workflow validated"
        );

        result
    }

    fn check_node(&self, node: &Node, result: &mut ValidationResult) {
        if let Some(registry) = &self.registry {
            let node_type = node.node_type();
            if !registry.contains(&node_type) {
                result.error(
                    ValidationIssue::new(
                        ValidationType::ConfigurationConflict,
                        format!("no behavior is registered for node type `{node_type}`"),
                    )
                    .for_node(&node.id)
                    .with_field("type"),
                );
            }
        }

        let mut issues = Vec::new();
        match &node.kind {
            NodeKind::Webhook(data) => {
                if data.endpoint.trim().is_empty() {
                    issues.push(required("endpoint"));
                }
            }
            NodeKind::ApiCall(data) => {
                if data.method.is_none() {
                    issues.push(required("method"));
                }
                if data.url.trim().is_empty() {
                    issues.push(required("url"));
                } else if !data.url.trim_start().starts_with("{{")
                    && let Err(e) = Url::parse(&mask_placeholders(&data.url, "x"))
                {
                    issues.push(
                        ValidationIssue::new(
                            ValidationType::InvalidFormat,
                            format!("invalid url `{}`: {e}", data.url),
                        )
                        .with_field("url"),
                    );
                }
            }
            NodeKind::Condition(data) => check_conditions(data, &mut issues),
            NodeKind::Timer(data) => {
                if !data.duration.is_finite() || data.duration < 0.0 {
                    issues.push(
                        ValidationIssue::new(
                            ValidationType::InvalidFormat,
                            "duration must be a finite, non-negative number",
                        )
                        .with_field("duration"),
                    );
                }
            }
            NodeKind::DataTransform(data) => check_transform(data, &mut issues),
            NodeKind::Loop(data) => match data.resolved_type() {
                None => issues.push(required("loopType")),
                Some(LoopType::For) if data.iterations.is_none() => {
                    issues.push(required("iterations"));
                }
                Some(LoopType::While) if data.condition.is_none() => {
                    issues.push(required("condition"));
                }
                Some(LoopType::ForEach)
                    if data.array_path.as_deref().is_none_or(|p| p.trim().is_empty()) =>
                {
                    issues.push(required("arrayPath"));
                }
                Some(_) => {}
            },
            NodeKind::Custom(_) => {}
        }

        if let Some(retry) = node.retry_config()
            && retry.enabled
        {
            if retry.max_attempts == 0 {
                issues.push(
                    ValidationIssue::new(
                        ValidationType::ConfigurationConflict,
                        "retry is enabled but maxAttempts is 0",
                    )
                    .with_field("retry.maxAttempts"),
                );
            }
            if retry.base_delay > retry.max_delay {
                issues.push(
                    ValidationIssue::new(
                        ValidationType::ConfigurationConflict,
                        format!(
                            "retry baseDelay {}ms exceeds maxDelay {}ms",
                            retry.base_delay, retry.max_delay
                        ),
                    )
                    .with_field("retry.baseDelay"),
                );
            }
        }

        for issue in issues {
            result.error(issue.for_node(&node.id));
        }
    }
}

fn required(field: &str) -> ValidationIssue {
    ValidationIssue::new(
        ValidationType::RequiredFieldMissing,
        format!("required field `{field}` is missing"),
    )
    .with_field(field)
}

fn check_conditions(data: &ConditionData, issues: &mut Vec<ValidationIssue>) {
    if data.conditions.is_empty() {
        issues.push(required("conditions"));
    }

    for (i, condition) in data.conditions.iter().enumerate() {
        if condition.operator.takes_value() && condition.target_path().is_none() {
            issues.push(required(&format!("conditions[{i}].field")));
        }
    }
}

fn check_transform(data: &TransformData, issues: &mut Vec<ValidationIssue>) {
    for (i, mapping) in data.mappings.iter().enumerate() {
        if mapping.source.trim().is_empty() {
            issues.push(required(&format!("mappings[{i}].source")));
        }
        if mapping.target.trim().is_empty() {
            issues.push(required(&format!("mappings[{i}].target")));
        } else if let Err(e) = mapping.target.parse::<Path>() {
            issues.push(
                ValidationIssue::new(
                    ValidationType::InvalidFormat,
                    format!("invalid target path `{}`: {e}", mapping.target),
                )
                .with_field(format!("mappings[{i}].target")),
            );
        }
    }

    for (i, transformation) in data.transformations.iter().enumerate() {
        if transformation.field().is_none() {
            issues.push(required(&format!("transformations[{i}].config.field")));
        }
    }
}

fn check_unique_ids(workflow: &Workflow, result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if node.id.as_str().is_empty() {
            result.error(required("id"));
        } else if !seen.insert(&node.id) {
            result.error(
                ValidationIssue::new(
                    ValidationType::InvalidFormat,
                    format!("duplicate node id `{}`", node.id),
                )
                .for_node(&node.id)
                .with_field("id"),
            );
        }
    }
}

fn check_edges(workflow: &Workflow, result: &mut ValidationResult) {
    for edge in &workflow.edges {
        for (field, endpoint) in [("source", &edge.source), ("target", &edge.target)] {
            if !workflow.contains_node(endpoint) {
                result.error(
                    ValidationIssue::new(
                        ValidationType::InvalidConnection,
                        format!("edge `{}` references unknown {field} `{endpoint}`", edge.id),
                    )
                    .with_field(format!("edges.{}.{field}", edge.id)),
                );
            }
        }
    }
}

fn check_triggers(workflow: &Workflow, result: &mut ValidationResult) {
    for trigger in &workflow.triggers {
        let Some(entries) = trigger.entry_nodes() else {
            continue;
        };
        for entry in entries.iter().filter(|id| !workflow.contains_node(id)) {
            result.error(
                ValidationIssue::new(
                    ValidationType::InvalidConnection,
                    format!("trigger `{}` references unknown node `{entry}`", trigger.id),
                )
                .with_field(format!("triggers.{}.config.nodeIds", trigger.id)),
            );
        }
    }
}

fn check_cycles(graph: &WorkflowGraph, result: &mut ValidationResult) {
    for node_id in graph.find_cycles() {
        result.error(
            ValidationIssue::new(
                ValidationType::CircularDependency,
                format!("node `{node_id}` is part of a cycle outside of any loop"),
            )
            .for_node(&node_id),
        );
    }
}

fn check_branches(graph: &WorkflowGraph, result: &mut ValidationResult) {
    let node_ids: Vec<NodeId> = graph.node_ids().cloned().collect();
    for node_id in &node_ids {
        let Some(node) = graph.node(node_id) else {
            continue;
        };
        match &node.kind {
            NodeKind::Condition(data) => check_condition_branches(graph, node_id, data, result),
            NodeKind::Loop(_) => check_loop_branches(graph, node_id, result),
            _ => {}
        }
    }
}

fn check_condition_branches(
    graph: &WorkflowGraph,
    node_id: &NodeId,
    data: &ConditionData,
    result: &mut ValidationResult,
) {
    let handles: Vec<Option<&str>> = graph
        .outgoing(node_id)
        .into_iter()
        .filter_map(|e| graph.edge(e))
        .map(|info| info.handle.as_deref())
        .collect();
    let has = |handle: &str| handles.contains(&Some(handle));
    let has_unlabelled = handles.contains(&None);

    for condition in &data.conditions {
        let covered = has_unlabelled
            || has(TRUE_HANDLE)
            || (!condition.id.is_empty() && has(&condition.id));
        if !covered {
            result.error(
                ValidationIssue::new(
                    ValidationType::ConfigurationConflict,
                    format!("condition `{}` has no outgoing edge", condition.id),
                )
                .for_node(node_id)
                .with_field("conditions"),
            );
        }
    }

    if let Some(default) = data.default_handle()
        && !has(default)
    {
        result.error(
            ValidationIssue::new(
                ValidationType::ConfigurationConflict,
                format!("default path `{default}` has no outgoing edge"),
            )
            .for_node(node_id)
            .with_field("defaultPath"),
        );
    }

    let declared = |handle: &str| {
        handle == TRUE_HANDLE
            || handle == FALSE_HANDLE
            || data.default_handle() == Some(handle)
            || data.conditions.iter().any(|c| c.id == handle)
    };
    for handle in handles.iter().flatten().filter(|h| !declared(h)) {
        result.warning(
            ValidationIssue::new(
                ValidationType::ConfigurationConflict,
                format!("edge handle `{handle}` matches no condition"),
            )
            .for_node(node_id)
            .with_field("sourceHandle"),
        );
    }
}

fn check_loop_branches(graph: &WorkflowGraph, node_id: &NodeId, result: &mut ValidationResult) {
    if graph.outgoing_with_role(node_id, EdgeRole::LoopBody).is_empty() {
        result.error(
            ValidationIssue::new(
                ValidationType::ConfigurationConflict,
                "loop has no body edge",
            )
            .for_node(node_id)
            .with_field("sourceHandle"),
        );
    } else if graph.loop_body(node_id).is_none_or(|body| body.is_empty()) {
        result.error(
            ValidationIssue::new(
                ValidationType::ConfigurationConflict,
                "loop body never returns to the loop node",
            )
            .for_node(node_id),
        );
    }

    if graph.outgoing_with_role(node_id, EdgeRole::LoopExit).is_empty() {
        result.warning(
            ValidationIssue::new(ValidationType::ConfigurationConflict, "loop has no exit edge")
                .for_node(node_id)
                .with_field("sourceHandle"),
        );
    }
}

fn check_reachability(workflow: &Workflow, graph: &WorkflowGraph, result: &mut ValidationResult) {
    let active: Vec<_> = workflow.triggers.iter().filter(|t| t.is_active).collect();
    let entries: Vec<NodeId> = if active.is_empty() {
        graph.roots()
    } else {
        active
            .iter()
            .flat_map(|trigger| graph.entry_nodes(trigger))
            .collect()
    };

    let reachable = graph.reachable_from(&entries);
    for node_id in graph.node_ids().filter(|id| !reachable.contains(*id)) {
        result.warning(
            ValidationIssue::new(
                ValidationType::OrphanedNode,
                format!("node `{node_id}` is not reachable from any trigger"),
            )
            .for_node(node_id),
        );
    }
}
