//! Branching behavior.

use std::cmp::Ordering;

use serde_json::{Value, json};

use super::{NodeBehavior, NodeOutput, Route, TRACING_TARGET};
use crate::context::{Lookup, NodeContext};
use crate::definition::{ComparisonOperator, Condition, ConditionType, Node, NodeKind};
use crate::execution::{NodeError, NodeErrorType};
use crate::graph::{FALSE_HANDLE, TRUE_HANDLE};

/// Evaluates comparisons and selects the outgoing branches.
///
/// Matching conditions select the edges labelled with their id or `true`;
/// when nothing matches, the default path (if any) and `false` are selected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionBehavior;

#[async_trait::async_trait]
impl NodeBehavior for ConditionBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::Condition(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected a condition node, found `{}`", node.node_type()),
            ));
        };
        if data.conditions.is_empty() {
            return Err(NodeError::missing_field("conditions"));
        }

        let mut matched = Vec::new();
        for condition in &data.conditions {
            if evaluate_condition(condition, ctx)? {
                matched.push(condition.id.clone());
                if data.condition_type == ConditionType::IfElse {
                    break;
                }
            }
        }

        let any = !matched.is_empty();
        let mut handles: Vec<String> = matched.iter().filter(|id| !id.is_empty()).cloned().collect();
        if any {
            handles.push(TRUE_HANDLE.to_owned());
        } else {
            handles.extend(data.default_handle().map(str::to_owned));
            handles.push(FALSE_HANDLE.to_owned());
        }

        tracing::debug!(
            target: TRACING_TARGET,
            node_id = %node.id,
            matched = ?matched,
            handles = ?handles,
            "Condition evaluated"
        );

        Ok(NodeOutput::new(json!({ "result": any, "matched": matched }))
            .with_route(Route::Branch { handles, matched: any }))
    }
}

/// Evaluates a single comparison against the node context.
///
/// The compared value is read from the condition's target path, or is the
/// node input when the condition names no field. String operands may
/// themselves be `{{path}}` templates.
pub(crate) fn evaluate_condition(
    condition: &Condition,
    ctx: &NodeContext,
) -> Result<bool, NodeError> {
    let actual = match condition.target_path() {
        Some(path) => ctx.get(&path),
        None => Lookup::Present(ctx.input().clone()),
    };
    let expected = ctx.interpolate_value(&condition.value);

    compare(condition, actual, &expected)
}

fn compare(condition: &Condition, actual: Lookup, expected: &Value) -> Result<bool, NodeError> {
    use ComparisonOperator as Op;

    let Some(actual) = actual.into_value() else {
        return Ok(matches!(condition.operator, Op::NotEquals | Op::NotContains));
    };

    let unsupported = || {
        NodeError::new(
            NodeErrorType::ConditionEvaluationFailed,
            format!(
                "cannot apply `{}` to {} and {}",
                condition.operator,
                type_name(&actual),
                type_name(expected)
            ),
        )
        .with_details(json!({ "conditionId": condition.id }))
    };

    let ordering = || order(&actual, expected).ok_or_else(unsupported);

    Ok(match condition.operator {
        Op::Equals => loose_eq(&actual, expected),
        Op::NotEquals => !loose_eq(&actual, expected),
        Op::GreaterThan => ordering()? == Ordering::Greater,
        Op::LessThan => ordering()? == Ordering::Less,
        Op::GreaterThanOrEqual => ordering()? != Ordering::Less,
        Op::LessThanOrEqual => ordering()? != Ordering::Greater,
        Op::Contains => contains(&actual, expected).ok_or_else(unsupported)?,
        Op::NotContains => !contains(&actual, expected).ok_or_else(unsupported)?,
        Op::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.starts_with(e),
            _ => false,
        },
        Op::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.ends_with(e),
            _ => false,
        },
        Op::IsEmpty => is_empty(&actual),
        Op::IsNotEmpty => !is_empty(&actual),
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            s.trim().eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => Some(s.contains(n.as_str())),
            Value::Number(n) => Some(s.contains(&n.to_string())),
            _ => None,
        },
        Value::Array(items) => Some(items.iter().any(|item| loose_eq(item, needle))),
        Value::Object(map) => needle.as_str().map(|key| map.contains_key(key)),
        Value::Null => Some(false),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::tests::context;
    use crate::definition::{ConditionData, TriggerEvent};

    fn node_context(trigger: Value) -> NodeContext {
        NodeContext::new(
            "cond".into(),
            json!({ "count": 3 }),
            Arc::new(context(trigger.clone())),
            Arc::new(TriggerEvent::manual(trigger)),
        )
    }

    fn check(operator: ComparisonOperator, field: &str, value: Value) -> Result<bool, NodeError> {
        let ctx = node_context(json!({
            "amount": 10,
            "price": "12.5",
            "name": "Ada Lovelace",
            "tags": ["vip", 7],
            "profile": { "email": "ada@example.com" },
            "empty": "",
            "nothing": null,
            "flag": true
        }));
        evaluate_condition(&Condition::new("c", field, operator, value), &ctx)
    }

    #[test]
    fn test_comparison_operators() {
        use ComparisonOperator as Op;

        assert!(check(Op::GreaterThan, "trigger.amount", json!(5)).unwrap());
        assert!(!check(Op::LessThan, "trigger.amount", json!(5)).unwrap());
        assert!(check(Op::GreaterThanOrEqual, "trigger.amount", json!("10")).unwrap());
        assert!(check(Op::LessThanOrEqual, "trigger.price", json!(12.5)).unwrap());
        assert!(check(Op::Equals, "trigger.amount", json!("10")).unwrap());
        assert!(check(Op::Equals, "trigger.flag", json!("true")).unwrap());
        assert!(check(Op::NotEquals, "trigger.name", json!("Grace")).unwrap());
        assert!(check(Op::Contains, "trigger.name", json!("Love")).unwrap());
        assert!(check(Op::Contains, "trigger.tags", json!("7")).unwrap());
        assert!(check(Op::Contains, "trigger.profile", json!("email")).unwrap());
        assert!(check(Op::NotContains, "trigger.tags", json!("basic")).unwrap());
        assert!(check(Op::StartsWith, "trigger.name", json!("Ada")).unwrap());
        assert!(check(Op::EndsWith, "trigger.name", json!("lace")).unwrap());
        assert!(check(Op::GreaterThan, "input.count", json!(2)).unwrap());
    }

    #[test]
    fn test_empty_checks_distinguish_absent() {
        use ComparisonOperator as Op;

        assert!(check(Op::IsEmpty, "trigger.empty", Value::Null).unwrap());
        assert!(check(Op::IsEmpty, "trigger.nothing", Value::Null).unwrap());
        assert!(check(Op::IsNotEmpty, "trigger.tags", Value::Null).unwrap());
        assert!(!check(Op::IsEmpty, "trigger.missing", Value::Null).unwrap());
        assert!(!check(Op::IsNotEmpty, "trigger.missing", Value::Null).unwrap());
        assert!(!check(Op::Equals, "trigger.missing", Value::Null).unwrap());
        assert!(check(Op::NotEquals, "trigger.missing", json!(1)).unwrap());
        assert!(!check(Op::GreaterThan, "trigger.missing", json!(1)).unwrap());
    }

    #[test]
    fn test_incomparable_operands_fail() {
        let error = check(ComparisonOperator::GreaterThan, "trigger.tags", json!(1)).unwrap_err();
        assert_eq!(error.kind, NodeErrorType::ConditionEvaluationFailed);
    }

    #[test]
    fn test_expected_value_is_interpolated() {
        let ctx = node_context(json!({ "amount": 10, "limit": 8 }));
        let condition = Condition::new(
            "c",
            "trigger.amount",
            ComparisonOperator::GreaterThan,
            "{{trigger.limit}}",
        );
        assert!(evaluate_condition(&condition, &ctx).unwrap());
    }

    #[tokio::test]
    async fn test_if_else_routes_first_match() {
        use ComparisonOperator as Op;

        let data = ConditionData::if_else(vec![
            Condition::new("big", "trigger.amount", Op::GreaterThan, 5),
            Condition::new("positive", "trigger.amount", Op::GreaterThan, 0),
        ]);
        let node = Node::new("cond", data);
        let output = ConditionBehavior
            .execute(&node, &node_context(json!({ "amount": 10 })))
            .await
            .unwrap();

        assert_eq!(
            output.route,
            Route::Branch {
                handles: vec!["big".into(), "true".into()],
                matched: true
            }
        );
        assert_eq!(output.value, json!({ "result": true, "matched": ["big"] }));
    }

    #[tokio::test]
    async fn test_switch_routes_every_match() {
        use ComparisonOperator as Op;

        let data = ConditionData::switch(vec![
            Condition::new("big", "trigger.amount", Op::GreaterThan, 5),
            Condition::new("small", "trigger.amount", Op::LessThan, 5),
            Condition::new("positive", "trigger.amount", Op::GreaterThan, 0),
        ]);
        let output = ConditionBehavior
            .execute(&Node::new("cond", data), &node_context(json!({ "amount": 10 })))
            .await
            .unwrap();

        assert_eq!(
            output.route,
            Route::Branch {
                handles: vec!["big".into(), "positive".into(), "true".into()],
                matched: true
            }
        );
    }

    #[tokio::test]
    async fn test_no_match_routes_default_path() {
        let data = ConditionData::if_else(vec![Condition::new(
            "big",
            "trigger.amount",
            ComparisonOperator::GreaterThan,
            100,
        )])
        .with_default_path("fallback");
        let output = ConditionBehavior
            .execute(&Node::new("cond", data), &node_context(json!({ "amount": 10 })))
            .await
            .unwrap();

        assert_eq!(
            output.route,
            Route::Branch {
                handles: vec!["fallback".into(), "false".into()],
                matched: false
            }
        );
    }
}
