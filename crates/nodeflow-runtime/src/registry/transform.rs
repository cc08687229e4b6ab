//! Data mapping behavior.

use jiff::Timestamp;
use jiff::civil::{Date, DateTime};
use jiff::fmt::strtime;
use serde_json::{Map, Number, Value, json};

use super::{NodeBehavior, NodeOutput, TRACING_TARGET};
use crate::context::NodeContext;
use crate::context::path::{self, Path};
use crate::definition::{Extra, Node, NodeKind, TransformData, TransformationType};
use crate::execution::{NodeError, NodeErrorType};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_DECIMALS: u64 = 2;

/// Builds an output object from mappings and transformations.
///
/// Without mappings the node input is passed through, so transformations can
/// rewrite fields of the input in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformBehavior;

#[async_trait::async_trait]
impl NodeBehavior for TransformBehavior {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let NodeKind::DataTransform(data) = &node.kind else {
            return Err(NodeError::new(
                NodeErrorType::InvalidConfiguration,
                format!("expected a data_transform node, found `{}`", node.node_type()),
            ));
        };

        if let Some(schema) = &data.input_schema {
            schema
                .check(ctx.input())
                .map_err(|e| failed(format!("input does not match schema: {e}")))?;
        }

        let output = transform(data, ctx)?;

        if let Some(schema) = &data.output_schema {
            schema
                .check(&output)
                .map_err(|e| failed(format!("output does not match schema: {e}")))?;
        }

        Ok(NodeOutput::new(output))
    }
}

fn failed(message: String) -> NodeError {
    NodeError::new(NodeErrorType::DataTransformationFailed, message)
}

fn parse_path(raw: &str) -> Result<Path, NodeError> {
    raw.parse::<Path>()
        .map_err(|e| NodeError::new(NodeErrorType::InvalidConfiguration, format!("invalid path `{raw}`: {e}")))
}

fn transform(data: &TransformData, ctx: &NodeContext) -> Result<Value, NodeError> {
    let mut output = if data.mappings.is_empty() {
        ctx.input().clone()
    } else {
        Value::Object(Map::new())
    };

    for mapping in &data.mappings {
        let Some(mut value) = ctx.get(&mapping.source).into_value() else {
            tracing::trace!(
                target: TRACING_TARGET,
                mapping_id = %mapping.id,
                source = %mapping.source,
                "Mapping source is absent, skipping"
            );
            continue;
        };

        if let Some(kind) = mapping.transformation {
            value = apply(kind, value, &mapping.extra)
                .map_err(|e| failed(format!("mapping `{}`: {e}", mapping.id)))?;
        }

        let target = parse_path(&mapping.target)?;
        path::assign(&mut output, target.segments(), value)
            .map_err(|e| failed(format!("mapping `{}`: {e}", mapping.id)))?;
    }

    for transformation in &data.transformations {
        let field = transformation
            .field()
            .ok_or_else(|| NodeError::missing_field("config.field"))?;
        let target = parse_path(field)?;

        let Some(value) = path::resolve(&output, target.segments()).cloned() else {
            continue;
        };
        let value = apply(transformation.transformation_type, value, &transformation.config)
            .map_err(|e| failed(format!("transformation `{}`: {e}", transformation.id)))?;
        path::assign(&mut output, target.segments(), value)
            .map_err(|e| failed(format!("transformation `{}`: {e}", transformation.id)))?;
    }

    Ok(output)
}

/// Applies a transformation to a single value.
fn apply(kind: TransformationType, value: Value, args: &Extra) -> Result<Value, String> {
    use TransformationType as T;

    let text = |value: &Value| {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| format!("`{kind}` expects a string, found {value}"))
    };

    match kind {
        T::StringUppercase => Ok(Value::String(text(&value)?.to_uppercase())),
        T::StringLowercase => Ok(Value::String(text(&value)?.to_lowercase())),
        T::StringTrim => Ok(Value::String(text(&value)?.trim().to_owned())),
        T::MathAdd | T::MathSubtract | T::MathMultiply | T::MathDivide => {
            let lhs = number(&value).ok_or_else(|| format!("`{kind}` expects a number, found {value}"))?;
            let rhs = ["value", "operand"]
                .iter()
                .find_map(|key| args.get(*key).and_then(number))
                .ok_or_else(|| format!("`{kind}` requires a numeric `value` argument"))?;

            let result = match kind {
                T::MathAdd => lhs + rhs,
                T::MathSubtract => lhs - rhs,
                T::MathMultiply => lhs * rhs,
                _ if rhs == 0.0 => return Err("division by zero".to_owned()),
                _ => lhs / rhs,
            };
            to_number(result)
        }
        T::FormatNumber => {
            let n = number(&value).ok_or_else(|| format!("`{kind}` expects a number, found {value}"))?;
            let decimals = args
                .get("decimals")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_DECIMALS) as usize;
            Ok(Value::String(format!("{n:.decimals$}")))
        }
        T::FormatDate => {
            let format = args
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_DATE_FORMAT);
            format_date(&value, format).map(Value::String)
        }
        T::CustomFunction => Err("custom functions are not supported".to_owned()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_number(result: f64) -> Result<Value, String> {
    // Integral results within the exact f64 range stay integers.
    if result.fract() == 0.0 && result.abs() < 9_007_199_254_740_992.0 {
        return Ok(json!(result as i64));
    }
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| format!("result {result} is not a finite number"))
}

fn format_date(value: &Value, format: &str) -> Result<String, String> {
    let formatted = match value {
        Value::String(s) => {
            if let Ok(ts) = s.parse::<Timestamp>() {
                strtime::format(format, ts)
            } else if let Ok(dt) = s.parse::<DateTime>() {
                strtime::format(format, dt)
            } else if let Ok(date) = s.parse::<Date>() {
                strtime::format(format, date)
            } else {
                return Err(format!("`{s}` is not a date"));
            }
        }
        Value::Number(n) => {
            let seconds = n.as_i64().ok_or_else(|| format!("`{n}` is not a unix timestamp"))?;
            let ts = Timestamp::from_second(seconds).map_err(|e| e.to_string())?;
            strtime::format(format, ts)
        }
        other => return Err(format!("`format_date` expects a date, found {other}")),
    };

    formatted.map_err(|e| e.to_string())
}
