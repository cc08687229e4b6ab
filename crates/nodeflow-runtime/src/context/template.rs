//! `{{path}}` placeholder interpolation.

use serde_json::Value;

use super::path::Lookup;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Replaces every `{{path}}` placeholder in `template`.
///
/// Absent paths render as an empty string, strings render raw and any other
/// value renders as compact JSON. An unclosed `{{` is kept literally.
pub fn interpolate(template: &str, resolve: &impl Fn(&str) -> Lookup) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        output.push_str(&rest[..start]);
        render(&mut output, resolve(after_open[..end].trim()));
        rest = &after_open[end + CLOSE.len()..];
    }

    output.push_str(rest);
    output
}

fn render(output: &mut String, lookup: Lookup) {
    match lookup {
        Lookup::Absent | Lookup::Present(Value::Null) => {}
        Lookup::Present(Value::String(s)) => output.push_str(&s),
        Lookup::Present(other) => output.push_str(&other.to_string()),
    }
}

/// Returns the path of a string consisting of exactly one placeholder.
fn sole_placeholder(template: &str) -> Option<&str> {
    let inner = template.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    (!inner.contains(OPEN) && !inner.contains(CLOSE)).then(|| inner.trim())
}

/// Interpolates every string leaf of a JSON value.
///
/// A string that is exactly one placeholder is replaced by the resolved value
/// itself, keeping its JSON type; absent values become `null`.
pub fn interpolate_value(value: &Value, resolve: &impl Fn(&str) -> Lookup) -> Value {
    match value {
        Value::String(s) => match sole_placeholder(s) {
            Some(path) => resolve(path).into_value().unwrap_or(Value::Null),
            None if s.contains(OPEN) => Value::String(interpolate(s, resolve)),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, resolve))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, resolve)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replaces every placeholder in `template` with `mask`.
pub fn mask_placeholders(template: &str, mask: &str) -> String {
    interpolate(template, &|_| Lookup::Present(Value::String(mask.to_owned())))
}
