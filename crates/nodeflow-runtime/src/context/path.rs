//! Dotted/bracket path traversal over JSON values.
//!
//! Supported syntax: `a.b.c`, `items[0].name`, `headers["x-request-id"]`,
//! `headers['x-request-id']`.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

/// Error produced when parsing or writing a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment at offset {0}")]
    EmptySegment(usize),
    #[error("unclosed bracket at offset {0}")]
    UnclosedBracket(usize),
    #[error("cannot write `{segment}` into a {found}")]
    NotAContainer { segment: String, found: &'static str },
    #[error("index {index} is out of bounds for an array of length {len}")]
    OutOfBounds { index: usize, len: usize },
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A parsed context path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Returns the parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let chars: Vec<char> = input.chars().collect();
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut i = 0;
        // Whether the previous token was a closing bracket, which may be
        // followed directly by `.` or `[` without a key in between.
        let mut after_bracket = false;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    if current.is_empty() && !after_bracket {
                        return Err(PathError::EmptySegment(i));
                    }
                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    after_bracket = false;
                    i += 1;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    let start = i;
                    let close = chars[i..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| i + offset)
                        .ok_or(PathError::UnclosedBracket(start))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(parse_bracket(inner.trim(), start)?);
                    after_bracket = true;
                    i = close + 1;
                }
                c => {
                    current.push(c);
                    after_bracket = false;
                    i += 1;
                }
            }
        }

        if !current.is_empty() {
            segments.push(Segment::Key(current));
        } else if !after_bracket {
            return Err(PathError::EmptySegment(chars.len()));
        }

        Ok(Self { segments })
    }
}

fn parse_bracket(inner: &str, offset: usize) -> Result<Segment, PathError> {
    if inner.is_empty() {
        return Err(PathError::EmptySegment(offset));
    }

    let quoted = inner.len() >= 2
        && ((inner.starts_with('"') && inner.ends_with('"'))
            || (inner.starts_with('\'') && inner.ends_with('\'')));
    if quoted {
        return Ok(Segment::Key(inner[1..inner.len() - 1].to_owned()));
    }

    Ok(match inner.parse::<usize>() {
        Ok(index) => Segment::Index(index),
        Err(_) => Segment::Key(inner.to_owned()),
    })
}

/// Result of a context lookup.
///
/// Distinguishes a path that does not exist from one that holds `null` or
/// an empty value.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Present(Value),
    Absent,
}

impl Lookup {
    /// Builds a lookup from an optional borrowed value.
    pub fn from_option(value: Option<&Value>) -> Self {
        value.map_or(Self::Absent, |v| Self::Present(v.clone()))
    }

    /// Returns whether the path resolved.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Returns whether the path did not resolve.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the resolved value.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }

    /// Consumes the lookup, returning the resolved value.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }
}

/// Resolves segments against a value.
pub fn resolve<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, step)
}

/// Resolves segments against an object map.
pub fn resolve_in<'a>(root: &'a Map<String, Value>, segments: &[Segment]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let head = match first {
        Segment::Key(key) => root.get(key)?,
        Segment::Index(index) => root.get(&index.to_string())?,
    };
    resolve(head, rest)
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        (Value::Array(items), Segment::Key(key)) => {
            key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    }
}

/// Writes a value at the given segments, creating intermediate objects.
pub fn assign(root: &mut Value, segments: &[Segment], value: Value) -> Result<(), PathError> {
    let Some((first, rest)) = segments.split_first() else {
        *root = value;
        return Ok(());
    };

    if root.is_null() {
        *root = match first {
            Segment::Index(_) => Value::Array(Vec::new()),
            Segment::Key(_) => Value::Object(Map::new()),
        };
    }

    let child = match (root, first) {
        (Value::Object(map), segment) => {
            let key = match segment {
                Segment::Key(key) => key.clone(),
                Segment::Index(index) => index.to_string(),
            };
            map.entry(key).or_insert(Value::Null)
        }
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            if *index == len {
                items.push(Value::Null);
            }
            items
                .get_mut(*index)
                .ok_or(PathError::OutOfBounds { index: *index, len })?
        }
        (other, segment) => {
            return Err(PathError::NotAContainer {
                segment: segment.to_string(),
                found: type_name(other),
            });
        }
    };

    assign(child, rest, value)
}

/// Writes a value at the given segments of an object map.
pub fn assign_in(
    root: &mut Map<String, Value>,
    segments: &[Segment],
    value: Value,
) -> Result<(), PathError> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(PathError::Empty);
    };

    let key = match first {
        Segment::Key(key) => key.clone(),
        Segment::Index(index) => index.to_string(),
    };
    assign(root.entry(key).or_insert(Value::Null), rest, value)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
