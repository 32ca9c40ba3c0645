//! Structured log records and their field values.
//!
//! A [`LogEntry`] is one record flowing through the pipeline. Field values are
//! a tagged union over the primitive types callers attach to records, plus
//! nested sequences and mappings. Field maps use `BTreeMap` so serialised key
//! order is stable (alphabetical).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::levels::Level;

/// Sentinel emitted in place of a value that refers back to itself.
pub const CIRCULAR_SENTINEL: &str = "[circular reference detected]";
/// Sentinel emitted in place of values nested deeper than [`MAX_FIELD_DEPTH`].
pub const DEPTH_SENTINEL: &str = "[max depth exceeded]";
/// Maximum nesting depth of a field mapping before values are cut off.
pub const MAX_FIELD_DEPTH: usize = 10;

/// A string-keyed field mapping attached to a log record.
pub type Fields = BTreeMap<String, FieldValue>;

/// A field mapping that can be shared (and therefore can form reference
/// cycles, which the sanitiser breaks at serialisation time). Readers take
/// the lock shared, so concurrent producers logging the same graph do not
/// contend.
pub type SharedFields = Arc<RwLock<Fields>>;

/// A single field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    /// A UTC instant, serialised as RFC 3339.
    Time(DateTime<Utc>),
    Duration(Duration),
    /// A captured error description.
    Error(String),
    Seq(Vec<FieldValue>),
    Map(Fields),
    /// A shared mapping. The only way to build an aliased (possibly cyclic)
    /// value graph; resolved into an owned tree before enqueue.
    Shared(SharedFields),
}

impl FieldValue {
    /// Wrap a field map for shared (aliasable) use.
    pub fn shared(fields: Fields) -> (SharedFields, FieldValue) {
        let shared = Arc::new(RwLock::new(fields));
        (shared.clone(), FieldValue::Shared(shared))
    }

    /// Render the value for the text formatter.
    pub(crate) fn render_text(&self, out: &mut String) {
        match self {
            FieldValue::Null => out.push_str("null"),
            FieldValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            FieldValue::Int(i) => out.push_str(&i.to_string()),
            FieldValue::Uint(u) => out.push_str(&u.to_string()),
            FieldValue::Float(f) => out.push_str(&f.to_string()),
            FieldValue::Str(s) | FieldValue::Error(s) => out.push_str(s),
            FieldValue::Time(t) => out.push_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
            FieldValue::Duration(d) => out.push_str(&format!("{:?}", d)),
            FieldValue::Seq(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render_text(out);
                }
                out.push(']');
            }
            FieldValue::Map(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push('=');
                    v.render_text(out);
                }
                out.push('}');
            }
            // Shared values are resolved by sanitisation before formatting;
            // render defensively without locking twice.
            FieldValue::Shared(_) => out.push_str(CIRCULAR_SENTINEL),
        }
    }

    /// Convert to a `serde_json::Value` for the JSON formatter.
    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Uint(u) => serde_json::Value::from(*u),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Str(s) | FieldValue::Error(s) => serde_json::Value::String(s.clone()),
            FieldValue::Time(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
            FieldValue::Duration(d) => serde_json::Value::String(format!("{:?}", d)),
            FieldValue::Seq(items) => {
                serde_json::Value::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Map(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(out)
            }
            FieldValue::Shared(_) => serde_json::Value::String(CIRCULAR_SENTINEL.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_text(&mut out);
        f.write_str(&out)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

/// One structured log record.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: Option<Fields>,
    /// Captured call site.
    pub file: Option<String>,
    pub line: Option<u32>,
    pub stack_trace: Option<String>,
}

impl LogEntry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: None,
            file: None,
            line: None,
            stack_trace: None,
        }
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_call_site(mut self, file: &str, line: u32) -> Self {
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }
}

/// Resolve shared nodes into owned values, replacing cycles with
/// [`CIRCULAR_SENTINEL`] and values nested past [`MAX_FIELD_DEPTH`] with
/// [`DEPTH_SENTINEL`]. The result contains no `Shared` variants.
pub(crate) fn sanitize_fields(fields: &Fields) -> Fields {
    let mut visited: SmallVec<[usize; 8]> = SmallVec::new();
    sanitize_map(fields, 1, &mut visited)
}

fn sanitize_map(map: &Fields, depth: usize, visited: &mut SmallVec<[usize; 8]>) -> Fields {
    let mut out = Fields::new();
    for (k, v) in map {
        out.insert(k.clone(), sanitize_value(v, depth, visited));
    }
    out
}

fn sanitize_value(value: &FieldValue, depth: usize, visited: &mut SmallVec<[usize; 8]>) -> FieldValue {
    if depth > MAX_FIELD_DEPTH {
        return FieldValue::Str(DEPTH_SENTINEL.to_string());
    }
    match value {
        FieldValue::Shared(shared) => {
            let ptr = Arc::as_ptr(shared) as usize;
            if visited.contains(&ptr) {
                return FieldValue::Str(CIRCULAR_SENTINEL.to_string());
            }
            visited.push(ptr);
            let inner = shared.read();
            let resolved = FieldValue::Map(sanitize_map(&inner, depth + 1, visited));
            drop(inner);
            visited.pop();
            resolved
        }
        FieldValue::Map(map) => FieldValue::Map(sanitize_map(map, depth + 1, visited)),
        FieldValue::Seq(items) => FieldValue::Seq(
            items
                .iter()
                .map(|item| sanitize_value(item, depth + 1, visited))
                .collect(),
        ),
        other => other.clone(),
    }
}
