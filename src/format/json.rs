//! JSON line format: one object per line.
//!
//! Minimum keys are `timestamp`, `level`, `message`; `fields`, `file`,
//! `line`, and `stack_trace` appear when present. Field map keys are emitted
//! alphabetically unless an ordered-field list is configured, in which case
//! the listed keys come first.

use std::sync::Arc;

use serde_json::Value;

use crate::entry::{Fields, LogEntry};
use crate::format::FormatOptions;

pub(crate) fn format_json(entry: &LogEntry, opts: &Arc<FormatOptions>) -> String {
    let mut line = String::with_capacity(96 + entry.message.len());
    line.push('{');

    push_pair(
        &mut line,
        "timestamp",
        &Value::String(crate::format::render_timestamp(
            &entry.timestamp,
            &opts.timestamp_format,
        )),
    );
    line.push(',');
    push_pair(&mut line, "level", &Value::String(entry.level.as_str().to_string()));
    line.push(',');
    push_pair(&mut line, "message", &Value::String(entry.message.clone()));

    if let Some(fields) = &entry.fields {
        line.push(',');
        push_key(&mut line, "fields");
        push_fields(&mut line, fields, opts.json_field_order.as_deref());
    }
    if let Some(file) = &entry.file {
        line.push(',');
        push_pair(&mut line, "file", &Value::String(file.clone()));
    }
    if let Some(line_no) = entry.line {
        line.push(',');
        push_pair(&mut line, "line", &Value::from(line_no));
    }
    if let Some(stack) = &entry.stack_trace {
        line.push(',');
        push_pair(&mut line, "stack_trace", &Value::String(stack.clone()));
    }

    line.push('}');
    line.push('\n');
    line
}

fn push_key(line: &mut String, key: &str) {
    line.push_str(&serde_json::to_string(key).unwrap_or_else(|_| "\"\"".into()));
    line.push(':');
}

fn push_pair(line: &mut String, key: &str, value: &Value) {
    push_key(line, key);
    line.push_str(&value.to_string());
}

fn push_fields(line: &mut String, fields: &Fields, order: Option<&[String]>) {
    line.push('{');
    let mut first = true;
    let mut emit = |line: &mut String, key: &str, value: &Value| {
        if !first {
            line.push(',');
        }
        first = false;
        push_pair(line, key, value);
    };

    if let Some(order) = order {
        for key in order {
            if let Some(value) = fields.get(key) {
                emit(line, key, &value.to_json());
            }
        }
        for (key, value) in fields {
            if !order.contains(key) {
                emit(line, key, &value.to_json());
            }
        }
    } else {
        for (key, value) in fields {
            emit(line, key, &value.to_json());
        }
    }
    line.push('}');
}
