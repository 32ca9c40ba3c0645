//! Output formatting: one serialised record per line, text or JSON.

mod json;
mod text;

pub(crate) use json::format_json;
pub(crate) use text::format_text;

use std::sync::Arc;

use crate::entry::LogEntry;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    /// Parse a format name, case-insensitive. Unrecognised values default to
    /// text.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Format::Json,
            _ => Format::Text,
        }
    }
}

/// Knobs shared by both formatters. Cloned by `Arc`, so the dispatcher can
/// snapshot them per message without copying strings.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// chrono directive for the record timestamp.
    pub timestamp_format: String,
    /// JSON field keys emitted first, in this order; the rest follow
    /// alphabetically.
    pub json_field_order: Option<Vec<String>>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            timestamp_format: crate::config::DEFAULT_TIMESTAMP_FORMAT.to_string(),
            json_field_order: None,
        }
    }
}

/// Serialise one entry to the bytes written to every destination.
pub(crate) fn format_entry(entry: &LogEntry, format: Format, opts: &Arc<FormatOptions>) -> Vec<u8> {
    match format {
        Format::Text => format_text(entry, opts).into_bytes(),
        Format::Json => format_json(entry, opts).into_bytes(),
    }
}

/// Render a timestamp with the configured directive. An unparseable
/// directive falls back to RFC 3339 instead of erroring mid-pipeline.
pub(crate) fn render_timestamp(ts: &chrono::DateTime<chrono::Utc>, directive: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(directive.len() + 16);
    if write!(out, "{}", ts.format(directive)).is_err() {
        return ts.to_rfc3339();
    }
    out
}

/// Whether a chrono directive can actually render.
pub(crate) fn timestamp_directive_valid(directive: &str) -> bool {
    use std::fmt::Write;
    let mut out = String::new();
    write!(out, "{}", chrono::Utc::now().format(directive)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("json"), Format::Json);
        assert_eq!(Format::parse("JSON"), Format::Json);
        assert_eq!(Format::parse("text"), Format::Text);
        assert_eq!(Format::parse("anything"), Format::Text);
    }
}
