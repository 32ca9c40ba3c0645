//! Plain-text line format: `<timestamp> <LEVEL> <message>[ key=value …]`.

use std::sync::Arc;

use crate::entry::LogEntry;
use crate::format::FormatOptions;

pub(crate) fn format_text(entry: &LogEntry, opts: &Arc<FormatOptions>) -> String {
    let mut line = String::with_capacity(64 + entry.message.len());
    line.push_str(&crate::format::render_timestamp(
        &entry.timestamp,
        &opts.timestamp_format,
    ));
    line.push(' ');
    line.push_str(entry.level.as_str());
    line.push(' ');
    line.push_str(&entry.message);

    if let Some(fields) = &entry.fields {
        // BTreeMap iteration gives a stable key order.
        for (key, value) in fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            value.render_text(&mut line);
        }
    }
    if let (Some(file), Some(line_no)) = (&entry.file, entry.line) {
        line.push_str(&format!(" caller={}:{}", file, line_no));
    }
    line.push('\n');
    line
}
