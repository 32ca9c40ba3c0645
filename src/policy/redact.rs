//! Regex-based redaction of sensitive substrings.

use regex::Regex;

use crate::entry::{FieldValue, Fields};
use crate::errors::{OmniError, Result};

/// A set of patterns sharing one replacement string. Compiled once at
/// configuration time and applied to the message text and, recursively, to
/// every string field value (keys only when `redact_keys` is set).
pub struct Redactor {
    patterns: Vec<Regex>,
    replacement: String,
    redact_keys: bool,
}

impl Redactor {
    pub fn new(patterns: &[String], replacement: &str, redact_keys: bool) -> Result<Redactor> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            compiled.push(Regex::new(pattern).map_err(|e| {
                OmniError::ConfigInvalid(format!("invalid redaction pattern '{}': {}", pattern, e))
            })?);
        }
        Ok(Redactor {
            patterns: compiled,
            replacement: replacement.to_string(),
            redact_keys,
        })
    }

    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&out) {
                out = pattern.replace_all(&out, self.replacement.as_str()).into_owned();
            }
        }
        out
    }

    pub(crate) fn redact_fields(&self, fields: &mut Fields) {
        if self.redact_keys {
            let keys: Vec<String> = fields.keys().cloned().collect();
            for key in keys {
                let clean = self.redact_text(&key);
                if clean != key {
                    if let Some(value) = fields.remove(&key) {
                        fields.insert(clean, value);
                    }
                }
            }
        }
        for value in fields.values_mut() {
            self.redact_value(value);
        }
    }

    fn redact_value(&self, value: &mut FieldValue) {
        match value {
            FieldValue::Str(s) | FieldValue::Error(s) => {
                *s = self.redact_text(s);
            }
            FieldValue::Seq(items) => {
                for item in items {
                    self.redact_value(item);
                }
            }
            FieldValue::Map(map) => self.redact_fields(map),
            // Shared values are sanitised into owned maps before redaction.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(patterns: &[&str]) -> Redactor {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        Redactor::new(&owned, "[REDACTED]", false).unwrap()
    }

    #[test]
    fn test_message_redaction() {
        let r = redactor(&[r"\b\d{16}\b"]);
        assert_eq!(
            r.redact_text("card 4111111111111111 used"),
            "card [REDACTED] used"
        );
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let r = redactor(&[r"secret-\w+"]);
        let once = r.redact_text("token secret-abc123");
        let twice = r.redact_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fields_redacted_recursively() {
        let r = redactor(&["password=\\S+"]);
        let mut inner = Fields::new();
        inner.insert("q".into(), FieldValue::Str("password=hunter2".into()));
        let mut fields = Fields::new();
        fields.insert("nested".into(), FieldValue::Map(inner));
        fields.insert(
            "list".into(),
            FieldValue::Seq(vec![FieldValue::Str("password=x".into())]),
        );
        r.redact_fields(&mut fields);

        let mut rendered = String::new();
        FieldValue::Map(fields).render_text(&mut rendered);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(rendered.matches("[REDACTED]").count(), 2);
    }

    #[test]
    fn test_keys_untouched_by_default() {
        let r = redactor(&["secret"]);
        let mut fields = Fields::new();
        fields.insert("secret".into(), FieldValue::Str("secret".into()));
        r.redact_fields(&mut fields);
        assert!(fields.contains_key("secret"));
        assert!(matches!(
            fields.get("secret"),
            Some(FieldValue::Str(s)) if s == "[REDACTED]"
        ));
    }

    #[test]
    fn test_key_redaction_opt_in() {
        let r = Redactor::new(&["secret".to_string()], "safe", true).unwrap();
        let mut fields = Fields::new();
        fields.insert("secret_key".into(), FieldValue::Uint(1));
        r.redact_fields(&mut fields);
        assert!(fields.contains_key("safe_key"));
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let result = Redactor::new(&["(".to_string()], "x", false);
        assert!(matches!(result, Err(OmniError::ConfigInvalid(_))));
    }
}
