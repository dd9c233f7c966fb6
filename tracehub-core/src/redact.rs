//! Redactor (spec §4.3).
//!
//! Rewrites all user-visible strings on a [`NormalizedEvent`] and its raw
//! JSON value through a key/value pattern pair, with a cycle-safe
//! identity-keyed visited table so arbitrary (possibly shared) JSON
//! graphs never cause unbounded recursion.

use crate::config::RedactionConfig;
use crate::types::NormalizedEvent;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashSet;

const FALLBACK_KEY_PATTERN: &str = "(key|token|secret|password|authorization)";
const FALLBACK_VALUE_PATTERN: &str = "sk-[A-Za-z0-9]{10,}";

/// Compiled key/value pattern pair used to rewrite strings and maps.
pub struct Redactor {
    key_pattern: Regex,
    value_pattern: Regex,
    replacement: String,
}

fn compile_with_fallback(source: &str, fallback: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| {
        tracing::warn!(pattern = %source, error = %err, "regex compile failed, using fallback");
        Regex::new(fallback).expect("fallback pattern is always valid")
    })
}

/// `keyPattern` is case-insensitive by default (spec.md:94), unlike
/// `valuePattern`'s plain `(?i)`-prefix opt-in (spec.md:101) — force it
/// regardless of whether the configured source already carries `(?i)`.
fn compile_key_pattern(source: &str, fallback: &str) -> Regex {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!(pattern = %source, error = %err, "regex compile failed, using fallback");
            RegexBuilder::new(fallback)
                .case_insensitive(true)
                .build()
                .expect("fallback pattern is always valid")
        })
}

impl Redactor {
    pub fn from_config(config: &RedactionConfig) -> Self {
        Self {
            key_pattern: compile_key_pattern(&config.key_pattern, FALLBACK_KEY_PATTERN),
            value_pattern: compile_with_fallback(&config.value_pattern, FALLBACK_VALUE_PATTERN),
            replacement: config.replacement.clone(),
        }
    }

    fn redact_string(&self, s: &str) -> String {
        self.value_pattern.replace_all(s, self.replacement.as_str()).into_owned()
    }

    /// Rewrite `value` in place, tracking visited array/object pointers
    /// by identity so a re-entered subtree is returned unchanged rather
    /// than walked twice.
    fn redact_value(&self, value: &Value, visited: &mut HashSet<usize>) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_string(s)),
            Value::Array(items) => {
                let ptr = items.as_ptr() as usize;
                if !visited.insert(ptr) {
                    return value.clone();
                }
                Value::Array(items.iter().map(|v| self.redact_value(v, visited)).collect())
            }
            Value::Object(map) => {
                let ptr = map.as_ptr() as usize;
                if !visited.insert(ptr) {
                    return value.clone();
                }
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    if self.key_pattern.is_match(k) {
                        out.insert(k.clone(), Value::String(self.replacement.clone()));
                    } else {
                        out.insert(k.clone(), self.redact_value(v, visited));
                    }
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    /// Redact all user-visible string fields and the raw value on
    /// `event`, then recompute `searchText`.
    pub fn redact_event(&self, event: &mut NormalizedEvent) {
        event.preview = self.redact_string(&event.preview);
        for block in &mut event.text_blocks {
            *block = self.redact_string(block);
        }
        if let Some(a) = &mut event.args_text {
            *a = self.redact_string(a);
        }
        if let Some(r) = &mut event.result_text {
            *r = self.redact_string(r);
        }
        if let Some(t) = &mut event.toc_label {
            *t = self.redact_string(t);
        }
        let mut visited = HashSet::new();
        event.raw = self.redact_value(&event.raw, &mut visited);
        event.recompute_search_text();
    }
}

/// Redact `event` according to `config`, or return it untouched when
/// redaction is disabled (spec §4.3: enabled iff `mode != "off"` or
/// `alwaysOn = true`).
pub fn redact_event(event: &mut NormalizedEvent, config: &RedactionConfig) {
    if !config.is_enabled() {
        return;
    }
    Redactor::from_config(config).redact_event(event);
}
