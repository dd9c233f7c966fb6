//! Parser registry & agent parsers (spec §4.2).

pub mod claude;
pub mod codex;
pub mod cursor;
pub mod generic;
pub mod gemini;
pub mod opencode;
pub mod pi;

use crate::types::{AgentKind, EventKind, NormalizedEvent};
use chrono::DateTime;
use serde_json::Value;

/// First N bytes inspected by `can_parse` heuristics.
pub const HEAD_BYTES: usize = 8192;

/// Max preview length in characters (spec §3).
pub const PREVIEW_MAX_CHARS: usize = 140;

/// The outcome of parsing one trace file.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub agent: AgentKind,
    pub parser: &'static str,
    pub session_id: String,
    pub events: Vec<NormalizedEvent>,
    pub parse_error: Option<String>,
}

/// One raw line and its byte offset, as produced by [`tokenize_lines`].
pub struct RawLine<'a> {
    pub offset: u64,
    pub value: Value,
    pub text: &'a str,
}

/// Split `text` on `\n`, skip blank/invalid lines, and pair each
/// remaining JSON value with the byte offset of its line start.
/// `base_offset` shifts offsets when `text` is a suffix of a larger file.
pub fn tokenize_lines(text: &str, base_offset: u64) -> Vec<RawLine<'_>> {
    let mut out = Vec::new();
    let mut offset = base_offset;
    for line in text.split('\n') {
        let line_len = line.len() as u64;
        let trimmed = line.trim_end_matches('\r').trim();
        if !trimmed.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                out.push(RawLine {
                    offset,
                    value,
                    text: trimmed,
                });
            }
        }
        // +1 for the '\n' delimiter consumed by split.
        offset += line_len + 1;
    }
    out
}

/// Priority-ordered timestamp key list per spec §4.2.
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "time", "created_at", "createdAt", "date"];

/// Normalize a raw timestamp-bearing JSON object into ms-since-epoch,
/// trying each key in [`TIMESTAMP_KEYS`] in order.
pub fn guess_timestamp_ms(obj: &Value) -> Option<i64> {
    let map = obj.as_object()?;
    for key in TIMESTAMP_KEYS {
        if let Some(v) = map.get(*key) {
            if let Some(ms) = normalize_timestamp_value(v) {
                return Some(ms);
            }
        }
    }
    None
}

fn normalize_timestamp_value(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_f64() {
        return Some(if n > 1e12 {
            n as i64
        } else if n > 1e9 {
            (n * 1000.0) as i64
        } else {
            return None;
        });
    }
    if let Some(s) = v.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.timestamp_millis());
        }
        if let Ok(dt) = s.parse::<DateTime<chrono::Utc>>() {
            return Some(dt.timestamp_millis());
        }
    }
    None
}

/// Truncate `s` to at most `max_chars` characters at a char boundary,
/// taking only the first line.
pub fn truncate_preview(s: &str, max_chars: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    first_line.chars().take(max_chars).collect()
}

/// Shared event-construction helper used by every agent parser: fills in
/// preview, searchText, and eventId per spec §4.2 so each parser only
/// needs to supply the semantically-derived fields.
pub struct EventFactory<'a> {
    pub trace_id: &'a str,
}

/// Input gathered by a parser before calling [`EventFactory::build`].
#[derive(Default)]
pub struct EventDraft {
    pub timestamp_ms: Option<i64>,
    pub session_id: Option<String>,
    pub kind: Option<EventKind>,
    pub raw_type: String,
    pub role: String,
    pub text_blocks: Vec<String>,
    pub tool_use_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
    pub tool_name: Option<String>,
    pub tool_type: Option<String>,
    pub tool_call_id: Option<String>,
    pub function_name: Option<String>,
    pub args_text: Option<String>,
    pub result_text: Option<String>,
    pub parent_event_id: Option<String>,
    pub toc_label: Option<String>,
    pub has_error: bool,
}

impl<'a> EventFactory<'a> {
    pub fn new(trace_id: &'a str) -> Self {
        Self { trace_id }
    }

    pub fn build(&self, index: u64, offset: u64, raw: Value, draft: EventDraft) -> NormalizedEvent {
        let event_id = crate::types::event_id(self.trace_id, index, offset);
        let preview_source = draft
            .text_blocks
            .first()
            .cloned()
            .unwrap_or_else(|| draft.raw_type.clone());
        let preview = truncate_preview(&preview_source, PREVIEW_MAX_CHARS);

        let mut event = NormalizedEvent {
            event_id,
            trace_id: self.trace_id.to_string(),
            index,
            offset,
            timestamp_ms: draft.timestamp_ms,
            session_id: draft.session_id,
            kind: draft.kind.unwrap_or(EventKind::Meta),
            raw_type: draft.raw_type,
            role: draft.role,
            preview,
            text_blocks: draft.text_blocks,
            tool_use_id: draft.tool_use_id,
            parent_tool_use_id: draft.parent_tool_use_id,
            tool_name: draft.tool_name,
            tool_type: draft.tool_type,
            tool_call_id: draft.tool_call_id,
            function_name: draft.function_name,
            args_text: draft.args_text,
            result_text: draft.result_text,
            parent_event_id: draft.parent_event_id,
            toc_label: draft.toc_label,
            has_error: draft.has_error,
            search_text: String::new(),
            raw,
        };
        event.recompute_search_text();
        event
    }
}

/// A plug-in satisfying spec §4.2's parser contract.
pub trait AgentParser: Send + Sync {
    /// Stable parser name, used for tiebreak logging and `Trace.parserName`.
    fn name(&self) -> &'static str;

    /// The agent kind this parser recognizes.
    fn agent(&self) -> AgentKind;

    /// Self-reported fitness in `[0, 1]`, based on path and head-text
    /// evidence. Must be monotone in evidence and stay below 1.0 (only
    /// the generic fallback's constant counts as a score, never 1.0
    /// exactly, to leave room for a hint-driven override).
    fn can_parse(&self, path: &str, head_text: &str) -> f32;

    /// Parse `full_text` (or a byte-offset suffix of it, when called
    /// incrementally) into canonical events. `base_offset` is the byte
    /// offset of the first byte of `full_text` within the whole file;
    /// `start_index` is the 1-based index to assign to the first event.
    fn parse(
        &self,
        trace_id: &str,
        full_text: &str,
        base_offset: u64,
        start_index: u64,
    ) -> ParseOutput;
}

/// Holds an ordered list of parsers and dispatches by hint or by
/// max-confidence score (spec §4.2 Dispatch).
pub struct ParserRegistry {
    parsers: Vec<Box<dyn AgentParser>>,
}

impl ParserRegistry {
    /// Build the registry with the six built-in agent parsers, in
    /// registration order, plus the generic fallback last.
    pub fn with_builtins() -> Self {
        let parsers: Vec<Box<dyn AgentParser>> = vec![
            Box::new(claude::ClaudeParser),
            Box::new(codex::CodexParser),
            Box::new(cursor::CursorParser),
            Box::new(opencode::OpencodeParser),
            Box::new(gemini::GeminiParser),
            Box::new(pi::PiParser),
            Box::new(generic::GenericParser),
        ];
        Self { parsers }
    }

    pub fn with_parsers(parsers: Vec<Box<dyn AgentParser>>) -> Self {
        Self { parsers }
    }

    /// Select a parser for `path`/`head_text`, honoring `parser_hint`
    /// when present and non-`"unknown"`, else the highest-confidence
    /// candidate with registration-order tiebreak.
    pub fn select(&self, path: &str, head_text: &str, parser_hint: Option<&str>) -> &dyn AgentParser {
        if let Some(hint) = parser_hint {
            if hint != "unknown" {
                if let Some(p) = self
                    .parsers
                    .iter()
                    .find(|p| p.agent().as_str() == hint)
                {
                    return p.as_ref();
                }
            }
        }
        let mut best: Option<(&dyn AgentParser, f32)> = None;
        for parser in &self.parsers {
            let score = parser.can_parse(path, head_text);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((parser.as_ref(), score)),
            }
        }
        best.map(|(p, _)| p)
            .unwrap_or_else(|| self.parsers.last().expect("generic parser always registered").as_ref())
    }

    pub fn parsers(&self) -> &[Box<dyn AgentParser>] {
        &self.parsers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_skipping_blank_and_invalid_lines() {
        let text = "{\"a\":1}\n\n not json\n{\"b\":2}\n";
        let lines = tokenize_lines(text, 0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].value["a"], 1);
        assert_eq!(lines[1].value["b"], 2);
    }

    #[test]
    fn offsets_are_monotonic() {
        let text = "{\"a\":1}\n{\"b\":2}\n";
        let lines = tokenize_lines(text, 0);
        assert!(lines[1].offset > lines[0].offset);
    }

    #[test]
    fn preview_truncates_first_line_only() {
        let s = "first line is quite long but not over the limit\nsecond line ignored";
        let p = truncate_preview(s, 140);
        assert_eq!(p, "first line is quite long but not over the limit");
    }

    #[test]
    fn preview_truncates_at_char_boundary() {
        let s = "a".repeat(200);
        let p = truncate_preview(&s, 140);
        assert_eq!(p.chars().count(), 140);
    }

    #[test]
    fn timestamp_guess_prefers_first_matching_key() {
        let v = serde_json::json!({"ts": 1_700_000_000_000i64, "time": "2024-01-01T00:00:00Z"});
        assert_eq!(guess_timestamp_ms(&v), Some(1_700_000_000_000));
    }

    #[test]
    fn timestamp_guess_parses_seconds_and_iso() {
        let secs = serde_json::json!({"timestamp": 1_700_000_000});
        assert_eq!(guess_timestamp_ms(&secs), Some(1_700_000_000_000));

        let iso = serde_json::json!({"created_at": "2024-01-01T00:00:00Z"});
        assert!(guess_timestamp_ms(&iso).is_some());
    }

    #[test]
    fn registry_dispatches_by_hint() {
        let registry = ParserRegistry::with_builtins();
        let p = registry.select("/tmp/whatever.jsonl", "", Some("codex"));
        assert_eq!(p.agent(), AgentKind::Codex);
    }

    #[test]
    fn registry_falls_back_to_generic_with_no_evidence() {
        let registry = ParserRegistry::with_builtins();
        let p = registry.select("/tmp/plain.jsonl", "{}", Some("unknown"));
        assert_eq!(p.name(), "generic");
    }
}
