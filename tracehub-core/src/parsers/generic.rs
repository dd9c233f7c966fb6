//! Universal fallback parser (spec §4.2).
//!
//! Recognizes no agent-specific shape; every JSON line becomes a `meta`
//! event carrying whatever `type`/`role`/text-like fields it can find, so
//! unrecognized tools still surface in the index instead of being
//! dropped.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct GenericParser;

/// Confidence §4.2 mandates for the universal fallback.
pub const GENERIC_CONFIDENCE: f32 = 0.01;

fn first_text_like(value: &Value) -> Option<String> {
    for key in ["text", "content", "message", "body", "msg"] {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    None
}

impl AgentParser for GenericParser {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Unknown
    }

    fn can_parse(&self, _path: &str, _head_text: &str) -> f32 {
        GENERIC_CONFIDENCE
    }

    fn parse(
        &self,
        trace_id: &str,
        full_text: &str,
        base_offset: u64,
        start_index: u64,
    ) -> ParseOutput {
        let factory = EventFactory::new(trace_id);
        let mut events = Vec::new();
        let mut session_id = String::new();
        let mut index = start_index;

        for line in tokenize_lines(full_text, base_offset) {
            let raw_type = line
                .value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            for key in ["sessionId", "session_id", "sessionID"] {
                if let Some(sid) = line.value.get(key).and_then(Value::as_str) {
                    session_id = sid.to_string();
                    break;
                }
            }
            let timestamp_ms = guess_timestamp_ms(&line.value);
            let role = line
                .value
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or(&raw_type)
                .to_string();

            let mut draft = EventDraft {
                timestamp_ms,
                session_id: if session_id.is_empty() {
                    None
                } else {
                    Some(session_id.clone())
                },
                raw_type: raw_type.clone(),
                role,
                kind: Some(EventKind::Meta),
                ..Default::default()
            };
            if let Some(text) = first_text_like(&line.value) {
                draft.text_blocks.push(text);
            }

            let event = factory.build(index, line.offset, line.value.clone(), draft);
            events.push(event);
            index += 1;
        }

        ParseOutput {
            agent: AgentKind::Unknown,
            parser: "generic",
            session_id,
            events,
            parse_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_always_minimal() {
        assert_eq!(GenericParser.can_parse("/anything", "anything"), GENERIC_CONFIDENCE);
    }

    #[test]
    fn parses_unknown_shape_as_meta_events() {
        let text = "{\"foo\":\"bar\",\"text\":\"hi\"}\n";
        let out = GenericParser.parse("t1", text, 0, 1);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].kind, EventKind::Meta);
        assert_eq!(out.events[0].text_blocks, vec!["hi".to_string()]);
    }
}
