//! Pi assistant session log parser.
//!
//! Lines look like `{"kind":"message"|"tool_call"|"tool_output","speaker":
//! "user"|"assistant","body":...,"callId":...,"name":...,"input":...,
//! "output":...,"at":...}`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct PiParser;

impl AgentParser for PiParser {
    fn name(&self) -> &'static str {
        "pi"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Pi
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.pi/") || path.contains("/pi/sessions/") {
            score += 0.5;
        }
        if head_text.contains("\"speaker\"") && head_text.contains("\"kind\"") {
            score += 0.3;
        }
        if head_text.contains("\"callId\"") {
            score += 0.05;
        }
        score.min(0.85)
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
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            if let Some(sid) = line.value.get("sessionId").and_then(Value::as_str) {
                session_id = sid.to_string();
            }
            let timestamp_ms = line
                .value
                .get("at")
                .and_then(Value::as_i64)
                .or_else(|| guess_timestamp_ms(&line.value));
            let role = line
                .value
                .get("speaker")
                .and_then(Value::as_str)
                .unwrap_or(&raw_type)
                .to_string();

            let mut draft = EventDraft {
                timestamp_ms,
                session_id: Some(session_id.clone()),
                raw_type: raw_type.clone(),
                role: role.clone(),
                ..Default::default()
            };

            match raw_type.as_str() {
                "tool_call" => {
                    draft.kind = Some(EventKind::ToolUse);
                    draft.tool_use_id = line
                        .value
                        .get("callId")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.tool_name = line
                        .value
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.args_text = line.value.get("input").map(|v| v.to_string());
                    if let Some(a) = &draft.args_text {
                        draft.text_blocks.push(a.clone());
                    }
                }
                "tool_output" => {
                    draft.kind = Some(EventKind::ToolResult);
                    draft.parent_tool_use_id = line
                        .value
                        .get("callId")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.has_error = line
                        .value
                        .get("error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    draft.result_text = line.value.get("output").map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    });
                    if let Some(r) = &draft.result_text {
                        draft.text_blocks.push(r.clone());
                    }
                }
                _ => {
                    draft.kind = Some(match role.as_str() {
                        "user" => EventKind::User,
                        "assistant" => EventKind::Assistant,
                        "system" => EventKind::System,
                        _ => EventKind::Meta,
                    });
                    if let Some(body) = line.value.get("body").and_then(Value::as_str) {
                        draft.text_blocks.push(body.to_string());
                    }
                }
            }

            let event = factory.build(index, line.offset, line.value.clone(), draft);
            events.push(event);
            index += 1;
        }

        ParseOutput {
            agent: AgentKind::Pi,
            parser: "pi",
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
    fn parses_tool_call_and_output() {
        let text = "{\"kind\":\"tool_call\",\"speaker\":\"assistant\",\"callId\":\"p1\",\"name\":\"read_file\",\"input\":{\"path\":\"a.rs\"}}\n\
                    {\"kind\":\"tool_output\",\"speaker\":\"assistant\",\"callId\":\"p1\",\"output\":\"contents\"}\n";
        let out = PiParser.parse("t1", text, 0, 1);
        assert_eq!(out.events[0].kind, EventKind::ToolUse);
        assert_eq!(out.events[1].kind, EventKind::ToolResult);
        assert_eq!(out.events[1].parent_tool_use_id.as_deref(), Some("p1"));
    }
}
