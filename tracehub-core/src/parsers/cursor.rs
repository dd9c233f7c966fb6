//! Cursor composer session log parser.
//!
//! Lines look like `{"type":"user-message"|"ai-message"|"tool-call"|
//! "tool-result","text":...,"toolCallId":...,"toolName":...,
//! "timestamp":...}`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct CursorParser;

impl AgentParser for CursorParser {
    fn name(&self) -> &'static str {
        "cursor"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Cursor
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.cursor/") || path.contains("cursor") {
            score += 0.55;
        }
        if head_text.contains("\"ai-message\"") || head_text.contains("\"toolCallId\"") {
            score += 0.25;
        }
        if head_text.contains("\"composerId\"") {
            score += 0.1;
        }
        score.min(0.9)
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
            if let Some(sid) = line.value.get("composerId").and_then(Value::as_str) {
                session_id = sid.to_string();
            }
            let timestamp_ms = line
                .value
                .get("timestamp")
                .and_then(Value::as_i64)
                .or_else(|| guess_timestamp_ms(&line.value));

            let mut draft = EventDraft {
                timestamp_ms,
                session_id: Some(session_id.clone()),
                raw_type: raw_type.clone(),
                role: raw_type.clone(),
                ..Default::default()
            };

            if let Some(text) = line.value.get("text").and_then(Value::as_str) {
                draft.text_blocks.push(text.to_string());
            }

            match raw_type.as_str() {
                "user-message" => draft.kind = Some(EventKind::User),
                "ai-message" => draft.kind = Some(EventKind::Assistant),
                "tool-call" => {
                    draft.kind = Some(EventKind::ToolUse);
                    draft.tool_use_id = line
                        .value
                        .get("toolCallId")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.tool_name = line
                        .value
                        .get("toolName")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.args_text = line.value.get("args").map(|v| v.to_string());
                    if let Some(a) = &draft.args_text {
                        draft.text_blocks.push(a.clone());
                    }
                }
                "tool-result" => {
                    draft.kind = Some(EventKind::ToolResult);
                    draft.parent_tool_use_id = line
                        .value
                        .get("toolCallId")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.has_error = line
                        .value
                        .get("error")
                        .map(|v| !v.is_null())
                        .unwrap_or(false);
                    draft.result_text = line.value.get("result").map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    });
                    if let Some(r) = &draft.result_text {
                        draft.text_blocks.push(r.clone());
                    }
                }
                _ => draft.kind = Some(EventKind::Meta),
            }

            let event = factory.build(index, line.offset, line.value.clone(), draft);
            events.push(event);
            index += 1;
        }

        ParseOutput {
            agent: AgentKind::Cursor,
            parser: "cursor",
            session_id,
            events,
            parse_error: None,
        }
    }
}
