//! Codex CLI session log parser.
//!
//! Lines look like `{"type":"response_item","role":...,"content":[{"type":
//! "input_text"|"output_text","text":...}], "call_id":..., "name":...,
//! "arguments":..., "usage":{"input_tokens","output_tokens"}}`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct CodexParser;

impl AgentParser for CodexParser {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Codex
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.codex/") || path.contains("codex") {
            score += 0.55;
        }
        if head_text.contains("\"response_item\"") || head_text.contains("\"call_id\"") {
            score += 0.25;
        }
        if head_text.contains("\"reasoning\"") {
            score += 0.05;
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
            if let Some(sid) = line.value.get("session_id").and_then(Value::as_str) {
                session_id = sid.to_string();
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
                session_id: Some(session_id.clone()),
                raw_type: raw_type.clone(),
                role: role.clone(),
                ..Default::default()
            };

            if let Some(call_id) = line.value.get("call_id").and_then(Value::as_str) {
                if raw_type == "function_call" {
                    draft.kind = Some(EventKind::ToolUse);
                    draft.tool_use_id = Some(call_id.to_string());
                    draft.tool_call_id = Some(call_id.to_string());
                    draft.function_name = line
                        .value
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.args_text = line.value.get("arguments").map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    });
                    if let Some(a) = &draft.args_text {
                        draft.text_blocks.push(a.clone());
                    }
                } else if raw_type == "function_call_output" {
                    draft.kind = Some(EventKind::ToolResult);
                    draft.parent_tool_use_id = Some(call_id.to_string());
                    draft.tool_call_id = Some(call_id.to_string());
                    draft.result_text = line.value.get("output").map(|v| match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    });
                    if let Some(r) = &draft.result_text {
                        draft.text_blocks.push(r.clone());
                    }
                }
            }

            if draft.kind.is_none() {
                if let Some(Value::Array(items)) = line.value.get("content") {
                    for item in items {
                        if let Some(text) = item.get("text").and_then(Value::as_str) {
                            draft.text_blocks.push(text.to_string());
                        }
                    }
                }
                draft.kind = Some(match role.as_str() {
                    "user" => EventKind::User,
                    "assistant" => EventKind::Assistant,
                    "system" => EventKind::System,
                    _ if raw_type == "reasoning" => EventKind::Reasoning,
                    _ => EventKind::Meta,
                });
            }

            let event = factory.build(index, line.offset, line.value.clone(), draft);
            events.push(event);
            index += 1;
        }

        ParseOutput {
            agent: AgentKind::Codex,
            parser: "codex",
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
    fn parses_function_call_and_output_pair() {
        let text = "{\"type\":\"function_call\",\"call_id\":\"c1\",\"name\":\"shell\",\"arguments\":\"{\\\"cmd\\\":\\\"ls\\\"}\"}\n\
                    {\"type\":\"function_call_output\",\"call_id\":\"c1\",\"output\":\"ok\"}\n";
        let out = CodexParser.parse("t1", text, 0, 1);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].kind, EventKind::ToolUse);
        assert_eq!(out.events[1].kind, EventKind::ToolResult);
        assert_eq!(out.events[1].parent_tool_use_id.as_deref(), Some("c1"));
    }
}
