//! OpenCode CLI session log parser.
//!
//! Lines look like `{"type":"message","role":...,"sessionID":...,"parts":
//! [{"type":"text","text":...}|{"type":"tool","tool":...,"callID":...,
//! "state":{"status":"completed"|"error","input":...,"output":...}}]}`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct OpencodeParser;

impl AgentParser for OpencodeParser {
    fn name(&self) -> &'static str {
        "opencode"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Opencode
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.opencode/") || path.contains("opencode") {
            score += 0.55;
        }
        if head_text.contains("\"sessionID\"") || head_text.contains("\"callID\"") {
            score += 0.25;
        }
        if head_text.contains("\"parts\"") {
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
            if let Some(sid) = line.value.get("sessionID").and_then(Value::as_str) {
                session_id = sid.to_string();
            }
            let timestamp_ms = line
                .value
                .get("time")
                .and_then(|t| t.get("created"))
                .and_then(Value::as_i64)
                .or_else(|| guess_timestamp_ms(&line.value));
            let role = line
                .value
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or(&raw_type)
                .to_string();

            let parts = match line.value.get("parts") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };

            if parts.is_empty() {
                let mut draft = EventDraft {
                    timestamp_ms,
                    session_id: Some(session_id.clone()),
                    raw_type: raw_type.clone(),
                    role: role.clone(),
                    kind: Some(EventKind::Meta),
                    ..Default::default()
                };
                draft.text_blocks.push(raw_type.clone());
                let event = factory.build(index, line.offset, line.value.clone(), draft);
                events.push(event);
                index += 1;
                continue;
            }

            for part in &parts {
                let part_type = part.get("type").and_then(Value::as_str).unwrap_or("text");
                let mut draft = EventDraft {
                    timestamp_ms,
                    session_id: Some(session_id.clone()),
                    raw_type: raw_type.clone(),
                    role: role.clone(),
                    ..Default::default()
                };

                match part_type {
                    "tool" => {
                        let state = part.get("state").cloned().unwrap_or(Value::Null);
                        let status = state.get("status").and_then(Value::as_str).unwrap_or("");
                        draft.tool_use_id = part
                            .get("callID")
                            .and_then(Value::as_str)
                            .map(String::from);
                        draft.tool_name = part
                            .get("tool")
                            .and_then(Value::as_str)
                            .map(String::from);
                        if status == "completed" || status == "error" {
                            draft.kind = Some(EventKind::ToolResult);
                            draft.parent_tool_use_id = draft.tool_use_id.clone();
                            draft.has_error = status == "error";
                            draft.result_text = state.get("output").map(|v| match v.as_str() {
                                Some(s) => s.to_string(),
                                None => v.to_string(),
                            });
                            if let Some(r) = &draft.result_text {
                                draft.text_blocks.push(r.clone());
                            }
                        } else {
                            draft.kind = Some(EventKind::ToolUse);
                            draft.args_text = state.get("input").map(|v| v.to_string());
                            if let Some(a) = &draft.args_text {
                                draft.text_blocks.push(a.clone());
                            }
                        }
                    }
                    _ => {
                        draft.kind = Some(match role.as_str() {
                            "user" => EventKind::User,
                            "assistant" => EventKind::Assistant,
                            _ => EventKind::Meta,
                        });
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            draft.text_blocks.push(text.to_string());
                        }
                    }
                }

                let event = factory.build(index, line.offset, part.clone(), draft);
                events.push(event);
                index += 1;
            }
        }

        ParseOutput {
            agent: AgentKind::Opencode,
            parser: "opencode",
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
    fn splits_message_parts_into_events() {
        let text = "{\"type\":\"message\",\"role\":\"assistant\",\"sessionID\":\"s1\",\"parts\":[\
                    {\"type\":\"text\",\"text\":\"on it\"},\
                    {\"type\":\"tool\",\"tool\":\"bash\",\"callID\":\"c1\",\"state\":{\"status\":\"pending\",\"input\":{\"cmd\":\"ls\"}}}\
                    ]}\n";
        let out = OpencodeParser.parse("t1", text, 0, 1);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[1].kind, EventKind::ToolUse);
        assert_eq!(out.session_id, "s1");
    }
}
