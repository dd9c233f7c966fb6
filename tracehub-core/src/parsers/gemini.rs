//! Gemini CLI session log parser.
//!
//! Lines look like `{"role":"user"|"model","parts":[{"text":...}|
//! {"functionCall":{"name":...,"args":...}}|{"functionResponse":{"name":
//! ...,"response":...}}],"timestamp":...}`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct GeminiParser;

impl AgentParser for GeminiParser {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Gemini
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.gemini/") || path.contains("gemini") {
            score += 0.55;
        }
        if head_text.contains("\"functionCall\"") || head_text.contains("\"functionResponse\"") {
            score += 0.25;
        }
        if head_text.contains("\"parts\"") && head_text.contains("\"model\"") {
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
        let session_id = String::new();
        let mut index = start_index;

        for line in tokenize_lines(full_text, base_offset) {
            let role = line
                .value
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let timestamp_ms = guess_timestamp_ms(&line.value);

            let parts = match line.value.get("parts") {
                Some(Value::Array(items)) => items.clone(),
                _ => vec![line.value.clone()],
            };

            for part in &parts {
                let mut draft = EventDraft {
                    timestamp_ms,
                    session_id: None,
                    raw_type: role.clone(),
                    role: role.clone(),
                    ..Default::default()
                };

                if let Some(call) = part.get("functionCall") {
                    draft.kind = Some(EventKind::ToolUse);
                    draft.function_name = call
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.tool_name = draft.function_name.clone();
                    draft.args_text = call.get("args").map(|v| v.to_string());
                    if let Some(a) = &draft.args_text {
                        draft.text_blocks.push(a.clone());
                    }
                } else if let Some(resp) = part.get("functionResponse") {
                    draft.kind = Some(EventKind::ToolResult);
                    draft.function_name = resp
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from);
                    draft.result_text = resp.get("response").map(|v| v.to_string());
                    if let Some(r) = &draft.result_text {
                        draft.text_blocks.push(r.clone());
                    }
                } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                    draft.kind = Some(match role.as_str() {
                        "user" => EventKind::User,
                        "model" => EventKind::Assistant,
                        _ => EventKind::Meta,
                    });
                    draft.text_blocks.push(text.to_string());
                } else {
                    draft.kind = Some(EventKind::Meta);
                }

                let event = factory.build(index, line.offset, part.clone(), draft);
                events.push(event);
                index += 1;
            }
        }

        ParseOutput {
            agent: AgentKind::Gemini,
            parser: "gemini",
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
    fn parses_function_call_and_response() {
        let text = "{\"role\":\"model\",\"parts\":[{\"functionCall\":{\"name\":\"search\",\"args\":{\"q\":\"x\"}}}]}\n\
                    {\"role\":\"user\",\"parts\":[{\"functionResponse\":{\"name\":\"search\",\"response\":{\"ok\":true}}}]}\n";
        let out = GeminiParser.parse("t1", text, 0, 1);
        assert_eq!(out.events[0].kind, EventKind::ToolUse);
        assert_eq!(out.events[1].kind, EventKind::ToolResult);
    }
}
