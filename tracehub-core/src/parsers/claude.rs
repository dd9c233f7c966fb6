//! Claude Code session log parser.
//!
//! Lines look like `{"type":"user"|"assistant"|"system","message":{"role":
//! ...,"content":[...]},"sessionId":...,"timestamp":...,"uuid":...}` with
//! tool calls appearing as content blocks of type `tool_use`/`tool_result`
//! inside an assistant/user message, and usage under `message.usage`.

use super::{AgentParser, EventDraft, EventFactory, ParseOutput, guess_timestamp_ms, tokenize_lines};
use crate::types::{AgentKind, EventKind};
use serde_json::Value;

pub struct ClaudeParser;

fn content_blocks<'a>(message: &'a Value) -> Vec<&'a Value> {
    match message.get("content") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::String(_)) => vec![v],
        _ => Vec::new(),
    }
}

fn block_text(block: &Value) -> Option<String> {
    if let Some(s) = block.as_str() {
        return Some(s.to_string());
    }
    match block.get("type").and_then(Value::as_str) {
        Some("text") => block.get("text").and_then(Value::as_str).map(String::from),
        Some("thinking") => block
            .get("thinking")
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    }
}

fn usage_totals(message: &Value) -> (i64, i64, i64, i64) {
    let usage = message.get("usage");
    let field = |k: &str| usage.and_then(|u| u.get(k)).and_then(Value::as_i64).unwrap_or(0);
    (
        field("input_tokens"),
        field("cache_read_input_tokens"),
        field("cache_creation_input_tokens"),
        field("output_tokens"),
    )
}

impl AgentParser for ClaudeParser {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn agent(&self) -> AgentKind {
        AgentKind::Claude
    }

    fn can_parse(&self, path: &str, head_text: &str) -> f32 {
        let mut score: f32 = 0.0;
        if path.contains("/.claude/") || path.contains("claude_code") {
            score += 0.6;
        }
        if head_text.contains("\"sessionId\"") || head_text.contains("\"uuid\"") {
            score += 0.2;
        }
        if head_text.contains("\"tool_use\"") || head_text.contains("\"tool_result\"") {
            score += 0.1;
        }
        score.min(0.95)
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
            if let Some(sid) = line.value.get("sessionId").and_then(Value::as_str) {
                session_id = sid.to_string();
            }
            let timestamp_ms = line
                .value
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp_millis())
                .or_else(|| guess_timestamp_ms(&line.value));

            let message = line.value.get("message").cloned().unwrap_or(Value::Null);
            let role = message
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

            let blocks = content_blocks(&message);
            let mut saw_tool = false;
            for block in &blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        saw_tool = true;
                        draft.kind = Some(EventKind::ToolUse);
                        draft.tool_use_id =
                            block.get("id").and_then(Value::as_str).map(String::from);
                        draft.tool_name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .map(String::from);
                        draft.args_text = block.get("input").map(|v| v.to_string());
                        if let Some(a) = &draft.args_text {
                            draft.text_blocks.push(a.clone());
                        }
                    }
                    Some("tool_result") => {
                        saw_tool = true;
                        draft.kind = Some(EventKind::ToolResult);
                        draft.parent_tool_use_id = block
                            .get("tool_use_id")
                            .and_then(Value::as_str)
                            .map(String::from);
                        draft.has_error = block
                            .get("is_error")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        draft.result_text = block.get("content").map(|v| match v.as_str() {
                            Some(s) => s.to_string(),
                            None => v.to_string(),
                        });
                        if let Some(r) = &draft.result_text {
                            draft.text_blocks.push(r.clone());
                        }
                    }
                    _ => {
                        if let Some(text) = block_text(block) {
                            draft.text_blocks.push(text);
                        }
                    }
                }
            }

            if !saw_tool {
                draft.kind = Some(match raw_type.as_str() {
                    "user" => EventKind::User,
                    "assistant" => EventKind::Assistant,
                    "system" => EventKind::System,
                    _ => EventKind::Meta,
                });
            }

            let (input, cache_read, cache_create, output) = usage_totals(&message);
            if input + cache_read + cache_create + output > 0 {
                draft.args_text = draft.args_text.or(Some(format!(
                    "usage:input={input},cache_read={cache_read},cache_create={cache_create},output={output}"
                )));
            }

            let event = factory.build(index, line.offset, line.value.clone(), draft);
            events.push(event);
            index += 1;
        }

        ParseOutput {
            agent: AgentKind::Claude,
            parser: "claude",
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
    fn parses_user_tool_use_tool_result_triple() {
        let text = "{\"type\":\"user\",\"sessionId\":\"s1\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"message\":{\"role\":\"user\",\"content\":\"hello\"}}\n\
                    {\"type\":\"assistant\",\"sessionId\":\"s1\",\"message\":{\"role\":\"assistant\",\"content\":[{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Bash\",\"input\":{\"cmd\":\"ls\"}}]}}\n\
                    {\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":[{\"type\":\"tool_result\",\"tool_use_id\":\"t1\",\"content\":\"ok\"}]}}\n";
        let out = ClaudeParser.parse("trace1", text, 0, 1);
        assert_eq!(out.session_id, "s1");
        assert_eq!(out.events.len(), 3);
        assert_eq!(out.events[1].kind, EventKind::ToolUse);
        assert_eq!(out.events[1].tool_use_id.as_deref(), Some("t1"));
        assert_eq!(out.events[2].kind, EventKind::ToolResult);
        assert_eq!(out.events[2].parent_tool_use_id.as_deref(), Some("t1"));
    }

    #[test]
    fn can_parse_scores_on_path_and_head() {
        let score = ClaudeParser.can_parse("/home/u/.claude/projects/x/s.jsonl", "\"sessionId\"");
        assert!(score > 0.5);
        let other = ClaudeParser.can_parse("/tmp/other.jsonl", "{}");
        assert!(other < score);
    }
}
