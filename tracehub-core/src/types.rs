//! Core domain types for tracehub
//!
//! These types mirror the canonical data model described in the system
//! specification: a [`Trace`] is one log file on disk, normalized into an
//! ordered sequence of [`NormalizedEvent`]s.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

// ============================================
// Identifiers
// ============================================

/// Derive the stable 24-hex-character trace id from `(sourceProfile, absolutePath)`.
pub fn trace_id(source_profile: &str, absolute_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_profile.as_bytes());
    hasher.update([0u8]);
    hasher.update(absolute_path.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..12])
}

/// Derive a deterministic event id over `(traceId, index, offset)`.
pub fn event_id(trace_id: &str, index: u64, offset: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(trace_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(offset.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

// ============================================
// Agent kind / tier / status
// ============================================

/// The tool that produced a trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Cursor,
    Opencode,
    Gemini,
    Pi,
    Unknown,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
            AgentKind::Cursor => "cursor",
            AgentKind::Opencode => "opencode",
            AgentKind::Gemini => "gemini",
            AgentKind::Pi => "pi",
            AgentKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Residency class controlling a trace's memory footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }
}

/// Live classification of a session's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Running,
    WaitingInput,
    Idle,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Running => "running",
            ActivityStatus::WaitingInput => "waiting_input",
            ActivityStatus::Idle => "idle",
        }
    }
}

/// The kind of a normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    System,
    Assistant,
    User,
    ToolUse,
    ToolResult,
    Reasoning,
    Meta,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::System => "system",
            EventKind::Assistant => "assistant",
            EventKind::User => "user",
            EventKind::ToolUse => "tool_use",
            EventKind::ToolResult => "tool_result",
            EventKind::Reasoning => "reasoning",
            EventKind::Meta => "meta",
        }
    }
}

// ============================================
// Normalized event
// ============================================

/// One logical record inside a trace, normalized from a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Stable hash over `(traceId, index, offset)`
    pub event_id: String,
    /// Owning trace
    pub trace_id: String,
    /// 1-based index within the trace (strictly increasing)
    pub index: u64,
    /// Byte offset where the source line begins
    pub offset: u64,
    /// Normalized timestamp, ms since epoch
    pub timestamp_ms: Option<i64>,
    /// Session id parsed from the record, if present
    pub session_id: Option<String>,
    /// Normalized event kind
    pub kind: EventKind,
    /// Raw `type` field from the source record
    pub raw_type: String,
    /// Raw `role` field from the source record
    pub role: String,
    /// First line of content, truncated to 140 chars
    pub preview: String,
    /// Ordered sequence of text blocks extracted from the record
    pub text_blocks: Vec<String>,
    /// `tool_use` id this event carries (for tool_use events)
    pub tool_use_id: Option<String>,
    /// The tool_use id this event's tool_result answers
    pub parent_tool_use_id: Option<String>,
    /// Tool name, e.g. "Bash", "Read"
    pub tool_name: Option<String>,
    /// Tool type string, when distinct from name
    pub tool_type: Option<String>,
    /// Call id used to correlate a request/response pair
    pub tool_call_id: Option<String>,
    /// Function name for function-call style tool invocations
    pub function_name: Option<String>,
    /// Serialized arguments text for a tool call
    pub args_text: Option<String>,
    /// Serialized result text for a tool result
    pub result_text: Option<String>,
    /// Parent event id (conversational thread linkage)
    pub parent_event_id: Option<String>,
    /// Short label for table-of-contents display
    pub toc_label: Option<String>,
    /// Whether this event represents an error
    pub has_error: bool,
    /// Lowercased concatenation of preview, rawType, blocks, argsText, resultText
    pub search_text: String,
    /// Retained raw JSON object, subject to redaction
    pub raw: serde_json::Value,
}

impl NormalizedEvent {
    /// Recompute `searchText` from the current redactable fields.
    pub fn recompute_search_text(&mut self) {
        let mut parts: Vec<&str> = vec![&self.preview, &self.raw_type];
        parts.extend(self.text_blocks.iter().map(|s| s.as_str()));
        if let Some(ref a) = self.args_text {
            parts.push(a);
        }
        if let Some(ref r) = self.result_text {
            parts.push(r);
        }
        self.search_text = parts.join(" ").to_lowercase();
    }
}

// ============================================
// Model / token / cost summaries
// ============================================

/// Per-event-kind usage totals derived from `usage.*` fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input_tokens: i64,
    pub cached_read_tokens: i64,
    pub cached_create_tokens: i64,
    pub output_tokens: i64,
    pub reasoning_output_tokens: i64,
}

impl TokenTotals {
    pub fn total(&self) -> i64 {
        self.input_tokens
            + self.cached_read_tokens
            + self.cached_create_tokens
            + self.output_tokens
            + self.reasoning_output_tokens
    }
}

/// A model's share of a trace's output tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelShare {
    pub model: String,
    pub tokens: i64,
    pub percent: f64,
}

/// A tool's usage count within a trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCount {
    pub tool_name: String,
    pub count: u64,
}

/// One bin of the activity histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityBin {
    /// Start of the bin, ms since epoch (absent when binned by event index)
    pub start_ms: Option<i64>,
    pub count: u64,
}

/// Mode used to partition [`ActivityBin`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityBinMode {
    Time,
    EventIndex,
}

// ============================================
// Trace
// ============================================

/// One file on disk, normalized into events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub source_profile: String,
    pub path: String,
    pub agent_kind: AgentKind,
    pub parser_name: String,
    pub session_id: String,
    pub size_bytes: u64,
    pub mtime_ms: i64,
    pub first_event_ts: Option<i64>,
    pub last_event_ts: Option<i64>,
    pub event_count: u64,
    pub parseable: bool,
    pub parse_error: Option<String>,

    pub error_count: u64,
    pub tool_use_count: u64,
    pub tool_result_count: u64,
    pub unmatched_tool_uses: u64,
    pub unmatched_tool_results: u64,

    pub activity_status: ActivityStatus,
    pub activity_reason: String,
    pub activity_bins: Option<Vec<ActivityBin>>,

    pub token_totals: TokenTotals,
    pub model_token_shares: Vec<ModelShare>,
    pub context_window_pct: Option<f64>,
    pub cost_estimate_usd: Option<f64>,

    pub event_kind_counts: HashMap<String, u64>,

    pub resident_tier: Tier,
    pub materialized: bool,
    pub top_tools: Vec<ToolCount>,

    /// Monotonic version, incremented on every payload-affecting mutation.
    pub version: u64,
}

impl Trace {
    /// Construct a fresh trace shell prior to any parse, used before the
    /// first successful ingest populates summary fields.
    pub fn new_empty(id: String, source_profile: String, path: String) -> Self {
        Self {
            id,
            source_profile,
            path,
            agent_kind: AgentKind::Unknown,
            parser_name: "generic".to_string(),
            session_id: String::new(),
            size_bytes: 0,
            mtime_ms: 0,
            first_event_ts: None,
            last_event_ts: None,
            event_count: 0,
            parseable: true,
            parse_error: None,
            error_count: 0,
            tool_use_count: 0,
            tool_result_count: 0,
            unmatched_tool_uses: 0,
            unmatched_tool_results: 0,
            activity_status: ActivityStatus::Idle,
            activity_reason: "no events".to_string(),
            activity_bins: None,
            token_totals: TokenTotals::default(),
            model_token_shares: Vec::new(),
            context_window_pct: None,
            cost_estimate_usd: None,
            event_kind_counts: HashMap::new(),
            resident_tier: Tier::Hot,
            materialized: false,
            top_tools: Vec::new(),
            version: 0,
        }
    }
}
