//! Aggregator (spec §4.6): pure functions over a trace's events and
//! config that produce derived summary fields. None of these functions
//! perform I/O or mutate the Index Store directly; callers assign the
//! results onto a `Trace`.

use crate::config::{Config, RetentionConfig};
use crate::types::{
    ActivityBin, ActivityBinMode, ActivityStatus, AgentKind, ModelShare, NormalizedEvent,
    TokenTotals, Tier, ToolCount, Trace,
};
use std::collections::{HashMap, HashSet};

/// `eventKindCounts`: map kind → count.
pub fn event_kind_counts(events: &[NormalizedEvent]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for e in events {
        *counts.entry(e.kind.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn error_count(events: &[NormalizedEvent]) -> u64 {
    events.iter().filter(|e| e.has_error).count() as u64
}

pub fn tool_use_count(events: &[NormalizedEvent]) -> u64 {
    events
        .iter()
        .filter(|e| e.kind == crate::types::EventKind::ToolUse)
        .count() as u64
}

pub fn tool_result_count(events: &[NormalizedEvent]) -> u64 {
    events
        .iter()
        .filter(|e| e.kind == crate::types::EventKind::ToolResult)
        .count() as u64
}

/// `(unmatchedToolUses, unmatchedToolResults)`: set difference on
/// `toolUseId` / `parentToolUseId`.
pub fn unmatched_tool_pairs(events: &[NormalizedEvent]) -> (u64, u64) {
    let use_ids: HashSet<&str> = events
        .iter()
        .filter_map(|e| e.tool_use_id.as_deref())
        .collect();
    let result_parent_ids: HashSet<&str> = events
        .iter()
        .filter_map(|e| e.parent_tool_use_id.as_deref())
        .collect();

    let unmatched_uses = use_ids.difference(&result_parent_ids).count() as u64;
    let unmatched_results = result_parent_ids.difference(&use_ids).count() as u64;
    (unmatched_uses, unmatched_results)
}

fn usage_field(raw: &serde_json::Value, path: &[&str], key: &str) -> i64 {
    let mut cur = raw;
    for segment in path {
        match cur.get(segment) {
            Some(v) => cur = v,
            None => return 0,
        }
    }
    cur.get(key).and_then(serde_json::Value::as_i64).unwrap_or(0)
}

/// Pull one event's usage fields per its agent's raw-JSON convention.
fn event_usage(event: &NormalizedEvent, agent: AgentKind) -> TokenTotals {
    let raw = &event.raw;
    match agent {
        AgentKind::Claude => TokenTotals {
            input_tokens: usage_field(raw, &["message", "usage"], "input_tokens"),
            cached_read_tokens: usage_field(raw, &["message", "usage"], "cache_read_input_tokens"),
            cached_create_tokens: usage_field(
                raw,
                &["message", "usage"],
                "cache_creation_input_tokens",
            ),
            output_tokens: usage_field(raw, &["message", "usage"], "output_tokens"),
            reasoning_output_tokens: 0,
        },
        AgentKind::Codex => TokenTotals {
            input_tokens: usage_field(raw, &["usage"], "input_tokens"),
            cached_read_tokens: usage_field(raw, &["usage"], "cached_input_tokens"),
            cached_create_tokens: 0,
            output_tokens: usage_field(raw, &["usage"], "output_tokens"),
            reasoning_output_tokens: usage_field(raw, &["usage"], "reasoning_output_tokens"),
        },
        _ => TokenTotals {
            input_tokens: usage_field(raw, &["usage"], "input_tokens"),
            cached_read_tokens: usage_field(raw, &["usage"], "cached_tokens"),
            cached_create_tokens: 0,
            output_tokens: usage_field(raw, &["usage"], "output_tokens"),
            reasoning_output_tokens: usage_field(raw, &["usage"], "reasoning_tokens"),
        },
    }
}

/// `tokenTotals`: sum of `usage.*` fields across every event.
pub fn token_totals(events: &[NormalizedEvent], agent: AgentKind) -> TokenTotals {
    let mut total = TokenTotals::default();
    for e in events {
        let u = event_usage(e, agent);
        total.input_tokens += u.input_tokens;
        total.cached_read_tokens += u.cached_read_tokens;
        total.cached_create_tokens += u.cached_create_tokens;
        total.output_tokens += u.output_tokens;
        total.reasoning_output_tokens += u.reasoning_output_tokens;
    }
    total
}

fn event_model(event: &NormalizedEvent) -> Option<String> {
    event
        .raw
        .get("model")
        .and_then(serde_json::Value::as_str)
        .or_else(|| {
            event
                .raw
                .get("message")
                .and_then(|m| m.get("model"))
                .and_then(serde_json::Value::as_str)
        })
        .map(String::from)
}

/// `modelTokenSharesTop`: group `outputTokens + reasoningOutputTokens`
/// by detected model, return the top `top_n` with percent-of-total.
pub fn model_token_shares_top(
    events: &[NormalizedEvent],
    agent: AgentKind,
    top_n: usize,
) -> Vec<ModelShare> {
    let mut by_model: HashMap<String, i64> = HashMap::new();
    for e in events {
        let Some(model) = event_model(e) else { continue };
        let u = event_usage(e, agent);
        *by_model.entry(model).or_insert(0) += u.output_tokens + u.reasoning_output_tokens;
    }
    let grand_total: i64 = by_model.values().sum();
    let mut shares: Vec<ModelShare> = by_model
        .into_iter()
        .map(|(model, tokens)| {
            let percent = if grand_total > 0 {
                (tokens as f64 / grand_total as f64) * 100.0
            } else {
                0.0
            };
            ModelShare {
                model,
                tokens,
                percent,
            }
        })
        .collect();
    shares.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.model.cmp(&b.model)));
    shares.truncate(top_n);
    shares
}

fn context_window_for(model: &str, config: &crate::config::ModelsConfig) -> u64 {
    config
        .context_windows
        .iter()
        .find(|w| w.model == model)
        .map(|w| w.tokens)
        .unwrap_or(config.default_context_window_tokens)
}

/// `contextWindowPct`: `totalTokens / contextWindow(model) * 100`, using
/// the trace's top model share (the model with the most output tokens).
pub fn context_window_pct(
    total_tokens: i64,
    model_shares: &[ModelShare],
    config: &crate::config::ModelsConfig,
) -> Option<f64> {
    let model = model_shares.first().map(|s| s.model.as_str())?;
    let window = context_window_for(model, config);
    if window == 0 {
        return None;
    }
    Some((total_tokens as f64 / window as f64) * 100.0)
}

/// `costEstimateUsd`: sum over events of `rate(model) * tokens / 1e6`.
/// Returns `None` when `cost.enabled = false`, or when any used model
/// has no rate and `unknownModelPolicy = n_a`.
pub fn cost_estimate_usd(
    events: &[NormalizedEvent],
    agent: AgentKind,
    cost: &crate::config::CostConfig,
) -> Option<f64> {
    if !cost.enabled {
        return None;
    }
    let rates: HashMap<&str, f64> = cost
        .model_rates
        .iter()
        .map(|r| (r.model.as_str(), r.rate_per_million))
        .collect();

    let mut total = 0.0;
    for e in events {
        let Some(model) = event_model(e) else { continue };
        let u = event_usage(e, agent);
        let tokens = (u.input_tokens + u.cached_read_tokens + u.cached_create_tokens
            + u.output_tokens
            + u.reasoning_output_tokens) as f64;
        match rates.get(model.as_str()) {
            Some(rate) => total += rate * tokens / 1_000_000.0,
            None => {
                if cost.unknown_model_policy == "n_a" {
                    return None;
                }
                // "zero": contribute 0 for this event and continue.
            }
        }
    }
    Some(total)
}

/// `activityStatus`: running/waiting_input/idle per spec §4.6, evaluated
/// against `now_ms`.
pub fn activity_status(
    events: &[NormalizedEvent],
    config: &crate::config::ScanConfig,
    now_ms: i64,
) -> (ActivityStatus, String) {
    let Some(last) = events.last() else {
        return (ActivityStatus::Idle, "no events".to_string());
    };
    let last_ts = last.timestamp_ms.unwrap_or(0);
    let age_ms = now_ms - last_ts;

    let (uses, _results) = unmatched_tool_pairs(events);
    if uses > 0 {
        return (
            ActivityStatus::Running,
            "unmatched tool_use pending".to_string(),
        );
    }
    if age_ms < config.status_running_ttl_ms {
        return (ActivityStatus::Running, "recent event within running TTL".to_string());
    }
    if last.kind == crate::types::EventKind::Assistant && age_ms < config.status_waiting_ttl_ms {
        return (
            ActivityStatus::WaitingInput,
            "last event is assistant within waiting TTL".to_string(),
        );
    }
    (ActivityStatus::Idle, "no recent activity".to_string())
}

/// `activityBins`: partition the recent window into bins, time-mode when
/// timestamps cover ≥50% of the window, else event-index mode.
pub fn activity_bins(
    events: &[NormalizedEvent],
    config: &crate::config::ScanConfig,
    now_ms: i64,
) -> (Vec<ActivityBin>, ActivityBinMode) {
    let window_ms = (config.activity_window_minutes as i64) * 60_000;
    let bin_ms = (config.activity_bin_minutes as i64) * 60_000;
    let bin_count = config.activity_bin_count.max(1) as usize;
    let window_start = now_ms - window_ms;

    let recent: Vec<&NormalizedEvent> = events
        .iter()
        .filter(|e| e.timestamp_ms.map(|ts| ts >= window_start).unwrap_or(false))
        .collect();
    let with_ts = events
        .iter()
        .rev()
        .take(config.recent_event_window as usize)
        .filter(|e| e.timestamp_ms.is_some())
        .count();
    let sample_size = events
        .iter()
        .rev()
        .take(config.recent_event_window as usize)
        .count()
        .max(1);
    let coverage = with_ts as f64 / sample_size as f64;

    if coverage >= 0.5 && bin_ms > 0 {
        let mut bins = vec![0u64; bin_count];
        for e in &recent {
            if let Some(ts) = e.timestamp_ms {
                let offset = ts - window_start;
                let idx = (offset / bin_ms).clamp(0, bin_count as i64 - 1) as usize;
                bins[idx] += 1;
            }
        }
        let out = bins
            .into_iter()
            .enumerate()
            .map(|(i, count)| ActivityBin {
                start_ms: Some(window_start + (i as i64) * bin_ms),
                count,
            })
            .collect();
        (out, ActivityBinMode::Time)
    } else {
        let tail: Vec<&NormalizedEvent> = events
            .iter()
            .rev()
            .take(config.recent_event_window as usize)
            .collect();
        let per_bin = (tail.len() / bin_count).max(1);
        let mut bins = Vec::with_capacity(bin_count);
        let mut chunks = tail.rchunks(per_bin);
        for _ in 0..bin_count {
            let count = chunks.next().map(|c| c.len()).unwrap_or(0) as u64;
            bins.push(ActivityBin {
                start_ms: None,
                count,
            });
        }
        (bins, ActivityBinMode::EventIndex)
    }
}

/// `topTools`: top N by `toolName` count, ties broken alphabetically.
pub fn top_tools(events: &[NormalizedEvent], top_n: usize) -> Vec<ToolCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for e in events {
        if let Some(name) = &e.tool_name {
            *counts.entry(name.clone()).or_insert(0) += 1;
        }
    }
    let mut out: Vec<ToolCount> = counts
        .into_iter()
        .map(|(tool_name, count)| ToolCount { tool_name, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool_name.cmp(&b.tool_name)));
    out.truncate(top_n);
    out
}

/// Recompute every derived field on `trace` from its current `events`.
pub fn refresh_trace_summary(trace: &mut Trace, events: &[NormalizedEvent], config: &Config, now_ms: i64) {
    trace.event_count = events.len() as u64;
    trace.event_kind_counts = event_kind_counts(events);
    trace.error_count = error_count(events);
    trace.tool_use_count = tool_use_count(events);
    trace.tool_result_count = tool_result_count(events);
    let (unmatched_uses, unmatched_results) = unmatched_tool_pairs(events);
    trace.unmatched_tool_uses = unmatched_uses;
    trace.unmatched_tool_results = unmatched_results;

    trace.first_event_ts = events.iter().find_map(|e| e.timestamp_ms);
    trace.last_event_ts = events.iter().rev().find_map(|e| e.timestamp_ms);

    trace.token_totals = token_totals(events, trace.agent_kind);
    trace.model_token_shares =
        model_token_shares_top(events, trace.agent_kind, config.models.top_model_count);
    trace.context_window_pct =
        context_window_pct(trace.token_totals.total(), &trace.model_token_shares, &config.models);
    trace.cost_estimate_usd = cost_estimate_usd(events, trace.agent_kind, &config.cost);

    let (status, reason) = activity_status(events, &config.scan, now_ms);
    trace.activity_status = status;
    trace.activity_reason = reason;
    let (bins, _mode) = activity_bins(events, &config.scan, now_ms);
    trace.activity_bins = Some(bins);

    trace.top_tools = top_tools(events, config.top_tool_count);
}

/// Tier decision (spec §4.6): `aggressive_recency` sorts by
/// `max(lastEventTs, mtimeMs)` desc, top `hotTraceCount` hot, next
/// `warmTraceCount` warm, rest cold; `full_memory` keeps everything hot.
pub fn assign_tiers(traces: &mut [&mut Trace], retention: &RetentionConfig) {
    if retention.is_full_memory() {
        for t in traces.iter_mut() {
            t.resident_tier = Tier::Hot;
        }
        return;
    }
    let mut order: Vec<usize> = (0..traces.len()).collect();
    order.sort_by_key(|&i| {
        let t = &traces[i];
        std::cmp::Reverse(t.last_event_ts.unwrap_or(0).max(t.mtime_ms))
    });
    for (rank, &i) in order.iter().enumerate() {
        traces[i].resident_tier = if rank < retention.hot_trace_count {
            Tier::Hot
        } else if rank < retention.hot_trace_count + retention.warm_trace_count {
            Tier::Warm
        } else {
            Tier::Cold
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{trace_id, EventKind};

    fn make_event(index: u64, kind: EventKind, tool_use_id: Option<&str>, parent: Option<&str>) -> NormalizedEvent {
        NormalizedEvent {
            event_id: crate::types::event_id("t1", index, index),
            trace_id: "t1".into(),
            index,
            offset: index,
            timestamp_ms: Some(1_700_000_000_000 + index as i64 * 1000),
            session_id: None,
            kind,
            raw_type: kind.as_str().to_string(),
            role: "assistant".into(),
            preview: "x".into(),
            text_blocks: vec![],
            tool_use_id: tool_use_id.map(String::from),
            parent_tool_use_id: parent.map(String::from),
            tool_name: None,
            tool_type: None,
            tool_call_id: None,
            function_name: None,
            args_text: None,
            result_text: None,
            parent_event_id: None,
            toc_label: None,
            has_error: false,
            search_text: String::new(),
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn event_kind_counts_sum_to_event_count() {
        let events = vec![
            make_event(1, EventKind::User, None, None),
            make_event(2, EventKind::ToolUse, Some("a"), None),
            make_event(3, EventKind::ToolResult, None, Some("a")),
        ];
        let counts = event_kind_counts(&events);
        let sum: u64 = counts.values().sum();
        assert_eq!(sum, events.len() as u64);
    }

    #[test]
    fn unmatched_pairs_detects_orphan_use() {
        let events = vec![
            make_event(1, EventKind::ToolUse, Some("a"), None),
            make_event(2, EventKind::ToolUse, Some("b"), None),
            make_event(3, EventKind::ToolResult, None, Some("a")),
        ];
        let (uses, results) = unmatched_tool_pairs(&events);
        assert_eq!(uses, 1);
        assert_eq!(results, 0);
    }

    #[test]
    fn unknown_model_zero_vs_na_policy() {
        let mut events = vec![make_event(1, EventKind::Assistant, None, None)];
        events[0].raw = serde_json::json!({"model": "m-x", "usage": {"output_tokens": 100}});

        let zero_cfg = crate::config::CostConfig {
            enabled: true,
            currency: "usd".into(),
            unknown_model_policy: "zero".into(),
            model_rates: vec![],
        };
        assert_eq!(cost_estimate_usd(&events, AgentKind::Unknown, &zero_cfg), Some(0.0));

        let na_cfg = crate::config::CostConfig {
            unknown_model_policy: "n_a".into(),
            ..zero_cfg
        };
        assert_eq!(cost_estimate_usd(&events, AgentKind::Unknown, &na_cfg), None);
    }

    #[test]
    fn cost_disabled_is_always_none() {
        let events: Vec<NormalizedEvent> = vec![];
        let cfg = crate::config::CostConfig {
            enabled: false,
            currency: "usd".into(),
            unknown_model_policy: "zero".into(),
            model_rates: vec![],
        };
        assert_eq!(cost_estimate_usd(&events, AgentKind::Claude, &cfg), None);
    }

    #[test]
    fn idle_status_when_last_event_old() {
        let events = vec![make_event(1, EventKind::Assistant, None, None)];
        let cfg = crate::config::ScanConfig::default();
        let (status, _) = activity_status(&events, &cfg, 1_700_000_000_000 + 10 * 24 * 3600 * 1000);
        assert_eq!(status, ActivityStatus::Idle);
    }

    #[test]
    fn running_when_unmatched_tool_use_pending() {
        let events = vec![make_event(1, EventKind::ToolUse, Some("a"), None)];
        let cfg = crate::config::ScanConfig::default();
        let (status, _) = activity_status(&events, &cfg, 1_700_000_005_000);
        assert_eq!(status, ActivityStatus::Running);
    }

    #[test]
    fn assign_tiers_caps_hot_and_warm() {
        let mtimes = [100i64, 200, 300, 400, 500];
        let mut traces: Vec<Trace> = mtimes
            .iter()
            .enumerate()
            .map(|(i, &mtime)| {
                let mut t = Trace::new_empty(
                    trace_id("claude", &format!("/tmp/{i}.jsonl")),
                    "claude".into(),
                    format!("/tmp/{i}.jsonl"),
                );
                t.mtime_ms = mtime;
                t
            })
            .collect();
        let retention = RetentionConfig {
            strategy: "aggressive_recency".into(),
            hot_trace_count: 2,
            warm_trace_count: 2,
            max_resident_events_per_hot_trace: 100,
            max_resident_events_per_warm_trace: 10,
        };
        let mut refs: Vec<&mut Trace> = traces.iter_mut().collect();
        assign_tiers(&mut refs, &retention);

        let hot: Vec<i64> = traces
            .iter()
            .filter(|t| t.resident_tier == Tier::Hot)
            .map(|t| t.mtime_ms)
            .collect();
        let warm: Vec<i64> = traces
            .iter()
            .filter(|t| t.resident_tier == Tier::Warm)
            .map(|t| t.mtime_ms)
            .collect();
        let cold: Vec<i64> = traces
            .iter()
            .filter(|t| t.resident_tier == Tier::Cold)
            .map(|t| t.mtime_ms)
            .collect();
        assert_eq!(hot.len(), 2);
        assert!(hot.contains(&500) && hot.contains(&400));
        assert_eq!(warm.len(), 2);
        assert!(warm.contains(&300) && warm.contains(&200));
        assert_eq!(cold, vec![100]);
    }
}
