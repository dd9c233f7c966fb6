//! Index Store (spec §4.4): a process-wide in-memory catalog of traces
//! and their events. Pure memory — there is no persistence layer; the
//! catalog is rebuilt entirely from files on restart.

use crate::error::{Error, Result};
use crate::types::{NormalizedEvent, Tier, Trace};
use std::collections::HashMap;

/// One trace's summary plus its currently resident events.
#[derive(Debug, Clone, Default)]
pub struct TraceEntry {
    pub trace: Trace,
    pub events: Vec<NormalizedEvent>,
}

/// A table-of-contents entry: one line per event, cheap enough to send
/// in bulk without the full payload.
#[derive(Debug, Clone)]
pub struct TocEntry {
    pub event_id: String,
    pub index: u64,
    pub kind: crate::types::EventKind,
    pub preview: String,
    pub timestamp_ms: Option<i64>,
}

/// Result of [`IndexStore::get_page`].
#[derive(Debug, Clone)]
pub struct TracePage {
    pub trace: Trace,
    pub events: Vec<NormalizedEvent>,
    pub toc: Vec<TocEntry>,
    pub next_before: Option<u64>,
    pub live_cursor: u64,
}

/// Filter applied by [`IndexStore::list_summaries`].
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    pub agent_kind: Option<crate::types::AgentKind>,
    pub activity_status: Option<crate::types::ActivityStatus>,
    /// Case-insensitive substring match over `searchText`-bearing event
    /// previews is out of the store's scope (spec non-goal: full-text
    /// search beyond substring over a precomputed field); this filters
    /// on the trace-level session id / path only.
    pub query: Option<String>,
}

/// Sort applied by [`IndexStore::list_summaries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummarySort {
    #[default]
    LastEventDesc,
    MtimeDesc,
}

fn matches_filter(trace: &Trace, filter: &SummaryFilter) -> bool {
    if let Some(kind) = filter.agent_kind {
        if trace.agent_kind != kind {
            return false;
        }
    }
    if let Some(status) = filter.activity_status {
        if trace.activity_status != status {
            return false;
        }
    }
    if let Some(q) = &filter.query {
        let q = q.to_lowercase();
        if !trace.path.to_lowercase().contains(&q) && !trace.session_id.to_lowercase().contains(&q) {
            return false;
        }
    }
    true
}

/// The process-wide in-memory catalog (spec §4.4).
#[derive(Default)]
pub struct IndexStore {
    traces: HashMap<String, TraceEntry>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all events for a trace atomically (full reparse path).
    pub fn upsert_trace(&mut self, trace: Trace, events: Vec<NormalizedEvent>) {
        let entry = self.traces.entry(trace.id.clone()).or_default();
        entry.trace = trace;
        entry.trace.event_count = events.len() as u64;
        entry.events = events;
        entry.trace.version += 1;
    }

    /// Append contiguous events whose `index` starts at the current
    /// `eventCount + 1` (incremental reparse path).
    pub fn append_events(&mut self, trace_id: &str, start_index: u64, events: Vec<NormalizedEvent>) -> Result<()> {
        let entry = self
            .traces
            .get_mut(trace_id)
            .ok_or_else(|| Error::TraceNotFound(trace_id.to_string()))?;
        let expected = entry.trace.event_count + 1;
        if start_index != expected {
            return Err(Error::Parse {
                agent: entry.trace.agent_kind.as_str().to_string(),
                message: format!("append start_index {start_index} != expected {expected}"),
            });
        }
        entry.trace.event_count += events.len() as u64;
        entry.events.extend(events);
        entry.trace.version += 1;
        Ok(())
    }

    pub fn remove_trace(&mut self, trace_id: &str) -> Option<TraceEntry> {
        self.traces.remove(trace_id)
    }

    pub fn get_summary(&self, id: &str) -> Option<Trace> {
        self.traces.get(id).map(|e| e.trace.clone())
    }

    pub fn get_entry(&self, id: &str) -> Option<&TraceEntry> {
        self.traces.get(id)
    }

    pub fn get_entry_mut(&mut self, id: &str) -> Option<&mut TraceEntry> {
        self.traces.get_mut(id)
    }

    pub fn iter_entries(&self) -> impl Iterator<Item = &TraceEntry> {
        self.traces.values()
    }

    pub fn iter_entries_mut(&mut self) -> impl Iterator<Item = &mut TraceEntry> {
        self.traces.values_mut()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn list_summaries(&self, filter: &SummaryFilter, sort: SummarySort) -> Vec<Trace> {
        let mut out: Vec<Trace> = self
            .traces
            .values()
            .map(|e| e.trace.clone())
            .filter(|t| matches_filter(t, filter))
            .collect();
        match sort {
            SummarySort::LastEventDesc => out.sort_by(|a, b| {
                b.last_event_ts
                    .unwrap_or(0)
                    .cmp(&a.last_event_ts.unwrap_or(0))
            }),
            SummarySort::MtimeDesc => out.sort_by(|a, b| b.mtime_ms.cmp(&a.mtime_ms)),
        }
        out
    }

    /// Return up to `limit` events with `index < before` (or the tail
    /// when `before` is `None`), plus `nextBefore`/`liveCursor` cursors.
    /// When the trace's detail is not resident (cold/evicted), `loader`
    /// is invoked to synchronously reparse the file and materialize a
    /// temporary window (spec §4.4 `detailLoadMode = lazy_from_disk`).
    pub fn get_page<F>(
        &mut self,
        id: &str,
        before: Option<u64>,
        limit: usize,
        loader: F,
    ) -> Option<TracePage>
    where
        F: FnOnce(&Trace) -> Vec<NormalizedEvent>,
    {
        let needs_materialize = {
            let entry = self.traces.get(id)?;
            !entry.trace.materialized && entry.events.is_empty() && entry.trace.event_count > 0
        };
        if needs_materialize {
            let trace = self.traces.get(id)?.trace.clone();
            let events = loader(&trace);
            if let Some(entry) = self.traces.get_mut(id) {
                entry.events = events;
            }
        }

        let entry = self.traces.get(id)?;
        let live_cursor = entry.events.last().map(|e| e.index).unwrap_or(0);
        let before = before.unwrap_or(u64::MAX);
        let mut page: Vec<NormalizedEvent> = entry
            .events
            .iter()
            .rev()
            .filter(|e| e.index < before)
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        let next_before = page.first().map(|e| e.index);
        let toc = entry
            .events
            .iter()
            .map(|e| TocEntry {
                event_id: e.event_id.clone(),
                index: e.index,
                kind: e.kind,
                preview: e.preview.clone(),
                timestamp_ms: e.timestamp_ms,
            })
            .collect();

        Some(TracePage {
            trace: entry.trace.clone(),
            events: page,
            toc,
            next_before,
            live_cursor,
        })
    }

    pub fn get_toc(&self, id: &str) -> Option<Vec<TocEntry>> {
        let entry = self.traces.get(id)?;
        Some(
            entry
                .events
                .iter()
                .map(|e| TocEntry {
                    event_id: e.event_id.clone(),
                    index: e.index,
                    kind: e.kind,
                    preview: e.preview.clone(),
                    timestamp_ms: e.timestamp_ms,
                })
                .collect(),
        )
    }

    pub fn set_tier(&mut self, id: &str, tier: Tier) {
        if let Some(entry) = self.traces.get_mut(id) {
            entry.trace.resident_tier = tier;
        }
    }

    /// Drop resident event detail for a trace, preserving `eventCount`
    /// and the summary. Used when demoting to `cold`.
    pub fn evict_detail(&mut self, id: &str) {
        if let Some(entry) = self.traces.get_mut(id) {
            entry.events.clear();
            entry.trace.materialized = false;
        }
    }

    /// Cap a hot/warm trace's resident events to `cap`, dropping the
    /// oldest (by `index`) first. `eventCount` is preserved.
    pub fn cap_resident_events(&mut self, id: &str, cap: usize) {
        if let Some(entry) = self.traces.get_mut(id) {
            if entry.events.len() > cap {
                let overflow = entry.events.len() - cap;
                entry.events.drain(0..overflow);
            }
        }
    }

    pub fn mark_materialized(&mut self, id: &str) {
        if let Some(entry) = self.traces.get_mut(id) {
            entry.trace.materialized = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{trace_id, AgentKind, ActivityStatus, EventKind};

    fn event(trace: &str, index: u64) -> NormalizedEvent {
        NormalizedEvent {
            event_id: crate::types::event_id(trace, index, index * 10),
            trace_id: trace.to_string(),
            index,
            offset: index * 10,
            timestamp_ms: Some(1_700_000_000_000 + index as i64),
            session_id: Some("s1".into()),
            kind: EventKind::User,
            raw_type: "user".into(),
            role: "user".into(),
            preview: format!("event {index}"),
            text_blocks: vec![],
            tool_use_id: None,
            parent_tool_use_id: None,
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

    fn trace(id: &str) -> Trace {
        let mut t = Trace::new_empty(id.to_string(), "claude".into(), format!("/tmp/{id}.jsonl"));
        t.agent_kind = AgentKind::Claude;
        t.activity_status = ActivityStatus::Idle;
        t
    }

    #[test]
    fn upsert_then_append_advances_event_count_and_version() {
        let mut store = IndexStore::new();
        let id = trace_id("claude", "/tmp/t1.jsonl");
        store.upsert_trace(trace(&id), vec![event(&id, 1), event(&id, 2), event(&id, 3)]);
        let summary = store.get_summary(&id).unwrap();
        assert_eq!(summary.event_count, 3);
        assert_eq!(summary.version, 1);

        store
            .append_events(&id, 4, vec![event(&id, 4), event(&id, 5)])
            .unwrap();
        let summary = store.get_summary(&id).unwrap();
        assert_eq!(summary.event_count, 5);
        assert_eq!(summary.version, 2);
    }

    #[test]
    fn append_rejects_non_contiguous_start_index() {
        let mut store = IndexStore::new();
        let id = trace_id("claude", "/tmp/t1.jsonl");
        store.upsert_trace(trace(&id), vec![event(&id, 1)]);
        let err = store.append_events(&id, 10, vec![event(&id, 10)]);
        assert!(err.is_err());
    }

    #[test]
    fn get_page_returns_tail_and_cursors() {
        let mut store = IndexStore::new();
        let id = trace_id("claude", "/tmp/t1.jsonl");
        let events: Vec<_> = (1..=5).map(|i| event(&id, i)).collect();
        store.upsert_trace(trace(&id), events);
        store.mark_materialized(&id);

        let page = store.get_page(&id, None, 2, |_| vec![]).unwrap();
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].index, 4);
        assert_eq!(page.events[1].index, 5);
        assert_eq!(page.live_cursor, 5);
        assert_eq!(page.next_before, Some(4));
    }

    #[test]
    fn get_page_triggers_lazy_materialization_for_cold_trace() {
        let mut store = IndexStore::new();
        let id = trace_id("claude", "/tmp/t1.jsonl");
        let mut t = trace(&id);
        t.resident_tier = Tier::Cold;
        t.event_count = 2;
        t.materialized = false;
        store.upsert_trace(t, vec![]);
        // upsert_trace overwrote event_count from the empty events vec;
        // simulate a cold summary that still reports its prior count.
        if let Some(entry) = store.get_entry_mut(&id) {
            entry.trace.event_count = 2;
            entry.trace.materialized = false;
        }

        let loaded = vec![event(&id, 1), event(&id, 2)];
        let page = store.get_page(&id, None, 10, |_| loaded.clone()).unwrap();
        assert_eq!(page.events.len(), 2);
    }

    #[test]
    fn cap_resident_events_drops_oldest_preserving_count() {
        let mut store = IndexStore::new();
        let id = trace_id("claude", "/tmp/t1.jsonl");
        let events: Vec<_> = (1..=5).map(|i| event(&id, i)).collect();
        store.upsert_trace(trace(&id), events);
        store.cap_resident_events(&id, 2);
        let entry = store.get_entry(&id).unwrap();
        assert_eq!(entry.events.len(), 2);
        assert_eq!(entry.trace.event_count, 5);
        assert_eq!(entry.events[0].index, 4);
    }
}
