//! tracehub-core: the indexing engine for local agent-session traces.
//!
//! The crate is organized in layers, each owning one stage of the
//! pipeline described by the system specification:
//!
//! - **Layer 0 — model & config.** [`types`] defines `Trace` and
//!   `NormalizedEvent`; [`config`] defines the value types the engine
//!   is configured with (loading them from disk is a concern of the
//!   CLI, not this crate).
//! - **Layer 1 — ingestion.** [`discovery`] enumerates and watches
//!   source files; [`parsers`] dispatches each file to an agent parser
//!   and normalizes it into events; [`redact`] rewrites sensitive
//!   strings before anything is retained.
//! - **Layer 2 — state & derived views.** [`store`] is the in-memory
//!   catalog; [`aggregator`] computes derived summary fields from a
//!   trace's events; [`scheduler`] drives reparse decisions and tier
//!   housekeeping on a timer; [`stream`] fans out ordered change
//!   envelopes to subscribers.
//!
//! [`IndexEngine`] wires all of the above into the query surface
//! described in the specification's external interfaces section.

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod parsers;
pub mod redact;
pub mod scheduler;
pub mod store;
pub mod stream;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use store::{IndexStore, SummaryFilter, SummarySort, TocEntry, TracePage};
pub use stream::{ChangeStreamBus, OverviewStats, StreamEnvelope, Subscription};
pub use types::*;

use parsers::ParserRegistry;
use scheduler::{classify_reparse, AdaptiveInterval, DirtyQueue, IndexPerformanceStats, ReparseDecision};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Consecutive full rescans without a file's presence before its trace
/// is destroyed (spec §3: "destroyed when the file disappears for two
/// consecutive full rescans").
const MISSING_RESCANS_BEFORE_REMOVAL: u32 = 2;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Per-file bookkeeping the scheduler needs between ticks: the size and
/// 256-byte prefix observed at the last successful reparse.
#[derive(Debug, Clone, Default)]
struct FileWatermark {
    size_bytes: u64,
    prefix: Vec<u8>,
}

const PREFIX_LEN: usize = 256;

/// The composition root: owns the Index Store and drives discovery,
/// parsing, redaction, aggregation, and the change stream bus.
///
/// Spec §5 describes a single-threaded cooperative driver; this struct
/// is that driver. It is not `Sync` by construction (methods take
/// `&mut self` for all mutating operations) — callers that need
/// concurrent access wrap it in their own `Mutex`/actor, which is
/// outside this crate's scope.
pub struct IndexEngine {
    config: Config,
    store: IndexStore,
    registry: ParserRegistry,
    bus: ChangeStreamBus,
    dirty_queue: DirtyQueue,
    interval: AdaptiveInterval,
    stats: IndexPerformanceStats,
    watermarks: HashMap<String, FileWatermark>,
    /// Consecutive full rescans (per trace id) during which the backing
    /// file was not found by discovery.
    missing_streaks: HashMap<String, u32>,
}

impl IndexEngine {
    pub fn new(mut config: Config) -> Self {
        config.synthesize_session_log_sources();
        let interval = AdaptiveInterval::from_config(&config.scan);
        Self {
            config,
            store: IndexStore::new(),
            registry: ParserRegistry::with_builtins(),
            bus: ChangeStreamBus::new(),
            dirty_queue: DirtyQueue::default(),
            interval,
            stats: IndexPerformanceStats::default(),
            watermarks: HashMap::new(),
            missing_streaks: HashMap::new(),
        }
    }

    /// Enumerate every enabled source profile, feed the dirty queue with
    /// every discovered path (spec §4.5 full-rescan loop's discovery
    /// half), and reconcile traces whose backing file is gone (spec §3:
    /// a trace is destroyed once its file has been absent for two
    /// consecutive full rescans).
    pub fn discover(&mut self) -> Vec<discovery::DiscoveredTraceFile> {
        let found = discovery::discover_all(&self.config.sources);
        for file in &found {
            self.dirty_queue.push(file.path.clone());
        }
        self.reconcile_removals(&found);
        found
    }

    /// Update `missing_streaks` against this rescan's discovered set and
    /// remove any trace that has now been missing for
    /// [`MISSING_RESCANS_BEFORE_REMOVAL`] consecutive rescans.
    fn reconcile_removals(&mut self, found: &[discovery::DiscoveredTraceFile]) {
        let found_ids: HashSet<&str> = found.iter().map(|f| f.id.as_str()).collect();
        let existing_ids: Vec<String> = self.store.iter_entries().map(|e| e.trace.id.clone()).collect();

        let mut to_remove = Vec::new();
        for id in existing_ids {
            if found_ids.contains(id.as_str()) {
                self.missing_streaks.remove(&id);
                continue;
            }
            let streak = self.missing_streaks.entry(id.clone()).or_insert(0);
            *streak += 1;
            if *streak >= MISSING_RESCANS_BEFORE_REMOVAL {
                to_remove.push(id);
            }
        }

        for id in to_remove {
            self.missing_streaks.remove(&id);
            self.watermarks.remove(&id);
            self.store.remove_trace(&id);
            tracing::info!(trace_id = %id, "trace file missing for two rescans, removing");
            self.bus
                .publish(0, stream::EnvelopePayload::TraceRemoved { trace_id: id });
        }
    }

    /// Reparse one file, choosing incremental vs full per spec §4.5,
    /// and apply the result to the store, aggregator, and change bus.
    /// `source_profile`/`parser_hint` come from the discovery record
    /// for this path, when known.
    pub fn reparse_file(
        &mut self,
        trace_id: &str,
        source_profile: &str,
        path: &std::path::Path,
        parser_hint: Option<&str>,
    ) -> Result<()> {
        let started = std::time::Instant::now();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Spec §7: an IO error reading the file marks the trace
                // unparseable with empty events; it stays discoverable
                // rather than vanishing or propagating the error.
                let mut trace = self.store.get_summary(trace_id).unwrap_or_else(|| {
                    Trace::new_empty(
                        trace_id.to_string(),
                        source_profile.to_string(),
                        path.to_string_lossy().to_string(),
                    )
                });
                trace.parseable = false;
                trace.parse_error = Some(err.to_string());
                self.store.upsert_trace(trace, Vec::new());
                let trace = self.store.get_summary(trace_id).expect("just upserted");
                let version = trace.version;
                self.bus.publish(version, stream::EnvelopePayload::TraceUpdated { trace });
                self.stats.record_refresh(started.elapsed().as_secs_f64() * 1000.0, now_ms());
                self.interval.observe(false);
                return Ok(());
            }
        };
        let current_size = bytes.len() as u64;
        let current_prefix: Vec<u8> = bytes.iter().take(PREFIX_LEN).copied().collect();

        let watermark = self.watermarks.get(trace_id).cloned().unwrap_or_default();
        let decision = classify_reparse(
            watermark.size_bytes,
            &watermark.prefix,
            current_size,
            &current_prefix,
        );

        let did_work = match decision {
            ReparseDecision::Skip(_) => false,
            ReparseDecision::Incremental => {
                let suffix = &bytes[watermark.size_bytes as usize..];
                let text = String::from_utf8_lossy(suffix);
                let head = String::from_utf8_lossy(&bytes[..bytes.len().min(parsers::HEAD_BYTES)]);
                let parser = self.registry.select(&path.to_string_lossy(), &head, parser_hint);
                let start_index = self.store.get_summary(trace_id).map(|t| t.event_count + 1).unwrap_or(1);
                let mut output = parser.parse(trace_id, &text, watermark.size_bytes, start_index);
                for e in &mut output.events {
                    redact::redact_event(e, &self.config.redaction);
                }
                self.store.append_events(trace_id, start_index, output.events)?;
                true
            }
            ReparseDecision::Full => {
                let text = String::from_utf8_lossy(&bytes);
                let head = String::from_utf8_lossy(&bytes[..bytes.len().min(parsers::HEAD_BYTES)]);
                let parser = self.registry.select(&path.to_string_lossy(), &head, parser_hint);
                let mut output = parser.parse(trace_id, &text, 0, 1);
                for e in &mut output.events {
                    redact::redact_event(e, &self.config.redaction);
                }
                let mtime_ms = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);

                let mut trace = self
                    .store
                    .get_summary(trace_id)
                    .unwrap_or_else(|| Trace::new_empty(trace_id.to_string(), source_profile.to_string(), path.to_string_lossy().to_string()));
                trace.agent_kind = output.agent;
                trace.parser_name = output.parser.to_string();
                trace.session_id = output.session_id.clone();
                trace.size_bytes = current_size;
                trace.mtime_ms = mtime_ms;
                trace.parseable = output.parse_error.is_none();
                trace.parse_error = output.parse_error.clone();
                trace.materialized = true;

                self.store.upsert_trace(trace, output.events);
                true
            }
        };

        self.watermarks.insert(
            trace_id.to_string(),
            FileWatermark {
                size_bytes: current_size,
                prefix: current_prefix,
            },
        );

        let snapshot = self
            .store
            .get_entry(trace_id)
            .map(|e| (e.events.clone(), e.trace.clone()));
        if let Some((events, mut trace)) = snapshot {
            aggregator::refresh_trace_summary(&mut trace, &events, &self.config, now_ms());
            let version = trace.version;
            if let Some(entry_mut) = self.store.get_entry_mut(trace_id) {
                entry_mut.trace = trace.clone();
            }
            let payload = if matches!(decision, ReparseDecision::Full) {
                stream::EnvelopePayload::TraceAdded { trace }
            } else {
                stream::EnvelopePayload::TraceUpdated { trace }
            };
            self.bus.publish(version, payload);
        }

        self.stats.record_refresh(started.elapsed().as_secs_f64() * 1000.0, now_ms());
        self.interval.observe(did_work);
        Ok(())
    }

    /// Run one scheduler tick: drain the dirty queue, reparse each path,
    /// reassign tiers, and emit at most one `overview_updated` envelope.
    /// Backpressure (spec §5): an overflowed queue clears itself and
    /// forces the caller toward a full rescan instead.
    pub fn tick(&mut self) {
        if self.dirty_queue.overflowed() {
            tracing::warn!("dirty queue overflow, switching to full rescan");
            self.stats.backpressure_engaged = true;
            self.dirty_queue.clear();
            self.discover();
            return;
        }

        self.stats.queue_depth = self.dirty_queue.len();
        let paths: Vec<PathBuf> = self.dirty_queue.drain();
        for path in paths {
            let Some(source_profile) = self.profile_for_path(&path) else {
                continue;
            };
            let trace_id = types::trace_id(&source_profile, &path.to_string_lossy());
            if let Err(err) = self.reparse_file(&trace_id, &source_profile, &path, None) {
                tracing::warn!(path = %path.display(), error = %err, "reparse failed");
            }
        }

        self.reassign_tiers();
        let overview = self.overview_stats();
        self.bus.publish(0, stream::EnvelopePayload::OverviewUpdated { overview });
        self.bus.maybe_heartbeat(now_ms());
    }

    /// Expanded root directories across enabled source profiles, for the
    /// caller to hand to a live filesystem watcher (spec §4.1).
    pub fn watch_roots(&self) -> Vec<String> {
        self.config
            .sources
            .values()
            .filter(|profile| profile.enabled)
            .flat_map(|profile| profile.roots.iter().cloned())
            .collect()
    }

    /// Debounce window a live filesystem watcher should coalesce bursts
    /// within (spec §6 `scan.batchDebounceMs`).
    pub fn watch_debounce_ms(&self) -> u64 {
        self.config.scan.batch_debounce_ms
    }

    /// Feed one externally-observed path change (e.g. from a live
    /// filesystem watcher) into the dirty queue for the next [`tick`](Self::tick).
    pub fn notify_path_changed(&mut self, path: PathBuf) {
        self.dirty_queue.push(path);
    }

    fn profile_for_path(&self, path: &std::path::Path) -> Option<String> {
        self.config
            .sources
            .iter()
            .find(|(_, profile)| {
                profile.roots.iter().any(|root| {
                    let expanded = if let Some(stripped) = root.strip_prefix('~') {
                        dirs::home_dir()
                            .map(|h| h.join(stripped.trim_start_matches('/')))
                            .unwrap_or_else(|| PathBuf::from(root))
                    } else {
                        PathBuf::from(root)
                    };
                    path.starts_with(expanded)
                })
            })
            .map(|(name, _)| name.clone())
    }

    fn reassign_tiers(&mut self) {
        let mut traces: Vec<Trace> = self
            .store
            .iter_entries()
            .map(|e| e.trace.clone())
            .collect();
        {
            let mut refs: Vec<&mut Trace> = traces.iter_mut().collect();
            aggregator::assign_tiers(&mut refs, &self.config.retention);
        }
        for trace in traces {
            let cap = match trace.resident_tier {
                Tier::Hot => self.config.retention.max_resident_events_per_hot_trace,
                Tier::Warm => self.config.retention.max_resident_events_per_warm_trace,
                Tier::Cold => 0,
            };
            self.store.set_tier(&trace.id, trace.resident_tier);
            if trace.resident_tier == Tier::Cold {
                self.store.evict_detail(&trace.id);
            } else {
                self.store.cap_resident_events(&trace.id, cap);
            }
        }
    }

    fn overview_stats(&self) -> OverviewStats {
        stream::compute_overview(self.store.iter_entries())
    }

    // ---- query surface (spec §6) ----

    pub fn get_overview(&self) -> OverviewStats {
        self.overview_stats()
    }

    pub fn list_traces(&self, filter: &SummaryFilter) -> Vec<Trace> {
        self.store.list_summaries(filter, SummarySort::LastEventDesc)
    }

    pub fn get_trace(&mut self, id: &str, before: Option<u64>, limit: usize) -> Option<TracePage> {
        self.store.get_page(id, before, limit, |trace| {
            let Ok(bytes) = std::fs::read(&trace.path) else {
                return Vec::new();
            };
            let text = String::from_utf8_lossy(&bytes);
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(parsers::HEAD_BYTES)]);
            let parser = self.registry.select(&trace.path, &head, Some(trace.agent_kind.as_str()));
            let mut output = parser.parse(&trace.id, &text, 0, 1);
            for e in &mut output.events {
                redact::redact_event(e, &self.config.redaction);
            }
            output.events
        })
    }

    pub fn get_events(&mut self, id: &str, before: Option<u64>, limit: usize) -> Option<Vec<NormalizedEvent>> {
        self.get_trace(id, before, limit).map(|p| p.events)
    }

    pub fn get_toc(&self, id: &str) -> Option<Vec<TocEntry>> {
        self.store.get_toc(id)
    }

    pub fn subscribe(&self) -> Subscription {
        let sub = self.bus.subscribe();
        let overview = self.overview_stats();
        let traces: Vec<Trace> = self.store.iter_entries().map(|e| e.trace.clone()).collect();
        self.bus.send_snapshot_to(sub.id, overview, traces);
        sub
    }

    pub fn get_perf_stats(&self) -> IndexPerformanceStats {
        self.stats.clone()
    }

    /// Delay the caller should sleep before the next [`tick`](Self::tick),
    /// per the scan-loop's adaptive/fixed interval state.
    pub fn next_delay_ms(&self) -> u64 {
        self.interval.current_ms()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceProfile;
    use std::io::Write;

    fn engine_with_profile(dir: &std::path::Path) -> IndexEngine {
        let mut config = Config::default();
        config.sources.insert(
            "claude".to_string(),
            SourceProfile {
                enabled: true,
                roots: vec![dir.to_string_lossy().to_string()],
                include_globs: vec!["**/*.jsonl".to_string()],
                exclude_globs: vec![],
                max_depth: None,
                agent_hint: Some("claude".to_string()),
            },
        );
        IndexEngine::new(config)
    }

    #[test]
    fn cold_start_indexes_one_claude_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sess.jsonl");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, r#"{{"type":"user","sessionId":"s1","message":{{"role":"user","content":"hi"}}}}"#).unwrap();
        writeln!(f, r#"{{"type":"assistant","sessionId":"s1","message":{{"role":"assistant","content":[{{"type":"tool_use","id":"t1","name":"Bash","input":{{"cmd":"ls"}}}}]}}}}"#).unwrap();
        writeln!(f, r#"{{"type":"user","sessionId":"s1","message":{{"role":"user","content":[{{"type":"tool_result","tool_use_id":"t1","content":"ok"}}]}}}}"#).unwrap();
        drop(f);

        let mut engine = engine_with_profile(dir.path());
        engine.discover();
        engine.tick();

        let traces = engine.list_traces(&SummaryFilter::default());
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].event_count, 3);
        assert_eq!(traces[0].tool_use_count, 1);
        assert_eq!(traces[0].tool_result_count, 1);
        assert_eq!(traces[0].unmatched_tool_uses, 0);
    }

    #[test]
    fn append_then_reparse_increments_event_count() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sess.jsonl");
        std::fs::write(
            &file_path,
            "{\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":\"hi\"}}\n",
        )
        .unwrap();

        let mut engine = engine_with_profile(dir.path());
        engine.discover();
        engine.tick();

        let mut f = std::fs::OpenOptions::new().append(true).open(&file_path).unwrap();
        writeln!(f, "{{\"type\":\"assistant\",\"sessionId\":\"s1\",\"message\":{{\"role\":\"assistant\",\"content\":\"ack\"}}}}").unwrap();
        writeln!(f, "{{\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{{\"role\":\"user\",\"content\":\"bye\"}}}}").unwrap();
        drop(f);

        engine.discover();
        engine.tick();

        let traces = engine.list_traces(&SummaryFilter::default());
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].event_count, 3);
    }

    #[test]
    fn truncation_triggers_full_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sess.jsonl");
        std::fs::write(
            &file_path,
            "{\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":\"hi\"}}\n\
             {\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":\"again\"}}\n",
        )
        .unwrap();

        let mut engine = engine_with_profile(dir.path());
        engine.discover();
        engine.tick();
        assert_eq!(engine.list_traces(&SummaryFilter::default())[0].event_count, 2);

        std::fs::write(
            &file_path,
            "{\"type\":\"user\",\"sessionId\":\"s2\",\"message\":{\"role\":\"user\",\"content\":\"new\"}}\n",
        )
        .unwrap();
        engine.discover();
        engine.tick();

        let traces = engine.list_traces(&SummaryFilter::default());
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].event_count, 1);
    }

    #[test]
    fn deleted_file_is_removed_after_two_consecutive_rescans() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sess.jsonl");
        std::fs::write(
            &file_path,
            "{\"type\":\"user\",\"sessionId\":\"s1\",\"message\":{\"role\":\"user\",\"content\":\"hi\"}}\n",
        )
        .unwrap();

        let mut engine = engine_with_profile(dir.path());
        engine.discover();
        engine.tick();
        assert_eq!(engine.list_traces(&SummaryFilter::default()).len(), 1);

        std::fs::remove_file(&file_path).unwrap();

        engine.discover();
        assert_eq!(
            engine.list_traces(&SummaryFilter::default()).len(),
            1,
            "trace must survive the first missing rescan"
        );

        engine.discover();
        assert_eq!(
            engine.list_traces(&SummaryFilter::default()).len(),
            0,
            "trace must be removed after the second consecutive missing rescan"
        );
    }

    #[test]
    fn io_error_marks_trace_unparseable_but_discoverable() {
        let dir = tempfile::tempdir().unwrap();
        let missing_path = dir.path().join("gone.jsonl");

        let mut engine = engine_with_profile(dir.path());
        let trace_id = types::trace_id("claude", &missing_path.to_string_lossy());
        engine
            .reparse_file(&trace_id, "claude", &missing_path, Some("claude"))
            .unwrap();

        let traces = engine.list_traces(&SummaryFilter::default());
        assert_eq!(traces.len(), 1);
        assert!(!traces[0].parseable);
        assert!(traces[0].parse_error.is_some());
        assert_eq!(traces[0].event_count, 0);
    }
}
