//! Scheduler (spec §4.5): drives the pipeline with an adaptive scan loop
//! and a coarser full-rescan loop, publishing performance statistics.

use crate::config::ScanConfig;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

/// EWMA smoothing factor for `averageRefreshDurationMs` (spec §4.5).
const EWMA_ALPHA: f64 = 0.2;

/// Soft cap on the dirty-path queue before the scheduler falls back to
/// full-rescan mode (spec §5).
pub const DIRTY_QUEUE_SOFT_CAP: usize = 4096;

/// Outcome of comparing a known file's prior state to its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyParsed,
    EmptyFile,
    NoNewContent,
}

/// What the scheduler should do for one dirty path (spec §4.5
/// Incremental vs full decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseDecision {
    /// Read `[prior_size, current_size)` and append.
    Incremental,
    /// Reparse the whole file and `upsertTrace`.
    Full,
    /// Nothing changed; no work needed.
    Skip(SkipReason),
}

/// Classify a known path given its prior and current size/mtime and the
/// first 256 bytes of each read. `prior_prefix`/`current_prefix` are
/// truncated to at most 256 bytes by the caller.
pub fn classify_reparse(
    prior_size: u64,
    prior_prefix: &[u8],
    current_size: u64,
    current_prefix: &[u8],
) -> ReparseDecision {
    if current_size == 0 {
        return ReparseDecision::Skip(SkipReason::EmptyFile);
    }
    if current_size == prior_size && prior_prefix == current_prefix {
        return ReparseDecision::Skip(SkipReason::NoNewContent);
    }
    if current_size >= prior_size && current_prefix.starts_with(prior_prefix) {
        return ReparseDecision::Incremental;
    }
    if current_size >= prior_size && prior_prefix == current_prefix {
        return ReparseDecision::Incremental;
    }
    ReparseDecision::Full
}

/// Snapshot of scheduler health published every tick (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct IndexPerformanceStats {
    pub refresh_count: u64,
    pub average_refresh_duration_ms: f64,
    pub queue_depth: usize,
    pub hot_count: usize,
    pub warm_count: usize,
    pub cold_count: usize,
    pub materialized_count: usize,
    pub last_refresh_ms: i64,
    /// Set once the dirty queue has overflowed its soft cap and the
    /// scheduler has fallen back to full-rescan mode.
    pub backpressure_engaged: bool,
}

impl IndexPerformanceStats {
    /// Fold one tick's measured duration into the EWMA average.
    pub fn record_refresh(&mut self, duration_ms: f64, now_ms: i64) {
        self.refresh_count += 1;
        self.average_refresh_duration_ms = if self.refresh_count == 1 {
            duration_ms
        } else {
            self.average_refresh_duration_ms * (1.0 - EWMA_ALPHA) + duration_ms * EWMA_ALPHA
        };
        self.last_refresh_ms = now_ms;
    }
}

/// The dirty-path queue: a FIFO set (duplicate paths collapse, keeping
/// the original enqueue order) with a soft overflow cap.
#[derive(Debug, Default)]
pub struct DirtyQueue {
    order: VecDeque<PathBuf>,
    members: HashSet<PathBuf>,
}

impl DirtyQueue {
    pub fn push(&mut self, path: PathBuf) {
        if self.members.insert(path.clone()) {
            self.order.push_back(path);
        }
    }

    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.members.clear();
        self.order.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    pub fn overflowed(&self) -> bool {
        self.order.len() > DIRTY_QUEUE_SOFT_CAP
    }
}

/// Adaptive-interval state machine (spec §9 Design Notes: a single
/// `nextDelay` state variable with multiplicative update).
pub struct AdaptiveInterval {
    next_delay_ms: u64,
    min_ms: u64,
    max_ms: u64,
    fixed: Option<u64>,
}

impl AdaptiveInterval {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            next_delay_ms: config.interval_min_ms,
            min_ms: config.interval_min_ms,
            max_ms: config.interval_max_ms,
            fixed: config.is_fixed().then_some(config.interval_seconds * 1000),
        }
    }

    /// Current delay to sleep before the next tick.
    pub fn current_ms(&self) -> u64 {
        self.fixed.unwrap_or(self.next_delay_ms)
    }

    /// Update state after a tick. `did_work` shrinks the interval toward
    /// `min_ms`; idle grows it toward `max_ms`; both multiplicative by
    /// a factor of 2. In fixed mode this is a no-op (spec §9 Open
    /// Question resolution).
    pub fn observe(&mut self, did_work: bool) {
        if self.fixed.is_some() {
            return;
        }
        self.next_delay_ms = if did_work {
            (self.next_delay_ms / 2).max(self.min_ms)
        } else {
            (self.next_delay_ms * 2).min(self.max_ms)
        };
    }

    pub async fn sleep(&self) {
        tokio::time::sleep(Duration::from_millis(self.current_ms())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;

    #[test]
    fn classify_no_change_is_skip() {
        let d = classify_reparse(10, b"abc", 10, b"abc");
        assert_eq!(d, ReparseDecision::Skip(SkipReason::NoNewContent));
    }

    #[test]
    fn classify_empty_file_is_skip() {
        let d = classify_reparse(10, b"abc", 0, b"");
        assert_eq!(d, ReparseDecision::Skip(SkipReason::EmptyFile));
    }

    #[test]
    fn classify_growth_with_stable_prefix_is_incremental() {
        let d = classify_reparse(3, b"abc", 6, b"abcdef");
        assert_eq!(d, ReparseDecision::Incremental);
    }

    #[test]
    fn classify_prefix_change_is_full() {
        let d = classify_reparse(3, b"abc", 6, b"xyzdef");
        assert_eq!(d, ReparseDecision::Full);
    }

    #[test]
    fn classify_shrink_is_full() {
        let d = classify_reparse(10, b"0123456789", 3, b"012");
        assert_eq!(d, ReparseDecision::Full);
    }

    #[test]
    fn ewma_converges_toward_samples() {
        let mut stats = IndexPerformanceStats::default();
        stats.record_refresh(100.0, 1);
        assert_eq!(stats.average_refresh_duration_ms, 100.0);
        stats.record_refresh(0.0, 2);
        assert!((stats.average_refresh_duration_ms - 80.0).abs() < 1e-9);
    }

    #[test]
    fn dirty_queue_collapses_duplicates_fifo() {
        let mut q = DirtyQueue::default();
        q.push(PathBuf::from("/a"));
        q.push(PathBuf::from("/b"));
        q.push(PathBuf::from("/a"));
        assert_eq!(q.len(), 2);
        let drained = q.drain();
        assert_eq!(drained, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert!(q.is_empty());
    }

    #[test]
    fn dirty_queue_overflow_detected_past_soft_cap() {
        let mut q = DirtyQueue::default();
        for i in 0..=DIRTY_QUEUE_SOFT_CAP {
            q.push(PathBuf::from(format!("/p{i}")));
        }
        assert!(q.overflowed());
    }

    #[test]
    fn adaptive_mode_shrinks_and_grows() {
        let cfg = ScanConfig {
            mode: "adaptive".into(),
            interval_min_ms: 1000,
            interval_max_ms: 8000,
            ..ScanConfig::default()
        };
        let mut interval = AdaptiveInterval::from_config(&cfg);
        assert_eq!(interval.current_ms(), 1000);
        interval.observe(false);
        assert_eq!(interval.current_ms(), 2000);
        interval.observe(false);
        assert_eq!(interval.current_ms(), 4000);
        interval.observe(true);
        assert_eq!(interval.current_ms(), 2000);
    }

    #[test]
    fn fixed_mode_holds_interval_seconds_exactly() {
        let cfg = ScanConfig {
            mode: "fixed".into(),
            interval_seconds: 7,
            interval_min_ms: 1000,
            interval_max_ms: 8000,
            ..ScanConfig::default()
        };
        let mut interval = AdaptiveInterval::from_config(&cfg);
        assert_eq!(interval.current_ms(), 7000);
        interval.observe(true);
        assert_eq!(interval.current_ms(), 7000);
        interval.observe(false);
        assert_eq!(interval.current_ms(), 7000);
    }
}
