//! Change Stream Bus (spec §4.7): a totally ordered sequence of envelopes
//! fanned out to independent, bounded-queue subscribers.

use crate::store::TraceEntry;
use crate::types::{NormalizedEvent, Trace};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Per-subscriber bounded queue depth before a subscriber is dropped.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Idle heartbeat cadence (spec §4.7).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Overview counters carried by `snapshot`/`overview_updated` envelopes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverviewStats {
    pub trace_count: usize,
    pub hot_count: usize,
    pub warm_count: usize,
    pub cold_count: usize,
    pub total_event_count: u64,
    pub running_count: usize,
    pub waiting_input_count: usize,
    pub idle_count: usize,
}

/// The payload carried by one [`StreamEnvelope`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopePayload {
    Snapshot {
        overview: OverviewStats,
        traces: Vec<Trace>,
    },
    TraceAdded {
        trace: Trace,
    },
    TraceUpdated {
        trace: Trace,
    },
    TraceRemoved {
        trace_id: String,
    },
    EventsAppended {
        trace_id: String,
        from_index: u64,
        events: Vec<NormalizedEvent>,
    },
    OverviewUpdated {
        overview: OverviewStats,
    },
    Heartbeat {
        ts_ms: i64,
    },
}

/// One message on the bus (spec §4.7 wire-stable envelope format).
#[derive(Debug, Clone, Serialize)]
pub struct StreamEnvelope {
    pub id: u64,
    pub version: u64,
    #[serde(flatten)]
    pub payload: EnvelopePayload,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<StreamEnvelope>,
}

/// A live subscription handle. Dropping it does not unsubscribe; call
/// [`ChangeStreamBus::unsubscribe`] or let a full queue drop it instead.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<StreamEnvelope>,
}

/// The change-stream bus (spec §4.7). Envelope ids are monotonic per
/// bus instance; subscribers are independent, FIFO, and dropped on a
/// full queue rather than blocking the driver.
pub struct ChangeStreamBus {
    next_envelope_id: AtomicU64,
    next_subscriber_id: AtomicU64,
    subscribers: std::sync::Mutex<Vec<Subscriber>>,
    last_send: std::sync::Mutex<Instant>,
}

impl ChangeStreamBus {
    pub fn new() -> Self {
        Self {
            next_envelope_id: AtomicU64::new(1),
            next_subscriber_id: AtomicU64::new(1),
            subscribers: std::sync::Mutex::new(Vec::new()),
            last_send: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_envelope_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a new subscriber. The caller is responsible for sending
    /// the initial `snapshot` envelope to this subscription before
    /// publishing further deltas (spec §5: "a snapshot envelope
    /// precedes any delta delivered to the same subscriber").
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().unwrap().push(Subscriber { id, tx });
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Publish `payload` to every subscriber, dropping (and
    /// unsubscribing) any whose queue is full.
    pub fn publish(&self, version: u64, payload: EnvelopePayload) {
        let envelope = StreamEnvelope {
            id: self.next_id(),
            version,
            payload,
        };
        *self.last_send.lock().unwrap() = Instant::now();
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|s| match s.tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(subscriber_id = s.id, "subscriber queue full, dropping");
                false
            }
        });
    }

    /// Send a `snapshot` envelope to exactly one subscriber (used on
    /// initial subscribe and on forced resubscribe after a drop).
    pub fn send_snapshot_to(&self, subscriber_id: u64, overview: OverviewStats, traces: Vec<Trace>) {
        let envelope = StreamEnvelope {
            id: self.next_id(),
            version: 0,
            payload: EnvelopePayload::Snapshot { overview, traces },
        };
        let subs = self.subscribers.lock().unwrap();
        if let Some(sub) = subs.iter().find(|s| s.id == subscriber_id) {
            let _ = sub.tx.try_send(envelope);
        }
    }

    /// Emit a heartbeat if no other envelope has been sent within
    /// [`HEARTBEAT_INTERVAL`].
    pub fn maybe_heartbeat(&self, now_ms: i64) {
        let mut last = self.last_send.lock().unwrap();
        if last.elapsed() >= HEARTBEAT_INTERVAL {
            drop(last);
            self.publish(0, EnvelopePayload::Heartbeat { ts_ms: now_ms });
            last = self.last_send.lock().unwrap();
            *last = Instant::now();
        }
    }
}

impl Default for ChangeStreamBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute [`OverviewStats`] from the current set of trace entries.
pub fn compute_overview<'a>(entries: impl Iterator<Item = &'a TraceEntry>) -> OverviewStats {
    let mut overview = OverviewStats::default();
    for entry in entries {
        overview.trace_count += 1;
        overview.total_event_count += entry.trace.event_count;
        match entry.trace.resident_tier {
            crate::types::Tier::Hot => overview.hot_count += 1,
            crate::types::Tier::Warm => overview.warm_count += 1,
            crate::types::Tier::Cold => overview.cold_count += 1,
        }
        match entry.trace.activity_status {
            crate::types::ActivityStatus::Running => overview.running_count += 1,
            crate::types::ActivityStatus::WaitingInput => overview.waiting_input_count += 1,
            crate::types::ActivityStatus::Idle => overview.idle_count += 1,
        }
    }
    overview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn envelope_ids_increase_monotonically() {
        let bus = ChangeStreamBus::new();
        let mut sub = bus.subscribe();
        bus.publish(1, EnvelopePayload::TraceRemoved { trace_id: "a".into() });
        bus.publish(2, EnvelopePayload::TraceRemoved { trace_id: "b".into() });
        let first = sub.rx.recv().await.unwrap();
        let second = sub.rx.recv().await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber() {
        let bus = ChangeStreamBus::new();
        let sub = bus.subscribe();
        for i in 0..SUBSCRIBER_QUEUE_CAPACITY + 10 {
            bus.publish(
                i as u64,
                EnvelopePayload::TraceRemoved {
                    trace_id: format!("t{i}"),
                },
            );
        }
        assert_eq!(bus.subscriber_count(), 0);
        drop(sub);
    }

    #[test]
    fn compute_overview_counts_tiers_and_status() {
        let mut t1 = crate::types::Trace::new_empty("a".into(), "p".into(), "/a".into());
        t1.resident_tier = crate::types::Tier::Hot;
        t1.activity_status = crate::types::ActivityStatus::Running;
        let mut t2 = crate::types::Trace::new_empty("b".into(), "p".into(), "/b".into());
        t2.resident_tier = crate::types::Tier::Cold;
        t2.activity_status = crate::types::ActivityStatus::Idle;

        let entries = vec![
            TraceEntry {
                trace: t1,
                events: vec![],
            },
            TraceEntry {
                trace: t2,
                events: vec![],
            },
        ];
        let overview = compute_overview(entries.iter());
        assert_eq!(overview.trace_count, 2);
        assert_eq!(overview.hot_count, 1);
        assert_eq!(overview.cold_count, 1);
        assert_eq!(overview.running_count, 1);
        assert_eq!(overview.idle_count, 1);
    }
}
