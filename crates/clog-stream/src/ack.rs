use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use clog_store::ProgressStore;
use clog_types::{ConsumerId, Offset};

use crate::error::{StreamError, StreamResult};

/// Per-consumer acknowledged progress.
///
/// Each consumer's slot holds `acknowledged + 1`, so `0` means "nothing
/// acknowledged yet" and raising progress is a single `fetch_max`. An
/// acknowledgment is persisted to the [`ProgressStore`] before the slot is
/// raised, so a failed write never becomes visible.
pub struct AckTracker<P> {
    store: P,
    slots: RwLock<HashMap<ConsumerId, Arc<AtomicU64>>>,
}

impl<P: ProgressStore> AckTracker<P> {
    /// Start with no recorded progress.
    pub fn new(store: P) -> Self {
        Self {
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild in-memory progress from whatever `store` has persisted.
    ///
    /// Progress at or past `next_offset` refers to events the log no longer
    /// holds (an event tail lost in a crash). It is rewound to the last event,
    /// or forgotten when the log is empty, and the rewind is persisted.
    pub fn recover(store: P, next_offset: Offset) -> StreamResult<Self> {
        let mut slots = HashMap::new();
        for (consumer, offset) in store.load()? {
            let offset = if offset < next_offset {
                Some(offset)
            } else {
                let last = next_offset.checked_sub(1);
                warn!(
                    consumer = %consumer,
                    progress = offset,
                    next_offset,
                    "acknowledged progress is past the end of the log; rewinding"
                );
                store.rewind(&consumer, last)?;
                last
            };
            if let Some(offset) = offset {
                slots.insert(consumer, Arc::new(AtomicU64::new(offset + 1)));
            }
        }

        info!(consumers = slots.len(), "consumer progress loaded");
        Ok(Self {
            store,
            slots: RwLock::new(slots),
        })
    }

    /// Record that `consumer` has processed everything up to and including
    /// `offset`. Lower acknowledgments are accepted and ignored.
    ///
    /// Returns the consumer's progress after the call.
    pub fn acknowledge(
        &self,
        consumer: &ConsumerId,
        offset: Offset,
        next_offset: Offset,
    ) -> StreamResult<Offset> {
        if offset >= next_offset {
            return Err(StreamError::OutOfRange {
                offset,
                next_offset,
            });
        }

        let slot = self.slot(consumer);
        let target = offset + 1;
        let current = slot.load(Ordering::Acquire);
        if current >= target {
            debug!(consumer = %consumer, offset, progress = current - 1, "stale acknowledgment ignored");
            return Ok(current - 1);
        }

        self.store.record(consumer, offset)?;
        let previous = slot.fetch_max(target, Ordering::AcqRel);
        let progress = previous.max(target) - 1;

        debug!(consumer = %consumer, offset, progress, "acknowledged");
        Ok(progress)
    }

    /// Highest acknowledged offset, or `None` if `consumer` has never
    /// acknowledged anything.
    pub fn progress(&self, consumer: &ConsumerId) -> Option<Offset> {
        let slots = self.slots.read().expect("ack slots lock poisoned");
        match slots.get(consumer)?.load(Ordering::Acquire) {
            0 => None,
            raw => Some(raw - 1),
        }
    }

    /// Where a restarted consumer should subscribe from.
    pub fn resume_offset(&self, consumer: &ConsumerId) -> Offset {
        self.progress(consumer).map_or(0, |acked| acked + 1)
    }

    /// Every consumer with recorded progress, sorted by id.
    pub fn all(&self) -> Vec<(ConsumerId, Offset)> {
        let slots = self.slots.read().expect("ack slots lock poisoned");
        let mut all: Vec<_> = slots
            .iter()
            .filter_map(|(consumer, slot)| match slot.load(Ordering::Acquire) {
                0 => None,
                raw => Some((consumer.clone(), raw - 1)),
            })
            .collect();
        all.sort();
        all
    }

    /// Number of consumers with recorded progress.
    pub fn tracked(&self) -> usize {
        let slots = self.slots.read().expect("ack slots lock poisoned");
        slots
            .values()
            .filter(|slot| slot.load(Ordering::Acquire) > 0)
            .count()
    }

    fn slot(&self, consumer: &ConsumerId) -> Arc<AtomicU64> {
        if let Some(slot) = self
            .slots
            .read()
            .expect("ack slots lock poisoned")
            .get(consumer)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().expect("ack slots lock poisoned");
        Arc::clone(slots.entry(consumer.clone()).or_default())
    }
}
