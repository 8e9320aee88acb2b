//! Precomputed neighbor pool, replaced wholesale on refresh

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::domain::{InteractionRecord, UserId, UserInteractionVector};

/// Immutable view of every user's interaction vector at one point in time.
#[derive(Debug, Clone, Default)]
pub struct NeighborSnapshot {
    generation: u64,
    built_at: Option<DateTime<Utc>>,
    newest_update: Option<DateTime<Utc>>,
    vectors: BTreeMap<UserId, UserInteractionVector>,
}

impl NeighborSnapshot {
    /// Build from raw interaction history. Users whose records all fail to
    /// contribute are left out. The generation stays 0 until the snapshot is
    /// published through a [`SnapshotCell`].
    pub fn build(
        interactions: &HashMap<UserId, Vec<InteractionRecord>>,
        built_at: DateTime<Utc>,
    ) -> Self {
        let mut vectors = BTreeMap::new();
        let mut newest_update: Option<DateTime<Utc>> = None;

        for (user_id, records) in interactions {
            for record in records {
                newest_update = Some(match newest_update {
                    Some(current) => current.max(record.updated_at),
                    None => record.updated_at,
                });
            }

            let vector = UserInteractionVector::from_records(records);
            if !vector.is_empty() {
                vectors.insert(user_id.clone(), vector);
            }
        }

        Self { generation: 0, built_at: Some(built_at), newest_update, vectors }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    /// Most recent `updated_at` seen across all records.
    pub fn newest_update(&self) -> Option<DateTime<Utc>> {
        self.newest_update
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vector(&self, user_id: &UserId) -> Option<&UserInteractionVector> {
        self.vectors.get(user_id)
    }

    pub fn vectors(&self) -> impl Iterator<Item = (&UserId, &UserInteractionVector)> {
        self.vectors.iter()
    }
}

/// Ticket handed out before a refresh reads the store. Publishing with an
/// older ticket than the one already published is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

#[derive(Debug, Default)]
struct Slot {
    snapshot: Option<Arc<NeighborSnapshot>>,
    /// Newest ticket that published or cleared; survives `clear()`.
    high_water: u64,
    /// Last generation handed out; survives `clear()`.
    generation: u64,
}

/// Holder for the current snapshot.
///
/// Readers clone the `Arc` and release the lock immediately; publishing swaps
/// the pointer, so a reader sees either the previous snapshot or the new one
/// in full. Generations only ever increase, including across `clear()`.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    tickets: AtomicU64,
    slot: RwLock<Slot>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<NeighborSnapshot>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).snapshot.clone()
    }

    /// Take a ticket. Call this before reading the data the snapshot is built from.
    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket(self.tickets.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Publish `snapshot` as the next generation and return it, or `None`
    /// when a refresh that started later has already published or the cell
    /// was cleared after `ticket` was taken.
    pub fn publish(
        &self,
        ticket: RefreshTicket,
        mut snapshot: NeighborSnapshot,
    ) -> Option<Arc<NeighborSnapshot>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if ticket.0 <= slot.high_water {
            return None;
        }

        slot.high_water = ticket.0;
        slot.generation += 1;
        snapshot.generation = slot.generation;
        let published = Arc::new(snapshot);
        slot.snapshot = Some(Arc::clone(&published));
        Some(published)
    }

    /// Drop the snapshot and discard any refresh already in flight. Returns
    /// whether a snapshot was present.
    pub fn clear(&self) -> bool {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.high_water = slot.high_water.max(self.tickets.load(Ordering::SeqCst));
        slot.snapshot.take().is_some()
    }

    pub fn generation(&self) -> Option<u64> {
        self.load().map(|snapshot| snapshot.generation)
    }
}
