//! Date-keyed snapshot store. The engine only ever replaces whole days, so
//! the trait has no update-in-place: a recompute is a single `replace_day`.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use margin_core::types::DailySnapshotSet;
use margin_core::MarginResult;
use tracing::debug;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read_day(&self, date: NaiveDate) -> MarginResult<Option<DailySnapshotSet>>;

    /// Atomically replace everything stored for `date`. A reader sees either
    /// the previous day's snapshot or the new one, never a partial state.
    async fn replace_day(&self, date: NaiveDate, set: DailySnapshotSet) -> MarginResult<()>;

    /// All stored days with `start <= date <= end`, ordered by date.
    async fn read_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MarginResult<Vec<DailySnapshotSet>>;
}

/// In-memory snapshot store backed by `DashMap`. The whole-day value is the
/// map entry, so `replace_day` is a single atomic insert.
#[derive(Default)]
pub struct MemorySnapshotStore {
    days: DashMap<NaiveDate, DailySnapshotSet>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read_day(&self, date: NaiveDate) -> MarginResult<Option<DailySnapshotSet>> {
        Ok(self.days.get(&date).map(|e| e.value().clone()))
    }

    async fn replace_day(&self, date: NaiveDate, set: DailySnapshotSet) -> MarginResult<()> {
        let replaced = self.days.insert(date, set).is_some();
        debug!(%date, replaced, "Snapshot day written");
        Ok(())
    }

    async fn read_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MarginResult<Vec<DailySnapshotSet>> {
        let mut days: Vec<DailySnapshotSet> = self
            .days
            .iter()
            .filter(|e| *e.key() >= start && *e.key() <= end)
            .map(|e| e.value().clone())
            .collect();
        days.sort_by_key(|d| d.summary.date);
        Ok(days)
    }
}
