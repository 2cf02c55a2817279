//! Read-only data source seam. The engine never talks to a warehouse
//! directly; it issues range queries through this trait and computes over
//! whatever rows come back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use margin_core::types::{
    AppStoreOrderRow, BotProfile, CardOrderRow, IdentityBundle, ReferenceEvent, TaskStatus,
    UsageEvent, WalletOrderRow,
};
use margin_core::MarginResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Usage events with `created_at` in `[start, end]` and one of the given
    /// terminal statuses.
    async fn usage_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[TaskStatus],
    ) -> MarginResult<Vec<UsageEvent>>;

    /// Specialized-app reference events with `updated_at` in `[start, end]`.
    async fn reference_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<ReferenceEvent>>;

    async fn card_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<CardOrderRow>>;

    async fn wallet_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<WalletOrderRow>>;

    async fn app_store_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<AppStoreOrderRow>>;

    /// Ledger, live-identity, and deletion-audit rows for the given users.
    async fn identity_bundle(&self, user_ids: &[u64]) -> MarginResult<IdentityBundle>;

    async fn bot_profiles(&self) -> MarginResult<Vec<BotProfile>>;
}

// ---------------------------------------------------------------------------
// Static source
// ---------------------------------------------------------------------------

/// Full row set backing a [`StaticDataSource`]. Serializable so development
/// fixtures can live in a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceFixture {
    #[serde(default)]
    pub usage_events: Vec<UsageEvent>,
    #[serde(default)]
    pub reference_events: Vec<ReferenceEvent>,
    #[serde(default)]
    pub card_orders: Vec<CardOrderRow>,
    #[serde(default)]
    pub wallet_orders: Vec<WalletOrderRow>,
    #[serde(default)]
    pub app_store_orders: Vec<AppStoreOrderRow>,
    #[serde(default)]
    pub identities: IdentityBundle,
    #[serde(default)]
    pub bot_profiles: Vec<BotProfile>,
}

/// In-memory data source for development and tests. Range filtering mirrors
/// the warehouse queries; everything else is a straight copy of the fixture.
pub struct StaticDataSource {
    fixture: SourceFixture,
}

impl StaticDataSource {
    pub fn new(fixture: SourceFixture) -> Self {
        info!(
            usage_events = fixture.usage_events.len(),
            reference_events = fixture.reference_events.len(),
            "StaticDataSource initialized (in-memory, development mode)"
        );
        Self { fixture }
    }

    /// Load a fixture from a JSON file.
    pub fn from_json_file(path: &Path) -> MarginResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: SourceFixture = serde_json::from_str(&raw)?;
        Ok(Self::new(fixture))
    }
}

fn in_range(t: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    t >= start && t <= end
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn usage_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        statuses: &[TaskStatus],
    ) -> MarginResult<Vec<UsageEvent>> {
        Ok(self
            .fixture
            .usage_events
            .iter()
            .filter(|e| in_range(e.created_at, start, end) && statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn reference_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<ReferenceEvent>> {
        Ok(self
            .fixture
            .reference_events
            .iter()
            .filter(|e| in_range(e.updated_at, start, end))
            .cloned()
            .collect())
    }

    async fn card_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<CardOrderRow>> {
        Ok(self
            .fixture
            .card_orders
            .iter()
            .filter(|o| in_range(o.created_at, start, end))
            .cloned()
            .collect())
    }

    async fn wallet_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<WalletOrderRow>> {
        Ok(self
            .fixture
            .wallet_orders
            .iter()
            .filter(|o| in_range(o.created_at, start, end))
            .cloned()
            .collect())
    }

    async fn app_store_orders(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MarginResult<Vec<AppStoreOrderRow>> {
        Ok(self
            .fixture
            .app_store_orders
            .iter()
            .filter(|o| in_range(o.created_at, start, end))
            .cloned()
            .collect())
    }

    async fn identity_bundle(&self, user_ids: &[u64]) -> MarginResult<IdentityBundle> {
        let wanted: HashSet<u64> = user_ids.iter().copied().collect();
        let all = &self.fixture.identities;
        Ok(IdentityBundle {
            ledger: all
                .ledger
                .iter()
                .filter(|(id, _)| wanted.contains(id))
                .map(|(id, row)| (*id, row.clone()))
                .collect(),
            live: all
                .live
                .iter()
                .filter(|(id, _)| wanted.contains(id))
                .map(|(id, row)| (*id, row.clone()))
                .collect(),
            deleted: all
                .deleted
                .iter()
                .filter(|(id, _)| wanted.contains(id))
                .map(|(id, row)| (*id, row.clone()))
                .collect(),
        })
    }

    async fn bot_profiles(&self) -> MarginResult<Vec<BotProfile>> {
        Ok(self.fixture.bot_profiles.clone())
    }
}
