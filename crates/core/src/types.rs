use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Source rows
// ---------------------------------------------------------------------------

/// Membership tier of the user who triggered a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Paid,
    Free,
}

/// Terminal status of a usage event. Events are consumed only once they
/// reach one of these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Done,
    Cancel,
}

/// A single metered bot invocation from the serving system's usage log.
/// `energy_cost` is in internal energy units, converted to USD downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub user_id: u64,
    pub bot_id: u64,
    pub slug_id: String,
    pub energy_cost: i64,
    pub membership: Membership,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// A completed task logged independently by the specialized app. Used only
/// as a matching target when splitting the usage log by subsystem; the two
/// logs share no key, so matching is approximate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEvent {
    pub user_id: u64,
    pub bot_id: u64,
    pub energy_cost: i64,
    pub updated_at: DateTime<Utc>,
}

/// Payment channel an order arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderChannel {
    Card,
    Wallet,
    AppStore,
}

impl std::fmt::Display for OrderChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Card => "card",
            Self::Wallet => "wallet",
            Self::AppStore => "app_store",
        };
        write!(f, "{}", s)
    }
}

/// Raw card-processor order. `amount` arrives as a decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardOrderRow {
    pub user_id: u64,
    pub amount: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Raw wallet-provider order. Energy-pack purchases carry a zero placeholder
/// `amount` and a `pack_id` that resolves against a static price table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletOrderRow {
    pub user_id: u64,
    pub amount: String,
    pub status: String,
    pub pack_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw app-store transaction. The amount is never on the row; it is always
/// resolved from the product catalog by `product_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStoreOrderRow {
    pub user_id: u64,
    pub product_id: String,
    pub created_at: DateTime<Utc>,
}

/// A normalized monetary order, merged from all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub user_id: u64,
    pub amount_usd: f64,
    pub created_at: DateTime<Utc>,
    pub channel: OrderChannel,
}

// ---------------------------------------------------------------------------
// Identity rows
// ---------------------------------------------------------------------------

/// How an account entered the primary user ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountSource {
    Registered,
    Visitor,
    #[serde(other)]
    Unknown,
}

/// Row from the primary user ledger. Present for every account the platform
/// knows about, including visitors who never registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLedgerRow {
    pub user_id: u64,
    pub account_source: AccountSource,
    pub is_creator: bool,
}

/// Live identity record for a registered account. Email candidates are an
/// ordered fallback list (primary, then google, then apple); an empty string
/// means that candidate is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub user_id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub google_email: String,
    #[serde(default)]
    pub apple_email: String,
}

impl IdentityRecord {
    /// First non-empty email candidate, in documented priority order.
    pub fn resolved_email(&self) -> Option<&str> {
        [&self.email, &self.google_email, &self.apple_email]
            .into_iter()
            .find(|e| !e.is_empty())
            .map(String::as_str)
    }
}

/// Historical identity recovered from the deletion audit log, for accounts
/// whose live identity row is gone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionAuditEntry {
    pub user_id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub google_email: String,
    #[serde(default)]
    pub apple_email: String,
}

impl DeletionAuditEntry {
    pub fn resolved_email(&self) -> Option<&str> {
        [&self.email, &self.google_email, &self.apple_email]
            .into_iter()
            .find(|e| !e.is_empty())
            .map(String::as_str)
    }
}

/// Identity lookups for one computation, keyed by user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityBundle {
    pub ledger: std::collections::HashMap<u64, UserLedgerRow>,
    pub live: std::collections::HashMap<u64, IdentityRecord>,
    pub deleted: std::collections::HashMap<u64, DeletionAuditEntry>,
}

/// Display metadata for a bot. Aggregates fall back to "Unknown" when no
/// profile exists for a slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub bot_id: u64,
    pub slug_id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Snapshot shapes
// ---------------------------------------------------------------------------

/// Per-bot margin row for one day. One row per (date, slug); a recompute
/// replaces the whole day, never updates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotDailyAggregate {
    pub date: NaiveDate,
    pub slug_id: String,
    pub bot_name: String,
    pub attributed_revenue: f64,
    pub attributed_order_count: u64,
    /// `None` means "no orders", which is distinct from a $0 average.
    pub avg_order_amount: Option<f64>,
    pub paid_cost: f64,
    pub paid_task_count: u64,
    pub free_cost: f64,
    pub free_task_count: u64,
    pub total_cost: f64,
    pub task_count: u64,
    pub gross_profit: f64,
    pub gross_margin_pct: f64,
}

/// Whole-day summary row. Sentinel convention for `gross_margin_pct`:
/// `0.0` when revenue and cost are both zero, `-100.0` when revenue is zero
/// but cost is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,

    // Cost side
    pub paid_cost: f64,
    pub free_cost_regular_email: f64,
    pub free_cost_temp_email: f64,
    pub free_cost_aliased_email: f64,
    pub free_cost_deleted: f64,
    pub free_cost_visitor: f64,
    pub free_cost: f64,
    pub total_cost: f64,
    pub free_cost_share_pct: f64,

    // Revenue side
    pub card_revenue: f64,
    pub wallet_revenue: f64,
    pub app_store_revenue: f64,
    pub total_revenue: f64,

    // Margin
    pub gross_profit: f64,
    pub gross_margin_pct: f64,

    // Attribution
    pub total_order_revenue: f64,
    pub attributed_revenue: f64,
    pub unattributed_revenue: f64,
    pub attribution_coverage_pct: f64,
}

/// Daily split of usage cost into the specialized app vs the main app, with
/// the main-app share further split by creator flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemBreakdown {
    pub date: NaiveDate,
    pub specialized_cost: f64,
    pub specialized_cost_pct: f64,
    pub main_creator_cost: f64,
    pub main_creator_cost_pct: f64,
    pub main_non_creator_cost: f64,
    pub main_non_creator_cost_pct: f64,
    pub main_cost_pct: f64,
    pub creator_share_of_main_pct: f64,
    pub total_cost: f64,
}

/// One row of the daily free-cost-by-bot ranking (top N by free cost).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeCostByBotRow {
    pub date: NaiveDate,
    pub slug_id: String,
    pub bot_name: String,
    pub free_cost: f64,
    pub free_task_count: u64,
    pub free_user_count: u64,
    pub share_of_free_pct: f64,
    pub rank: u32,
}

/// Per-bot row under the proportional allocation model, stored daily for
/// trend display and weekly rollups. Costs are already in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotTrendRow {
    pub date: NaiveDate,
    pub slug_id: String,
    pub bot_name: String,
    pub proportional_revenue: f64,
    pub task_count: u64,
    pub paid_task_count: u64,
    pub free_task_count: u64,
    pub paid_cost: f64,
    pub free_cost: f64,
}

/// Everything the engine writes for one date. Replaced as a unit so a
/// reader sees either the old day or the fully recomputed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshotSet {
    pub summary: DailySummary,
    pub bots: Vec<BotDailyAggregate>,
    pub breakdown: SubsystemBreakdown,
    pub free_cost_by_bot: Vec<FreeCostByBotRow>,
    pub trend: Vec<BotTrendRow>,
}
