//! Revenue attribution. Each order is assigned to exactly one bot (or to
//! the unattributed bucket) by a last-touch-before / first-touch-after
//! policy over done-status usage events within a bounded window.

use chrono::Duration;
use margin_core::types::{Order, TaskStatus, UsageEvent};
use std::collections::HashMap;
use tracing::debug;

/// Attributed totals for one bot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotRevenue {
    pub revenue: f64,
    pub order_count: u64,
}

/// Attribution result for a batch of orders. Conservation holds exactly:
/// `attributed_revenue + unattributed_revenue == total_order_revenue`,
/// because every order lands in precisely one of the two buckets.
#[derive(Debug, Clone, Default)]
pub struct AttributionOutcome {
    pub per_bot: HashMap<String, BotRevenue>,
    pub attributed_revenue: f64,
    pub attributed_order_count: u64,
    pub unattributed_revenue: f64,
    pub total_order_revenue: f64,
}

impl AttributionOutcome {
    pub fn coverage_pct(&self) -> f64 {
        if self.total_order_revenue > 0.0 {
            self.attributed_revenue / self.total_order_revenue * 100.0
        } else {
            0.0
        }
    }
}

pub struct AttributionResolver {
    window_days: i64,
}

impl AttributionResolver {
    pub fn new(window_days: i64) -> Self {
        Self { window_days }
    }

    /// Attribute each order in isolation. `events` must span at least
    /// `window_days` on both sides of the orders' dates so candidates
    /// outside the order's own day are visible.
    ///
    /// Per order: the latest done event for the same user at or before the
    /// order wins (last-touch-before). Failing that, the earliest done
    /// event within `window_days` after it wins (first-touch-after) —
    /// payment can settle marginally before the triggering session is
    /// logged. Failing both, the order is unattributed.
    pub fn attribute(&self, orders: &[Order], events: &[UsageEvent]) -> AttributionOutcome {
        // Per-user (timestamp, slug) lists sorted by timestamp, so both
        // touch rules are a binary search instead of a scan.
        let mut by_user: HashMap<u64, Vec<(i64, &str)>> = HashMap::new();
        for event in events {
            if event.status != TaskStatus::Done {
                continue;
            }
            by_user
                .entry(event.user_id)
                .or_default()
                .push((event.created_at.timestamp(), event.slug_id.as_str()));
        }
        for touches in by_user.values_mut() {
            touches.sort_unstable();
        }

        let window = Duration::days(self.window_days);
        let mut outcome = AttributionOutcome::default();

        for order in orders {
            outcome.total_order_revenue += order.amount_usd;

            let attributed_slug = by_user
                .get(&order.user_id)
                .and_then(|touches| pick_touch(touches, order, window));

            match attributed_slug {
                Some(slug) => {
                    let bot = outcome.per_bot.entry(slug.to_string()).or_default();
                    bot.revenue += order.amount_usd;
                    bot.order_count += 1;
                    outcome.attributed_revenue += order.amount_usd;
                    outcome.attributed_order_count += 1;
                }
                None => outcome.unattributed_revenue += order.amount_usd,
            }
        }

        debug!(
            orders = orders.len(),
            bots = outcome.per_bot.len(),
            coverage_pct = outcome.coverage_pct(),
            "Orders attributed"
        );
        outcome
    }
}

fn pick_touch<'a>(
    touches: &[(i64, &'a str)],
    order: &Order,
    window: Duration,
) -> Option<&'a str> {
    let t = order.created_at.timestamp();
    // Index of the first touch strictly after the order.
    let split = touches.partition_point(|&(ts, _)| ts <= t);

    // Last-touch-before takes priority.
    if split > 0 {
        return Some(touches[split - 1].1);
    }

    // First-touch-after, bounded by the lookahead window.
    let deadline = t + window.num_seconds();
    touches
        .get(split)
        .filter(|&&(ts, _)| ts <= deadline)
        .map(|&(_, slug)| slug)
}

// ---------------------------------------------------------------------------
// Proportional model
// ---------------------------------------------------------------------------

/// The separate allocation model used only for trend display: each user's
/// total period spend is split across bots in proportion to that user's
/// done-task counts per bot in the same period. Not an attribution rule —
/// never combine its output with the last-touch model above.
pub fn allocate_proportional(
    orders: &[Order],
    events: &[UsageEvent],
) -> HashMap<String, f64> {
    let mut spend_by_user: HashMap<u64, f64> = HashMap::new();
    for order in orders {
        *spend_by_user.entry(order.user_id).or_default() += order.amount_usd;
    }

    let mut tasks_by_user: HashMap<u64, HashMap<&str, u64>> = HashMap::new();
    for event in events {
        if event.status != TaskStatus::Done {
            continue;
        }
        *tasks_by_user
            .entry(event.user_id)
            .or_default()
            .entry(event.slug_id.as_str())
            .or_default() += 1;
    }

    let mut allocated: HashMap<String, f64> = HashMap::new();
    for (user_id, spend) in spend_by_user {
        let Some(tasks) = tasks_by_user.get(&user_id) else {
            continue;
        };
        let total_tasks: u64 = tasks.values().sum();
        if total_tasks == 0 {
            continue;
        }
        for (slug, count) in tasks {
            *allocated.entry((*slug).to_string()).or_default() +=
                spend * (*count as f64 / total_tasks as f64);
        }
    }
    allocated
}
