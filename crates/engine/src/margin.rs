//! Margin aggregation: per-bot and whole-day gross profit and margin, with
//! a fixed sentinel convention for the zero-revenue cases.

use crate::attribution::AttributionOutcome;
use crate::categorizer::CostReport;
use crate::classifier::ClassifiedEvents;
use chrono::NaiveDate;
use margin_core::types::{
    BotDailyAggregate, BotTrendRow, DailySummary, FreeCostByBotRow, Membership, Order,
    OrderChannel, SubsystemBreakdown, UsageEvent,
};
use std::collections::{HashMap, HashSet};

/// Margin sentinel used when revenue is zero and cost is zero.
pub const MARGIN_EVEN_SENTINEL: f64 = 0.0;
/// Margin sentinel used when revenue is zero but cost is positive.
pub const MARGIN_LOSS_SENTINEL: f64 = -100.0;

/// `(revenue - cost) / revenue * 100`, or the sentinel pair when revenue
/// is zero. Never NaN or infinite.
pub fn gross_margin_pct(revenue: f64, cost: f64) -> f64 {
    if revenue > 0.0 {
        (revenue - cost) / revenue * 100.0
    } else if cost > 0.0 {
        MARGIN_LOSS_SENTINEL
    } else {
        MARGIN_EVEN_SENTINEL
    }
}

/// Per-bot cost and task rollup for one day, before revenue is merged in.
#[derive(Debug, Clone, Default)]
pub struct BotCostRollup {
    pub slug_id: String,
    pub bot_name: String,
    pub paid_cost: f64,
    pub paid_task_count: u64,
    pub free_cost: f64,
    pub free_task_count: u64,
    pub free_user_ids: HashSet<u64>,
    pub total_cost: f64,
    pub task_count: u64,
}

/// Group the day's events by slug, splitting cost and task counts by
/// membership. Bots with zero total cost are dropped, matching the source
/// rollup's `HAVING total_cost > 0`.
pub fn rollup_bot_costs(
    events: &[UsageEvent],
    bot_names: &HashMap<String, String>,
    energy_to_usd: f64,
) -> Vec<BotCostRollup> {
    let mut by_slug: HashMap<&str, BotCostRollup> = HashMap::new();
    for event in events {
        let entry = by_slug.entry(event.slug_id.as_str()).or_insert_with(|| {
            BotCostRollup {
                slug_id: event.slug_id.clone(),
                bot_name: bot_names
                    .get(&event.slug_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                ..Default::default()
            }
        });
        let cost = event.energy_cost as f64 * energy_to_usd;
        entry.total_cost += cost;
        entry.task_count += 1;
        match event.membership {
            Membership::Paid => {
                entry.paid_cost += cost;
                entry.paid_task_count += 1;
            }
            Membership::Free => {
                entry.free_cost += cost;
                entry.free_task_count += 1;
                entry.free_user_ids.insert(event.user_id);
            }
        }
    }

    let mut rollups: Vec<BotCostRollup> =
        by_slug.into_values().filter(|r| r.total_cost > 0.0).collect();
    rollups.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
    rollups
}

/// Merge attributed revenue and cost rollups into the day's per-bot
/// aggregates. The union of both key sets is covered: a bot can have
/// revenue without cost (events outside the day) or cost without revenue.
pub fn merge_bot_day(
    date: NaiveDate,
    attribution: &AttributionOutcome,
    costs: &[BotCostRollup],
    bot_names: &HashMap<String, String>,
) -> Vec<BotDailyAggregate> {
    let cost_by_slug: HashMap<&str, &BotCostRollup> =
        costs.iter().map(|c| (c.slug_id.as_str(), c)).collect();

    let mut slugs: HashSet<&str> = cost_by_slug.keys().copied().collect();
    slugs.extend(attribution.per_bot.keys().map(String::as_str));

    let mut rows: Vec<BotDailyAggregate> = slugs
        .into_iter()
        .map(|slug| {
            let revenue = attribution.per_bot.get(slug);
            let cost = cost_by_slug.get(slug);

            let attributed_revenue = revenue.map_or(0.0, |r| r.revenue);
            let attributed_order_count = revenue.map_or(0, |r| r.order_count);
            let avg_order_amount = (attributed_order_count > 0)
                .then(|| attributed_revenue / attributed_order_count as f64);

            let total_cost = cost.map_or(0.0, |c| c.total_cost);
            let gross_profit = attributed_revenue - total_cost;

            BotDailyAggregate {
                date,
                slug_id: slug.to_string(),
                bot_name: cost.map(|c| c.bot_name.clone()).unwrap_or_else(|| {
                    bot_names
                        .get(slug)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string())
                }),
                attributed_revenue,
                attributed_order_count,
                avg_order_amount,
                paid_cost: cost.map_or(0.0, |c| c.paid_cost),
                paid_task_count: cost.map_or(0, |c| c.paid_task_count),
                free_cost: cost.map_or(0.0, |c| c.free_cost),
                free_task_count: cost.map_or(0, |c| c.free_task_count),
                total_cost,
                task_count: cost.map_or(0, |c| c.task_count),
                gross_profit,
                gross_margin_pct: gross_margin_pct(attributed_revenue, total_cost),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.attributed_revenue
            .total_cmp(&a.attributed_revenue)
            .then_with(|| a.slug_id.cmp(&b.slug_id))
    });
    rows
}

/// Build the whole-day summary from the categorized costs, normalized
/// orders, and the attribution outcome.
pub fn build_daily_summary(
    date: NaiveDate,
    costs: &CostReport,
    orders: &[Order],
    attribution: &AttributionOutcome,
) -> DailySummary {
    let mut card_revenue = 0.0;
    let mut wallet_revenue = 0.0;
    let mut app_store_revenue = 0.0;
    for order in orders {
        match order.channel {
            OrderChannel::Card => card_revenue += order.amount_usd,
            OrderChannel::Wallet => wallet_revenue += order.amount_usd,
            OrderChannel::AppStore => app_store_revenue += order.amount_usd,
        }
    }
    let total_revenue = card_revenue + wallet_revenue + app_store_revenue;
    let total_cost = costs.total_cost();
    let gross_profit = total_revenue - total_cost;
    let free_cost_share_pct = if total_cost > 0.0 {
        costs.free_cost / total_cost * 100.0
    } else {
        0.0
    };

    DailySummary {
        date,
        paid_cost: costs.paid_cost,
        free_cost_regular_email: costs.regular_email.cost,
        free_cost_temp_email: costs.temp_email.cost,
        free_cost_aliased_email: costs.aliased_email.cost,
        free_cost_deleted: costs.deleted_account.cost,
        free_cost_visitor: costs.visitor.cost,
        free_cost: costs.free_cost,
        total_cost,
        free_cost_share_pct,
        card_revenue,
        wallet_revenue,
        app_store_revenue,
        total_revenue,
        gross_profit,
        gross_margin_pct: gross_margin_pct(total_revenue, total_cost),
        total_order_revenue: attribution.total_order_revenue,
        attributed_revenue: attribution.attributed_revenue,
        unattributed_revenue: attribution.unattributed_revenue,
        attribution_coverage_pct: attribution.coverage_pct(),
    }
}

/// Split the day's usage cost by subsystem, with the main-app share further
/// split by the ledger's creator flag. Specialized cost is taken from the
/// reference log's side of the match.
pub fn build_subsystem_breakdown(
    date: NaiveDate,
    specialized_energy: i64,
    classified: &ClassifiedEvents,
    creators: &HashSet<u64>,
    energy_to_usd: f64,
) -> SubsystemBreakdown {
    let specialized_cost = specialized_energy as f64 * energy_to_usd;

    let mut main_creator_cost = 0.0;
    let mut main_non_creator_cost = 0.0;
    for event in &classified.main {
        let cost = event.energy_cost as f64 * energy_to_usd;
        if creators.contains(&event.user_id) {
            main_creator_cost += cost;
        } else {
            main_non_creator_cost += cost;
        }
    }

    let main_cost = main_creator_cost + main_non_creator_cost;
    let total_cost = specialized_cost + main_cost;
    let pct = |part: f64| if total_cost > 0.0 { part / total_cost * 100.0 } else { 0.0 };

    SubsystemBreakdown {
        date,
        specialized_cost,
        specialized_cost_pct: pct(specialized_cost),
        main_creator_cost,
        main_creator_cost_pct: pct(main_creator_cost),
        main_non_creator_cost,
        main_non_creator_cost_pct: pct(main_non_creator_cost),
        main_cost_pct: pct(main_cost),
        creator_share_of_main_pct: if main_cost > 0.0 {
            main_creator_cost / main_cost * 100.0
        } else {
            0.0
        },
        total_cost,
    }
}

/// Top-N bots by free-tier cost with each bot's share of the day's total
/// free cost.
pub fn rank_free_cost_by_bot(
    date: NaiveDate,
    costs: &[BotCostRollup],
    total_free_cost: f64,
    limit: usize,
) -> Vec<FreeCostByBotRow> {
    let mut ranked: Vec<&BotCostRollup> = costs.iter().filter(|c| c.free_cost > 0.0).collect();
    ranked.sort_by(|a, b| b.free_cost.total_cmp(&a.free_cost));
    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, c)| FreeCostByBotRow {
            date,
            slug_id: c.slug_id.clone(),
            bot_name: c.bot_name.clone(),
            free_cost: c.free_cost,
            free_task_count: c.free_task_count,
            free_user_count: c.free_user_ids.len() as u64,
            share_of_free_pct: if total_free_cost > 0.0 {
                c.free_cost / total_free_cost * 100.0
            } else {
                0.0
            },
            rank: (i + 1) as u32,
        })
        .collect()
}

/// Per-bot trend rows under the proportional model, stored daily so the
/// weekly report can roll them up without touching raw events again.
pub fn build_trend_rows(
    date: NaiveDate,
    proportional_revenue: &HashMap<String, f64>,
    costs: &[BotCostRollup],
    bot_names: &HashMap<String, String>,
) -> Vec<BotTrendRow> {
    let cost_by_slug: HashMap<&str, &BotCostRollup> =
        costs.iter().map(|c| (c.slug_id.as_str(), c)).collect();

    let mut slugs: HashSet<&str> = cost_by_slug.keys().copied().collect();
    slugs.extend(proportional_revenue.keys().map(String::as_str));

    let mut rows: Vec<BotTrendRow> = slugs
        .into_iter()
        .map(|slug| {
            let cost = cost_by_slug.get(slug);
            BotTrendRow {
                date,
                slug_id: slug.to_string(),
                bot_name: cost.map(|c| c.bot_name.clone()).unwrap_or_else(|| {
                    bot_names
                        .get(slug)
                        .cloned()
                        .unwrap_or_else(|| "Unknown".to_string())
                }),
                proportional_revenue: proportional_revenue.get(slug).copied().unwrap_or(0.0),
                task_count: cost.map_or(0, |c| c.task_count),
                paid_task_count: cost.map_or(0, |c| c.paid_task_count),
                free_task_count: cost.map_or(0, |c| c.free_task_count),
                paid_cost: cost.map_or(0.0, |c| c.paid_cost),
                free_cost: cost.map_or(0.0, |c| c.free_cost),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.slug_id.cmp(&b.slug_id));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::BotRevenue;
    use chrono::Utc;
    use margin_core::types::TaskStatus;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn event(user_id: u64, slug: &str, membership: Membership, energy: i64) -> UsageEvent {
        UsageEvent {
            id: Uuid::new_v4(),
            user_id,
            bot_id: 1,
            slug_id: slug.into(),
            energy_cost: energy,
            membership,
            status: TaskStatus::Done,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_margin_sentinels() {
        assert_eq!(gross_margin_pct(0.0, 0.0), 0.0);
        assert_eq!(gross_margin_pct(0.0, 50.0), -100.0);
        assert_eq!(gross_margin_pct(200.0, 50.0), 75.0);
        assert!(gross_margin_pct(0.0, 50.0).is_finite());
    }

    #[test]
    fn test_rollup_drops_zero_cost_bots() {
        let events = vec![
            event(1, "bot-a", Membership::Paid, 100),
            event(2, "bot-b", Membership::Free, 0),
        ];
        let rollups = rollup_bot_costs(&events, &HashMap::new(), 0.01);
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].slug_id, "bot-a");
    }

    #[test]
    fn test_rollup_splits_by_membership() {
        let events = vec![
            event(1, "bot-a", Membership::Paid, 300),
            event(2, "bot-a", Membership::Free, 200),
            event(3, "bot-a", Membership::Free, 100),
        ];
        let rollups = rollup_bot_costs(&events, &HashMap::new(), 0.01);
        let r = &rollups[0];
        assert_eq!(r.paid_cost, 3.0);
        assert_eq!(r.free_cost, 3.0);
        assert_eq!(r.paid_task_count, 1);
        assert_eq!(r.free_task_count, 2);
        assert_eq!(r.free_user_ids.len(), 2);
        assert_eq!(r.total_cost, 6.0);
    }

    #[test]
    fn test_merge_covers_union_of_revenue_and_cost() {
        let mut attribution = AttributionOutcome::default();
        attribution.per_bot.insert(
            "revenue-only".into(),
            BotRevenue { revenue: 40.0, order_count: 2 },
        );
        attribution.attributed_revenue = 40.0;
        attribution.total_order_revenue = 40.0;

        let costs = rollup_bot_costs(
            &[event(1, "cost-only", Membership::Free, 500)],
            &HashMap::new(),
            0.01,
        );
        let rows = merge_bot_day(date(), &attribution, &costs, &HashMap::new());
        assert_eq!(rows.len(), 2);

        let revenue_only = rows.iter().find(|r| r.slug_id == "revenue-only").unwrap();
        assert_eq!(revenue_only.avg_order_amount, Some(20.0));
        assert_eq!(revenue_only.total_cost, 0.0);
        assert_eq!(revenue_only.gross_profit, 40.0);
        assert_eq!(revenue_only.gross_margin_pct, 100.0);

        let cost_only = rows.iter().find(|r| r.slug_id == "cost-only").unwrap();
        assert_eq!(cost_only.avg_order_amount, None);
        assert_eq!(cost_only.gross_margin_pct, MARGIN_LOSS_SENTINEL);
        assert_eq!(cost_only.gross_profit, -5.0);
        assert_eq!(cost_only.bot_name, "Unknown");
    }

    #[test]
    fn test_free_cost_ranking_shares_and_caps() {
        let events = vec![
            event(1, "bot-a", Membership::Free, 300),
            event(2, "bot-b", Membership::Free, 100),
            event(3, "bot-c", Membership::Paid, 900),
        ];
        let costs = rollup_bot_costs(&events, &HashMap::new(), 0.01);
        let ranked = rank_free_cost_by_bot(date(), &costs, 4.0, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].slug_id, "bot-a");
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].share_of_free_pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_subsystem_breakdown_percentages() {
        let classified = ClassifiedEvents {
            specialized: Vec::new(),
            main: vec![
                event(1, "bot-a", Membership::Free, 300),
                event(2, "bot-a", Membership::Free, 200),
            ],
        };
        let creators: HashSet<u64> = [1].into();
        let breakdown = build_subsystem_breakdown(date(), 500, &classified, &creators, 0.01);
        assert_eq!(breakdown.specialized_cost, 5.0);
        assert_eq!(breakdown.main_creator_cost, 3.0);
        assert_eq!(breakdown.main_non_creator_cost, 2.0);
        assert_eq!(breakdown.total_cost, 10.0);
        assert!((breakdown.specialized_cost_pct - 50.0).abs() < 1e-9);
        assert!((breakdown.creator_share_of_main_pct - 60.0).abs() < 1e-9);
    }
}
