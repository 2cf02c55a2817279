//! Snapshot constructors shared by the report builders' tests.

use chrono::NaiveDate;
use margin_core::types::{
    BotDailyAggregate, DailySnapshotSet, DailySummary, SubsystemBreakdown,
};
use margin_engine::margin::gross_margin_pct;

pub(crate) fn empty_day(date: NaiveDate) -> DailySnapshotSet {
    DailySnapshotSet {
        summary: DailySummary {
            date,
            paid_cost: 0.0,
            free_cost_regular_email: 0.0,
            free_cost_temp_email: 0.0,
            free_cost_aliased_email: 0.0,
            free_cost_deleted: 0.0,
            free_cost_visitor: 0.0,
            free_cost: 0.0,
            total_cost: 0.0,
            free_cost_share_pct: 0.0,
            card_revenue: 0.0,
            wallet_revenue: 0.0,
            app_store_revenue: 0.0,
            total_revenue: 0.0,
            gross_profit: 0.0,
            gross_margin_pct: 0.0,
            total_order_revenue: 0.0,
            attributed_revenue: 0.0,
            unattributed_revenue: 0.0,
            attribution_coverage_pct: 0.0,
        },
        bots: Vec::new(),
        breakdown: SubsystemBreakdown {
            date,
            specialized_cost: 0.0,
            specialized_cost_pct: 0.0,
            main_creator_cost: 0.0,
            main_creator_cost_pct: 0.0,
            main_non_creator_cost: 0.0,
            main_non_creator_cost_pct: 0.0,
            main_cost_pct: 0.0,
            creator_share_of_main_pct: 0.0,
            total_cost: 0.0,
        },
        free_cost_by_bot: Vec::new(),
        trend: Vec::new(),
    }
}

pub(crate) fn bot_row(
    date: NaiveDate,
    slug: &str,
    revenue: f64,
    total_cost: f64,
    free_cost: f64,
) -> BotDailyAggregate {
    BotDailyAggregate {
        date,
        slug_id: slug.to_string(),
        bot_name: slug.to_string(),
        attributed_revenue: revenue,
        attributed_order_count: if revenue > 0.0 { 1 } else { 0 },
        avg_order_amount: (revenue > 0.0).then_some(revenue),
        paid_cost: total_cost - free_cost,
        paid_task_count: 1,
        free_cost,
        free_task_count: 0,
        total_cost,
        task_count: 1,
        gross_profit: revenue - total_cost,
        gross_margin_pct: gross_margin_pct(revenue, total_cost),
    }
}
