//! Daily brief: the day's summary with DoD/WoW changes plus ranking views
//! over the per-bot aggregates. Built entirely from stored snapshots.

use chrono::{Duration, NaiveDate};
use margin_core::config::EngineConfig;
use margin_core::types::{BotDailyAggregate, DailySnapshotSet, SubsystemBreakdown};
use margin_core::{MarginError, MarginResult};
use margin_engine::trend::{Change, MetricChange};
use margin_store::snapshots::SnapshotStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Whole-day metrics with their day-over-day and week-over-week changes.
/// Percentage-valued metrics use point changes, never a percent-of-percent.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryTrends {
    pub total_revenue: MetricChange,
    pub total_cost: MetricChange,
    pub free_cost: MetricChange,
    pub gross_profit: MetricChange,
    pub gross_margin_pct: MetricChange,
    pub free_cost_share_pct: MetricChange,
    pub attribution_coverage_pct: MetricChange,
}

/// One bot in a ranking view.
#[derive(Debug, Clone, Serialize)]
pub struct RankedBot {
    pub slug_id: String,
    pub bot_name: String,
    pub attributed_revenue: f64,
    pub revenue_dod: Change,
    pub revenue_wow: Change,
    pub total_cost: f64,
    pub free_cost: f64,
    pub free_cost_share_pct: f64,
    pub gross_profit: f64,
    pub gross_margin_pct: f64,
}

/// One bot in the no-revenue view: cost but not a single attributed order.
#[derive(Debug, Clone, Serialize)]
pub struct NoRevenueBot {
    pub slug_id: String,
    pub bot_name: String,
    pub total_cost: f64,
    pub free_cost: f64,
    pub share_of_total_cost_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub attributed_revenue: f64,
}

/// Seven days of attributed revenue for one ranked bot.
#[derive(Debug, Clone, Serialize)]
pub struct BotRevenueTrend {
    pub slug_id: String,
    pub bot_name: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyBrief {
    pub date: NaiveDate,
    pub summary: SummaryTrends,
    pub breakdown: SubsystemBreakdown,
    pub top_profitable: Vec<RankedBot>,
    pub top_losing: Vec<RankedBot>,
    pub losing: Vec<RankedBot>,
    pub heavy_free_use: Vec<RankedBot>,
    pub high_margin: Vec<RankedBot>,
    pub low_margin: Vec<RankedBot>,
    pub no_revenue: Vec<NoRevenueBot>,
    pub revenue_trend: Vec<BotRevenueTrend>,
}

const TOP_PROFITABLE_CAP: usize = 10;
const TOP_LOSING_CAP: usize = 10;
const MARGIN_EXTREME_CAP: usize = 5;
const NO_REVENUE_CAP: usize = 30;

pub struct DailyBriefBuilder {
    store: Arc<dyn SnapshotStore>,
    cfg: EngineConfig,
}

impl DailyBriefBuilder {
    pub fn new(store: Arc<dyn SnapshotStore>, cfg: EngineConfig) -> Self {
        Self { store, cfg }
    }

    /// Assemble the brief for `date`. The date itself must be computed;
    /// missing baseline days degrade to `Change::Missing`, not errors.
    pub async fn build(&self, date: NaiveDate) -> MarginResult<DailyBrief> {
        let today = self.store.read_day(date).await?.ok_or_else(|| {
            MarginError::Report(format!("no snapshot for {date}; compute it first"))
        })?;
        let yesterday = self.store.read_day(date - Duration::days(1)).await?;
        let week_ago = self.store.read_day(date - Duration::days(7)).await?;
        let last7 = self
            .store
            .read_range(date - Duration::days(6), date)
            .await?;

        let summary = summary_trends(&today, yesterday.as_ref(), week_ago.as_ref());

        // Every ranking sees only bots above the minimum-cost threshold,
        // the no-revenue view included.
        let ranked: Vec<&BotDailyAggregate> = today
            .bots
            .iter()
            .filter(|b| b.total_cost >= self.cfg.min_ranked_cost_usd)
            .collect();

        let make = |b: &BotDailyAggregate| {
            ranked_bot(b, yesterday.as_ref(), week_ago.as_ref())
        };

        let mut by_profit: Vec<&BotDailyAggregate> = ranked.clone();
        by_profit.sort_by(|a, b| b.gross_profit.total_cmp(&a.gross_profit));
        let top_profitable: Vec<RankedBot> = by_profit
            .iter()
            .filter(|b| b.gross_profit > 0.0)
            .take(TOP_PROFITABLE_CAP)
            .map(|b| make(b))
            .collect();
        let top_losing: Vec<RankedBot> = by_profit
            .iter()
            .rev()
            .filter(|b| b.gross_profit < 0.0)
            .take(TOP_LOSING_CAP)
            .map(|b| make(b))
            .collect();

        let mut losing: Vec<RankedBot> = ranked
            .iter()
            .filter(|b| b.gross_margin_pct < 0.0)
            .map(|b| make(b))
            .collect();
        losing.sort_by(|a, b| a.gross_margin_pct.total_cmp(&b.gross_margin_pct));

        let mut heavy_free_use: Vec<RankedBot> = ranked
            .iter()
            .filter(|b| {
                b.total_cost > 0.0
                    && b.free_cost / b.total_cost * 100.0 > self.cfg.heavy_free_share_pct
            })
            .map(|b| make(b))
            .collect();
        heavy_free_use.sort_by(|a, b| b.free_cost.total_cmp(&a.free_cost));

        let mut by_margin: Vec<&BotDailyAggregate> = ranked.clone();
        by_margin.sort_by(|a, b| b.gross_margin_pct.total_cmp(&a.gross_margin_pct));
        // Only genuinely positive margins qualify as "high"; with few
        // profitable bots the view shrinks rather than padding with losers.
        let high_margin: Vec<RankedBot> = by_margin
            .iter()
            .filter(|b| b.gross_margin_pct > 0.0)
            .take(MARGIN_EXTREME_CAP)
            .map(|b| make(b))
            .collect();
        let low_margin: Vec<RankedBot> =
            by_margin.iter().rev().take(MARGIN_EXTREME_CAP).map(|b| make(b)).collect();

        let day_total_cost = today.summary.total_cost;
        let mut no_revenue: Vec<NoRevenueBot> = ranked
            .iter()
            .filter(|b| b.attributed_revenue == 0.0 && b.total_cost > 0.0)
            .map(|b| NoRevenueBot {
                slug_id: b.slug_id.clone(),
                bot_name: b.bot_name.clone(),
                total_cost: b.total_cost,
                free_cost: b.free_cost,
                share_of_total_cost_pct: if day_total_cost > 0.0 {
                    b.total_cost / day_total_cost * 100.0
                } else {
                    0.0
                },
            })
            .collect();
        no_revenue.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
        no_revenue.truncate(NO_REVENUE_CAP);

        let revenue_trend =
            revenue_trends(&top_profitable, &top_losing, &last7);

        info!(
            %date,
            ranked = ranked.len(),
            losing = losing.len(),
            no_revenue = no_revenue.len(),
            "Daily brief built"
        );
        Ok(DailyBrief {
            date,
            summary,
            breakdown: today.breakdown.clone(),
            top_profitable,
            top_losing,
            losing,
            heavy_free_use,
            high_margin,
            low_margin,
            no_revenue,
            revenue_trend,
        })
    }
}

fn summary_trends(
    today: &DailySnapshotSet,
    yesterday: Option<&DailySnapshotSet>,
    week_ago: Option<&DailySnapshotSet>,
) -> SummaryTrends {
    let t = &today.summary;
    let d = yesterday.map(|s| &s.summary);
    let w = week_ago.map(|s| &s.summary);

    SummaryTrends {
        total_revenue: MetricChange::percent(
            t.total_revenue,
            d.map(|s| s.total_revenue),
            w.map(|s| s.total_revenue),
        ),
        total_cost: MetricChange::percent(
            t.total_cost,
            d.map(|s| s.total_cost),
            w.map(|s| s.total_cost),
        ),
        free_cost: MetricChange::percent(
            t.free_cost,
            d.map(|s| s.free_cost),
            w.map(|s| s.free_cost),
        ),
        gross_profit: MetricChange::percent(
            t.gross_profit,
            d.map(|s| s.gross_profit),
            w.map(|s| s.gross_profit),
        ),
        gross_margin_pct: MetricChange::point(
            t.gross_margin_pct,
            d.map(|s| s.gross_margin_pct),
            w.map(|s| s.gross_margin_pct),
        ),
        free_cost_share_pct: MetricChange::point(
            t.free_cost_share_pct,
            d.map(|s| s.free_cost_share_pct),
            w.map(|s| s.free_cost_share_pct),
        ),
        attribution_coverage_pct: MetricChange::point(
            t.attribution_coverage_pct,
            d.map(|s| s.attribution_coverage_pct),
            w.map(|s| s.attribution_coverage_pct),
        ),
    }
}

fn bot_revenue(day: Option<&DailySnapshotSet>, slug: &str) -> Option<f64> {
    day.and_then(|s| s.bots.iter().find(|b| b.slug_id == slug))
        .map(|b| b.attributed_revenue)
}

fn ranked_bot(
    b: &BotDailyAggregate,
    yesterday: Option<&DailySnapshotSet>,
    week_ago: Option<&DailySnapshotSet>,
) -> RankedBot {
    RankedBot {
        slug_id: b.slug_id.clone(),
        bot_name: b.bot_name.clone(),
        attributed_revenue: b.attributed_revenue,
        revenue_dod: Change::percent(b.attributed_revenue, bot_revenue(yesterday, &b.slug_id)),
        revenue_wow: Change::percent(b.attributed_revenue, bot_revenue(week_ago, &b.slug_id)),
        total_cost: b.total_cost,
        free_cost: b.free_cost,
        free_cost_share_pct: if b.total_cost > 0.0 {
            b.free_cost / b.total_cost * 100.0
        } else {
            0.0
        },
        gross_profit: b.gross_profit,
        gross_margin_pct: b.gross_margin_pct,
    }
}

/// Seven-day attributed-revenue series for every bot present in the
/// profit rankings. Days without a row for the bot read as zero.
fn revenue_trends(
    top_profitable: &[RankedBot],
    top_losing: &[RankedBot],
    last7: &[DailySnapshotSet],
) -> Vec<BotRevenueTrend> {
    let mut slugs: Vec<(&str, &str)> = Vec::new();
    for bot in top_profitable.iter().chain(top_losing) {
        if !slugs.iter().any(|(s, _)| *s == bot.slug_id) {
            slugs.push((&bot.slug_id, &bot.bot_name));
        }
    }

    let daily: Vec<(NaiveDate, HashMap<&str, f64>)> = last7
        .iter()
        .map(|day| {
            let revenue = day
                .bots
                .iter()
                .map(|b| (b.slug_id.as_str(), b.attributed_revenue))
                .collect();
            (day.summary.date, revenue)
        })
        .collect();

    slugs
        .into_iter()
        .map(|(slug, name)| BotRevenueTrend {
            slug_id: slug.to_string(),
            bot_name: name.to_string(),
            points: daily
                .iter()
                .map(|(date, revenue)| TrendPoint {
                    date: *date,
                    attributed_revenue: revenue.get(slug).copied().unwrap_or(0.0),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bot_row, empty_day};
    use margin_store::snapshots::MemorySnapshotStore;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    async fn store_with_days(days: Vec<DailySnapshotSet>) -> Arc<MemorySnapshotStore> {
        let store = Arc::new(MemorySnapshotStore::new());
        for day in days {
            store.replace_day(day.summary.date, day).await.unwrap();
        }
        store
    }

    fn builder(store: Arc<MemorySnapshotStore>) -> DailyBriefBuilder {
        DailyBriefBuilder::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_missing_day_is_an_error() {
        let store = store_with_days(vec![]).await;
        assert!(builder(store).build(date()).await.is_err());
    }

    #[tokio::test]
    async fn test_min_cost_filter_applies_to_every_ranking() {
        let mut day = empty_day(date());
        // Above threshold, losing.
        day.bots.push(bot_row(date(), "big-loser", 0.0, 50.0, 45.0));
        // Below threshold: filtered everywhere despite losing more in margin.
        day.bots.push(bot_row(date(), "tiny", 0.0, 5.0, 5.0));
        day.summary.total_cost = 55.0;

        let brief = builder(store_with_days(vec![day]).await)
            .build(date())
            .await
            .unwrap();

        assert_eq!(brief.losing.len(), 1);
        assert_eq!(brief.losing[0].slug_id, "big-loser");
        assert_eq!(brief.no_revenue.len(), 1);
        assert_eq!(brief.no_revenue[0].slug_id, "big-loser");
        assert!(brief.heavy_free_use.iter().all(|b| b.slug_id != "tiny"));
        assert!(brief.high_margin.iter().all(|b| b.slug_id != "tiny"));
    }

    #[tokio::test]
    async fn test_heavy_free_use_threshold() {
        let mut day = empty_day(date());
        day.bots.push(bot_row(date(), "mostly-free", 10.0, 100.0, 90.0));
        day.bots.push(bot_row(date(), "mostly-paid", 10.0, 100.0, 50.0));

        let brief = builder(store_with_days(vec![day]).await)
            .build(date())
            .await
            .unwrap();
        assert_eq!(brief.heavy_free_use.len(), 1);
        assert_eq!(brief.heavy_free_use[0].slug_id, "mostly-free");
    }

    #[tokio::test]
    async fn test_high_margin_excludes_losing_bots() {
        let mut day = empty_day(date());
        day.bots.push(bot_row(date(), "winner", 100.0, 40.0, 0.0));
        day.bots.push(bot_row(date(), "loser-a", 10.0, 50.0, 0.0));
        day.bots.push(bot_row(date(), "loser-b", 0.0, 30.0, 0.0));

        let brief = builder(store_with_days(vec![day]).await)
            .build(date())
            .await
            .unwrap();

        // Fewer than five profitable bots: the view shrinks, never fills
        // up with negative margins.
        assert_eq!(brief.high_margin.len(), 1);
        assert_eq!(brief.high_margin[0].slug_id, "winner");
        assert_eq!(brief.low_margin.len(), 3);
    }

    #[tokio::test]
    async fn test_dod_change_against_stored_baseline() {
        let mut today = empty_day(date());
        today.summary.total_revenue = 150.0;
        today.bots.push(bot_row(date(), "bot-a", 150.0, 20.0, 0.0));

        let yesterday_date = date() - Duration::days(1);
        let mut yesterday = empty_day(yesterday_date);
        yesterday.summary.total_revenue = 100.0;
        yesterday.bots.push(bot_row(yesterday_date, "bot-a", 100.0, 20.0, 0.0));

        let brief = builder(store_with_days(vec![today, yesterday]).await)
            .build(date())
            .await
            .unwrap();

        assert_eq!(brief.summary.total_revenue.dod, Change::Value(50.0));
        // No week-ago snapshot stored.
        assert_eq!(brief.summary.total_revenue.wow, Change::Missing);
        assert_eq!(brief.top_profitable[0].revenue_dod, Change::Value(50.0));
        assert_eq!(brief.top_profitable[0].revenue_wow, Change::Missing);
    }

    #[tokio::test]
    async fn test_no_revenue_share_and_trend_series() {
        let mut today = empty_day(date());
        today.summary.total_cost = 100.0;
        today.bots.push(bot_row(date(), "earner", 60.0, 25.0, 0.0));
        today.bots.push(bot_row(date(), "sink", 0.0, 75.0, 0.0));

        let prev_date = date() - Duration::days(1);
        let mut prev = empty_day(prev_date);
        prev.bots.push(bot_row(prev_date, "earner", 30.0, 25.0, 0.0));

        let brief = builder(store_with_days(vec![today, prev]).await)
            .build(date())
            .await
            .unwrap();

        assert_eq!(brief.no_revenue.len(), 1);
        assert!((brief.no_revenue[0].share_of_total_cost_pct - 75.0).abs() < 1e-9);

        // The earner is ranked, so it gets a trend series over both days.
        let trend = brief
            .revenue_trend
            .iter()
            .find(|t| t.slug_id == "earner")
            .unwrap();
        assert_eq!(trend.points.len(), 2);
        assert_eq!(trend.points[0].attributed_revenue, 30.0);
        assert_eq!(trend.points[1].attributed_revenue, 60.0);
    }
}
