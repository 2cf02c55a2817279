//! Weekly report: Monday-to-Sunday per-bot aggregates for the week holding
//! the requested date, compared against the previous week. Continuity views
//! only consider bots that cleared the minimum cost bar in both weeks.

use chrono::{Datelike, Duration, NaiveDate};
use margin_core::config::EngineConfig;
use margin_core::types::DailySnapshotSet;
use margin_core::MarginResult;
use margin_engine::margin::gross_margin_pct;
use margin_engine::trend::Change;
use margin_store::snapshots::SnapshotStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const CONTINUOUS_CAP: usize = 20;
const TURNED_CAP: usize = 10;

/// `[Monday, Sunday]` of the week containing `date`.
pub fn week_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

/// One bot's totals over a single week.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeekAggregate {
    pub attributed_revenue: f64,
    pub total_cost: f64,
    pub free_cost: f64,
    pub free_cost_share_pct: f64,
    pub task_count: u64,
    pub gross_profit: f64,
    pub gross_margin_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyBotRow {
    pub slug_id: String,
    pub bot_name: String,
    pub current: WeekAggregate,
    pub previous: WeekAggregate,
    pub revenue_wow: Change,
    pub margin_change_pts: Change,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub previous_week_start: NaiveDate,
    /// Days of the current week actually present in the store.
    pub days_covered: usize,
    pub continuously_losing: Vec<WeeklyBotRow>,
    pub continuously_profitable: Vec<WeeklyBotRow>,
    pub heavy_free_use: Vec<WeeklyBotRow>,
    pub turned_losing: Vec<WeeklyBotRow>,
    pub turned_profitable: Vec<WeeklyBotRow>,
}

pub struct WeeklyReportBuilder {
    store: Arc<dyn SnapshotStore>,
    cfg: EngineConfig,
}

impl WeeklyReportBuilder {
    pub fn new(store: Arc<dyn SnapshotStore>, cfg: EngineConfig) -> Self {
        Self { store, cfg }
    }

    pub async fn build(&self, date: NaiveDate) -> MarginResult<WeeklyReport> {
        let (week_start, week_end) = week_range(date);
        let prev_start = week_start - Duration::days(7);
        let prev_end = week_start - Duration::days(1);

        let current_days = self.store.read_range(week_start, week_end).await?;
        let previous_days = self.store.read_range(prev_start, prev_end).await?;

        let current = aggregate_week(&current_days);
        let previous = aggregate_week(&previous_days);

        // Qualification: a bot must clear the cost bar in both weeks, so
        // newly launched and just-retired bots never show as "turned".
        let qualified: Vec<&str> = current
            .iter()
            .filter(|(slug, agg)| {
                agg.total_cost >= self.cfg.min_ranked_cost_usd
                    && previous
                        .get(*slug)
                        .is_some_and(|p| p.total_cost >= self.cfg.min_ranked_cost_usd)
            })
            .map(|(slug, _)| slug.as_str())
            .collect();

        let row = |slug: &str| -> WeeklyBotRow {
            let cur = current.get(slug).cloned().unwrap_or_default();
            let prev = previous.get(slug).cloned().unwrap_or_default();
            WeeklyBotRow {
                slug_id: slug.to_string(),
                bot_name: bot_name(&current_days, &previous_days, slug),
                revenue_wow: Change::percent(
                    cur.attributed_revenue,
                    Some(prev.attributed_revenue),
                ),
                margin_change_pts: Change::point(
                    cur.gross_margin_pct,
                    Some(prev.gross_margin_pct),
                ),
                current: cur,
                previous: prev,
            }
        };

        let profit = |week: &HashMap<String, WeekAggregate>, slug: &str| {
            week.get(slug).map_or(0.0, |a| a.gross_profit)
        };

        let mut continuously_losing: Vec<WeeklyBotRow> = qualified
            .iter()
            .filter(|s| profit(&current, s) < 0.0 && profit(&previous, s) < 0.0)
            .map(|s| row(s))
            .collect();
        continuously_losing
            .sort_by(|a, b| a.current.gross_profit.total_cmp(&b.current.gross_profit));
        continuously_losing.truncate(CONTINUOUS_CAP);

        let mut continuously_profitable: Vec<WeeklyBotRow> = qualified
            .iter()
            .filter(|s| profit(&current, s) > 0.0 && profit(&previous, s) > 0.0)
            .map(|s| row(s))
            .collect();
        continuously_profitable
            .sort_by(|a, b| b.current.gross_profit.total_cmp(&a.current.gross_profit));
        continuously_profitable.truncate(CONTINUOUS_CAP);

        let mut heavy_free_use: Vec<WeeklyBotRow> = qualified
            .iter()
            .filter(|s| {
                current
                    .get(**s)
                    .is_some_and(|a| a.free_cost_share_pct > self.cfg.heavy_free_share_pct)
            })
            .map(|s| row(s))
            .collect();
        heavy_free_use.sort_by(|a, b| b.current.free_cost.total_cmp(&a.current.free_cost));
        heavy_free_use.truncate(CONTINUOUS_CAP);

        let mut turned_losing: Vec<WeeklyBotRow> = qualified
            .iter()
            .filter(|s| profit(&current, s) < 0.0 && profit(&previous, s) >= 0.0)
            .map(|s| row(s))
            .collect();
        turned_losing
            .sort_by(|a, b| a.current.gross_profit.total_cmp(&b.current.gross_profit));
        turned_losing.truncate(TURNED_CAP);

        let mut turned_profitable: Vec<WeeklyBotRow> = qualified
            .iter()
            .filter(|s| profit(&current, s) > 0.0 && profit(&previous, s) <= 0.0)
            .map(|s| row(s))
            .collect();
        turned_profitable
            .sort_by(|a, b| b.current.gross_profit.total_cmp(&a.current.gross_profit));
        turned_profitable.truncate(TURNED_CAP);

        info!(
            %week_start,
            days_covered = current_days.len(),
            qualified = qualified.len(),
            "Weekly report built"
        );
        Ok(WeeklyReport {
            week_start,
            week_end,
            previous_week_start: prev_start,
            days_covered: current_days.len(),
            continuously_losing,
            continuously_profitable,
            heavy_free_use,
            turned_losing,
            turned_profitable,
        })
    }
}

fn aggregate_week(days: &[DailySnapshotSet]) -> HashMap<String, WeekAggregate> {
    let mut weeks: HashMap<String, WeekAggregate> = HashMap::new();
    for day in days {
        for bot in &day.bots {
            let agg = weeks.entry(bot.slug_id.clone()).or_default();
            agg.attributed_revenue += bot.attributed_revenue;
            agg.total_cost += bot.total_cost;
            agg.free_cost += bot.free_cost;
            agg.task_count += bot.task_count;
        }
    }
    for agg in weeks.values_mut() {
        agg.gross_profit = agg.attributed_revenue - agg.total_cost;
        agg.gross_margin_pct = gross_margin_pct(agg.attributed_revenue, agg.total_cost);
        agg.free_cost_share_pct = if agg.total_cost > 0.0 {
            agg.free_cost / agg.total_cost * 100.0
        } else {
            0.0
        };
    }
    weeks
}

fn bot_name(current: &[DailySnapshotSet], previous: &[DailySnapshotSet], slug: &str) -> String {
    current
        .iter()
        .chain(previous)
        .flat_map(|d| d.bots.iter())
        .find(|b| b.slug_id == slug)
        .map(|b| b.bot_name.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bot_row, empty_day};
    use chrono::Weekday;
    use margin_store::snapshots::MemorySnapshotStore;

    #[test]
    fn test_week_range_starts_monday() {
        // 2025-06-11 is a Wednesday.
        let (start, end) = week_range(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(end.weekday(), Weekday::Sun);

        // A Monday maps to itself.
        let (start, _) = week_range(NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
    }

    /// Store one day per week carrying the whole week's totals; enough for
    /// the per-bot weekly aggregation.
    async fn seeded_store(
        current: Vec<(&str, f64, f64)>,
        previous: Vec<(&str, f64, f64)>,
    ) -> Arc<MemorySnapshotStore> {
        let store = Arc::new(MemorySnapshotStore::new());
        let cur_date = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let prev_date = cur_date - Duration::days(7);

        for (date, rows) in [(cur_date, current), (prev_date, previous)] {
            let mut day = empty_day(date);
            for (slug, revenue, cost) in rows {
                day.bots.push(bot_row(date, slug, revenue, cost, 0.0));
            }
            store.replace_day(date, day).await.unwrap();
        }
        store
    }

    fn builder(store: Arc<MemorySnapshotStore>) -> WeeklyReportBuilder {
        WeeklyReportBuilder::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_continuity_classification() {
        let store = seeded_store(
            vec![
                ("steady-loser", 5.0, 50.0),
                ("steady-winner", 90.0, 30.0),
                ("flipped-down", 10.0, 40.0),
                ("flipped-up", 80.0, 20.0),
            ],
            vec![
                ("steady-loser", 5.0, 60.0),
                ("steady-winner", 80.0, 30.0),
                ("flipped-down", 50.0, 40.0),
                ("flipped-up", 10.0, 20.0),
            ],
        )
        .await;

        let report = builder(store)
            .build(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
            .await
            .unwrap();

        let slugs = |rows: &[WeeklyBotRow]| -> Vec<String> {
            rows.iter().map(|r| r.slug_id.clone()).collect()
        };
        assert_eq!(slugs(&report.continuously_losing), vec!["steady-loser"]);
        assert_eq!(slugs(&report.continuously_profitable), vec!["steady-winner"]);
        assert_eq!(slugs(&report.turned_losing), vec!["flipped-down"]);
        assert_eq!(slugs(&report.turned_profitable), vec!["flipped-up"]);
    }

    #[tokio::test]
    async fn test_qualification_requires_both_weeks_above_bar() {
        let store = seeded_store(
            // Losing hard this week, but last week's cost was under $10.
            vec![("newcomer", 0.0, 100.0)],
            vec![("newcomer", 0.0, 5.0)],
        )
        .await;

        let report = builder(store)
            .build(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
            .await
            .unwrap();
        assert!(report.continuously_losing.is_empty());
        assert!(report.turned_losing.is_empty());
    }

    #[tokio::test]
    async fn test_wow_changes_on_rows() {
        let store = seeded_store(
            vec![("steady-winner", 90.0, 30.0)],
            vec![("steady-winner", 60.0, 30.0)],
        )
        .await;

        let report = builder(store)
            .build(NaiveDate::from_ymd_opt(2025, 6, 11).unwrap())
            .await
            .unwrap();
        let row = &report.continuously_profitable[0];
        assert_eq!(row.revenue_wow, Change::Value(50.0));
        assert_eq!(row.current.gross_profit, 60.0);
        assert_eq!(row.previous.gross_profit, 30.0);
    }
}
