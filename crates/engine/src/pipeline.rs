//! Daily computation pipeline: fetch one business day's rows, run the pure
//! compute stages, and atomically replace that day's snapshot set.

use crate::attribution::{allocate_proportional, AttributionResolver};
use crate::categorizer::CostCategorizer;
use crate::classifier::RecordClassifier;
use crate::margin::{
    build_daily_summary, build_subsystem_breakdown, build_trend_rows, merge_bot_day,
    rank_free_cost_by_bot, rollup_bot_costs,
};
use crate::orders::OrderNormalizer;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use margin_core::config::EngineConfig;
use margin_core::types::{DailySnapshotSet, TaskStatus};
use margin_core::{MarginError, MarginResult};
use margin_store::snapshots::SnapshotStore;
use margin_store::source::DataSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// UTC bounds of one business day at the configured offset. The end bound
/// is inclusive, one millisecond before the next day starts.
pub fn day_bounds(date: NaiveDate, utc_offset_hours: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let start = local_midnight.and_utc() - Duration::hours(utc_offset_hours as i64);
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Outcome of a multi-day recompute. One day failing does not abort the
/// rest; failures are collected and reported alongside the successes.
#[derive(Debug, Default)]
pub struct RangeOutcome {
    pub computed: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

pub struct MarginPipeline {
    source: Arc<dyn DataSource>,
    store: Arc<dyn SnapshotStore>,
    cfg: EngineConfig,
}

impl MarginPipeline {
    pub fn new(
        source: Arc<dyn DataSource>,
        store: Arc<dyn SnapshotStore>,
        cfg: EngineConfig,
    ) -> Self {
        Self { source, store, cfg }
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Compute and persist one business day. Reruns are idempotent: the
    /// whole day is rebuilt from source rows and swapped in as a unit.
    #[instrument(skip_all, fields(%date))]
    pub async fn compute_for_date(&self, date: NaiveDate) -> MarginResult<DailySnapshotSet> {
        let (start, end) = day_bounds(date, self.cfg.utc_offset_hours);
        let window = Duration::days(self.cfg.attribution_window_days);

        // Attribution candidates span the window on both sides of the day;
        // everything else is fetched for the day itself.
        let (day_events, reference, card, wallet, app_store, window_events, profiles) =
            tokio::try_join!(
                self.source
                    .usage_events(start, end, &[TaskStatus::Done, TaskStatus::Cancel]),
                self.source.reference_events(start, end),
                self.source.card_orders(start, end),
                self.source.wallet_orders(start, end),
                self.source.app_store_orders(start, end),
                self.source
                    .usage_events(start - window, end + window, &[TaskStatus::Done]),
                self.source.bot_profiles(),
            )?;

        let user_ids: Vec<u64> = day_events
            .iter()
            .map(|e| e.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let identities = self.source.identity_bundle(&user_ids).await?;

        let bot_names: HashMap<String, String> = profiles
            .into_iter()
            .map(|p| (p.slug_id, p.name))
            .collect();
        let creators: HashSet<u64> = identities
            .ledger
            .values()
            .filter(|l| l.is_creator)
            .map(|l| l.user_id)
            .collect();
        let specialized_energy: i64 = reference.iter().map(|r| r.energy_cost).sum();

        let orders = OrderNormalizer::normalize(&card, &wallet, &app_store);
        let attribution =
            AttributionResolver::new(self.cfg.attribution_window_days)
                .attribute(&orders, &window_events);
        let proportional = allocate_proportional(&orders, &day_events);

        let costs = rollup_bot_costs(&day_events, &bot_names, self.cfg.energy_to_usd);
        let cost_report =
            CostCategorizer::new(self.cfg.energy_to_usd).categorize(&day_events, &identities);
        let classified = RecordClassifier::new(self.cfg.match_tolerance_secs)
            .classify(day_events, &reference);

        let summary = build_daily_summary(date, &cost_report, &orders, &attribution);
        let set = DailySnapshotSet {
            bots: merge_bot_day(date, &attribution, &costs, &bot_names),
            breakdown: build_subsystem_breakdown(
                date,
                specialized_energy,
                &classified,
                &creators,
                self.cfg.energy_to_usd,
            ),
            free_cost_by_bot: rank_free_cost_by_bot(
                date,
                &costs,
                cost_report.free_cost,
                self.cfg.free_cost_ranking_size,
            ),
            trend: build_trend_rows(date, &proportional, &costs, &bot_names),
            summary,
        };

        self.store.replace_day(date, set.clone()).await?;
        metrics::counter!("engine.days_computed").increment(1);
        info!(
            total_revenue = set.summary.total_revenue,
            total_cost = set.summary.total_cost,
            coverage_pct = set.summary.attribution_coverage_pct,
            bots = set.bots.len(),
            "Day computed"
        );
        Ok(set)
    }

    /// Compute every date in `[start, end]` in order. A failed day is
    /// logged and skipped so a backfill survives transient source errors.
    pub async fn compute_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MarginResult<RangeOutcome> {
        if start > end {
            return Err(MarginError::Compute(format!(
                "invalid range: {start} is after {end}"
            )));
        }

        let mut outcome = RangeOutcome::default();
        let mut date = start;
        while date <= end {
            match self.compute_for_date(date).await {
                Ok(_) => outcome.computed.push(date),
                Err(e) => {
                    metrics::counter!("engine.day_failures").increment(1);
                    error!(%date, error = %e, "Day computation failed, continuing range");
                    outcome.failed.push((date, e.to_string()));
                }
            }
            date = date.succ_opt().ok_or_else(|| {
                MarginError::Compute(format!("date overflow past {date}"))
            })?;
        }

        if !outcome.failed.is_empty() {
            warn!(
                computed = outcome.computed.len(),
                failed = outcome.failed.len(),
                "Range recompute finished with failures"
            );
        }
        Ok(outcome)
    }
}
