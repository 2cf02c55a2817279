//! Subsystem record classifier. The specialized app and the main app log
//! the same physical action independently with slightly different
//! timestamps and no shared key, so the split is an approximate join:
//! same user, same bot, same energy cost, timestamps within a tolerance.

use chrono::{DateTime, Utc};
use margin_core::types::{ReferenceEvent, UsageEvent};
use std::collections::HashMap;
use tracing::debug;

/// Usage events split by originating subsystem.
#[derive(Debug, Default)]
pub struct ClassifiedEvents {
    /// Events matched against the specialized app's reference log.
    pub specialized: Vec<UsageEvent>,
    /// Everything else: main-app usage.
    pub main: Vec<UsageEvent>,
}

pub struct RecordClassifier {
    tolerance_secs: i64,
}

impl RecordClassifier {
    pub fn new(tolerance_secs: i64) -> Self {
        Self { tolerance_secs }
    }

    /// Split `events` into specialized vs main usage. An event is
    /// specialized iff any reference event shares its (user, bot, energy)
    /// key with |Δt| within tolerance — an existence check, not uniqueness.
    ///
    /// Known limitation, preserved deliberately: zero-energy events can
    /// spuriously match any zero-energy reference row for the same
    /// (user, bot) pair within tolerance.
    pub fn classify(
        &self,
        events: Vec<UsageEvent>,
        reference: &[ReferenceEvent],
    ) -> ClassifiedEvents {
        // Per-key timestamp lists, sorted so the tolerance window is a
        // binary-searchable interval instead of a nested scan.
        let mut index: HashMap<(u64, u64, i64), Vec<i64>> = HashMap::new();
        for r in reference {
            index
                .entry((r.user_id, r.bot_id, r.energy_cost))
                .or_default()
                .push(r.updated_at.timestamp());
        }
        for timestamps in index.values_mut() {
            timestamps.sort_unstable();
        }

        let mut out = ClassifiedEvents::default();
        for event in events {
            let key = (event.user_id, event.bot_id, event.energy_cost);
            let matched = index
                .get(&key)
                .is_some_and(|ts| has_match_within(ts, event.created_at, self.tolerance_secs));
            if matched {
                out.specialized.push(event);
            } else {
                out.main.push(event);
            }
        }

        debug!(
            specialized = out.specialized.len(),
            main = out.main.len(),
            "Usage events classified"
        );
        out
    }
}

/// True if `sorted` contains a timestamp within `tolerance_secs` of `at`.
fn has_match_within(sorted: &[i64], at: DateTime<Utc>, tolerance_secs: i64) -> bool {
    let t = at.timestamp();
    let lo = sorted.partition_point(|&ts| ts < t - tolerance_secs);
    sorted.get(lo).is_some_and(|&ts| ts <= t + tolerance_secs)
}
