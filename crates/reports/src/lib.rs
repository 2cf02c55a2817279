//! Report builders over stored daily snapshots: the daily brief and the
//! Monday-to-Sunday weekly report.

pub mod daily;
pub mod weekly;

#[cfg(test)]
mod testutil;

pub use daily::{DailyBrief, DailyBriefBuilder};
pub use weekly::{week_range, WeeklyReport, WeeklyReportBuilder};
