//! Period-over-period change calculus. Results are a tagged type rather
//! than raw floats so "no baseline" and "unbounded growth" survive
//! summation and serialization as distinguishable states.

use serde::{Deserialize, Serialize};

/// A DoD/WoW delta. `Missing` means the baseline date has no data (renders
/// "N/A"); `Infinite` means growth from a zero baseline (renders "+∞%").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Change {
    Missing,
    Infinite,
    Value(f64),
}

impl Change {
    /// Percentage change against a baseline. The denominator is the
    /// baseline's absolute value so a move from a negative baseline toward
    /// zero reads as an improvement, keeping "higher is better" intact for
    /// metrics that can go negative.
    pub fn percent(current: f64, previous: Option<f64>) -> Self {
        let Some(previous) = previous else {
            return Change::Missing;
        };
        if previous == 0.0 {
            return if current == 0.0 {
                Change::Value(0.0)
            } else {
                Change::Infinite
            };
        }
        Change::Value((current - previous) / previous.abs() * 100.0)
    }

    /// Percentage-point change, for metrics that are already percentages.
    /// Never divides.
    pub fn point(current: f64, previous: Option<f64>) -> Self {
        match previous {
            None => Change::Missing,
            Some(previous) => Change::Value(current - previous),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Change::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Change::Missing)
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Missing => write!(f, "N/A"),
            Change::Infinite => write!(f, "+∞%"),
            Change::Value(v) => write!(f, "{:+.1}%", v),
        }
    }
}

/// A metric value bundled with its day-over-day and week-over-week change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricChange {
    pub value: f64,
    pub dod: Change,
    pub wow: Change,
}

impl MetricChange {
    pub fn percent(current: f64, day_before: Option<f64>, week_before: Option<f64>) -> Self {
        Self {
            value: current,
            dod: Change::percent(current, day_before),
            wow: Change::percent(current, week_before),
        }
    }

    pub fn point(current: f64, day_before: Option<f64>, week_before: Option<f64>) -> Self {
        Self {
            value: current,
            dod: Change::point(current, day_before),
            wow: Change::point(current, week_before),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_boundary_table() {
        assert_eq!(Change::percent(100.0, Some(0.0)), Change::Infinite);
        assert_eq!(Change::percent(0.0, Some(0.0)), Change::Value(0.0));
        assert_eq!(Change::percent(50.0, None), Change::Missing);
        // Absolute-value denominator: -100 -> -50 is a +50% improvement.
        assert_eq!(Change::percent(-50.0, Some(-100.0)), Change::Value(50.0));
        assert_eq!(Change::percent(150.0, Some(100.0)), Change::Value(50.0));
        assert_eq!(Change::percent(50.0, Some(100.0)), Change::Value(-50.0));
    }

    #[test]
    fn test_point_change_never_divides() {
        assert_eq!(Change::point(12.5, Some(10.0)), Change::Value(2.5));
        assert_eq!(Change::point(12.5, Some(0.0)), Change::Value(12.5));
        assert_eq!(Change::point(12.5, None), Change::Missing);
    }

    #[test]
    fn test_rendering_distinguishes_missing_from_infinite() {
        assert_eq!(Change::Missing.to_string(), "N/A");
        assert_eq!(Change::Infinite.to_string(), "+∞%");
        assert_eq!(Change::Value(3.25).to_string(), "+3.2%");
        assert_eq!(Change::Value(-7.5).to_string(), "-7.5%");
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_string(&Change::Infinite).unwrap();
        assert_eq!(json, r#"{"kind":"infinite"}"#);
        let json = serde_json::to_string(&Change::Value(5.0)).unwrap();
        assert_eq!(json, r#"{"kind":"value","value":5.0}"#);
        let back: Change = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Change::Value(5.0));
    }
}
