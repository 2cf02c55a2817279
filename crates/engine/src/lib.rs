//! Margin computation engine: subsystem classification, cost
//! categorization, order normalization, revenue attribution, and the daily
//! pipeline that ties them together.

pub mod attribution;
pub mod categorizer;
pub mod classifier;
pub mod margin;
pub mod orders;
pub mod pipeline;
pub mod trend;

pub use attribution::{AttributionOutcome, AttributionResolver};
pub use categorizer::{CostCategorizer, CostReport};
pub use classifier::{ClassifiedEvents, RecordClassifier};
pub use orders::OrderNormalizer;
pub use pipeline::{day_bounds, MarginPipeline, RangeOutcome};
pub use trend::{Change, MetricChange};
