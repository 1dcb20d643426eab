#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod correlation;
pub mod data;
pub mod evaluate;
pub mod guard;
pub mod partial;
pub mod regression;
pub mod registry;
pub mod types;

pub use evaluate::{Evaluator, MetricSelection, evaluate};
pub use guard::{WarningCategory, WarningRegistry};
pub use partial::{PartialCorrelationOptions, partial_correlation};
pub use registry::{Metric, MetricDirection, get_mode};
pub use types::{CorrelationMethod, EvaluationError, GroupingDimension, ObservationSet, Score};
