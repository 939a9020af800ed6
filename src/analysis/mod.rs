//! Statistical stages of the pipeline

pub mod correction;
pub mod engine;
pub mod estimator;
pub mod reliability;
pub mod significance;

pub use correction::bonferroni;
pub use engine::{AnalysisOptions, PrevalenceEngine};
pub use estimator::{estimate, CiMethod, IntervalOptions};
pub use reliability::{filter, ReliabilityRule};
pub use significance::test;
