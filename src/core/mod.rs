// core/mod.rs
pub mod job_service;
pub mod notification_service;
pub mod run_lifecycle;
pub mod size_estimates;

// Ré-exports pour faciliter l'import
pub use job_service::{JobService, PresetParser, TaskRunner};
pub use notification_service::ExpirationNotifier;
pub use run_lifecycle::{RunLifecycleScheduler, SweepReport};
pub use size_estimates::{AggregationReport, FeatureCounter, SizeEstimateAggregator};
