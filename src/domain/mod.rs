//! # Domain Models Module
//!
//! Modèles métier partagés par l'API, les services et les stores.
//!
//! ## Structure
//! - `geometry.rs`: emprise GeoJSON et surface web mercator
//! - `jobs.rs`: jobs d'export, formats, configurations, tags
//! - `runs.rs`: runs d'export, statuts et seuils d'expiration
//! - `providers.rs`: fournisseurs de données et historique des tâches
//!
//! ## Conventions
//! - Les identifiants utilisent `uuid::Uuid`
//! - Les timestamps utilisent `chrono::DateTime<chrono::Utc>`

pub mod geometry;
pub mod jobs;
pub mod providers;
pub mod runs;

pub use geometry::Geometry;
pub use jobs::{ConfigType, ExportConfig, ExportFormat, GeometryType, Job, JobDetail, NewJobRequest, Tag, TagMap};
pub use providers::{DataProvider, DataProviderTaskRecord, ExportTaskRecord, FileProducingTaskResult, RunFootprint};
pub use runs::{ExpirationThreshold, ExpiringRun, ExportRun, RunStatus, User};
