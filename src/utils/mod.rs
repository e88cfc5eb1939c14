// utils/mod.rs
pub mod config;
pub mod error;
pub mod validation;

// Ré-exports pour faciliter l'import
pub use config::{Config, PresetFailurePolicy, StoreBackend};
pub use error::{AppError, Result};
pub use validation::{normalize_slugs, validate_url, validate_uuid};
