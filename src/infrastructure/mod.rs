//! Implémentations concrètes: PostgreSQL, mémoire, Redis, SMTP, Overpass, géocodeur

pub mod database;
pub mod geocode_auth;
pub mod mailer;
pub mod memory;
pub mod overpass;
pub mod presets;
pub mod queue;

pub use database::{Database, JobStore, JobTransaction, ProviderStore, RunStore};
pub use geocode_auth::{GeocodeAuth, TokenProvider};
pub use mailer::{EmailMessage, LogMailer, Mailer};
pub use memory::MemoryStore;
pub use overpass::OverpassClient;
pub use presets::JsonPresetParser;
pub use queue::{LogQueue, RedisQueue};
