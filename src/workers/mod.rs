//! # Workers Module
//!
//! Tâches de fond périodiques, chacune dans sa propre tâche Tokio:
//! - `expiration_worker.rs`: suppression des runs expirés et avertissements
//! - `size_average_worker.rs`: constantes de taille moyenne par fournisseur
//!
//! Chaque worker boucle sur `run_cycle` puis dort pendant son intervalle.
//! Une erreur de cycle est journalisée et n'arrête pas la boucle.

pub mod expiration_worker;
pub mod size_average_worker;

pub use expiration_worker::{start_expiration_worker, ExpirationWorker, ExpirationWorkerConfig};
pub use size_average_worker::{start_size_average_worker, SizeAverageWorker, SizeAverageWorkerConfig};
