use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::core::run_lifecycle::{RunLifecycleScheduler, SweepReport};
use crate::utils::error::Result;

/// Configuration du worker d'expiration
#[derive(Debug, Clone)]
pub struct ExpirationWorkerConfig {
    /// Intervalle entre deux passages (secondes)
    pub interval_seconds: u64,
}

impl Default for ExpirationWorkerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3600, // 1 heure
        }
    }
}

/// Worker d'expiration des runs
pub struct ExpirationWorker {
    config: ExpirationWorkerConfig,
    scheduler: Arc<RunLifecycleScheduler>,
}

impl ExpirationWorker {
    pub fn new(config: ExpirationWorkerConfig, scheduler: Arc<RunLifecycleScheduler>) -> Self {
        Self { config, scheduler }
    }

    /// Démarre le worker en boucle infinie
    pub async fn start(self) {
        info!("🔧 Worker d'expiration démarré avec config: {:?}", self.config);

        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        "✅ Cycle d'expiration terminé: {} supprimés, {} avertis",
                        report.deleted.len(),
                        report.notified.len()
                    );
                }
                Err(e) => {
                    error!("❌ Erreur lors du cycle d'expiration: {}", e);
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.interval_seconds)).await;
        }
    }

    pub async fn run_cycle(&self) -> Result<SweepReport> {
        info!("🔄 Démarrage du cycle d'expiration des runs...");
        self.scheduler.sweep().await
    }
}

/// Démarre le worker d'expiration dans une tâche Tokio séparée
pub fn start_expiration_worker(config: ExpirationWorkerConfig, scheduler: Arc<RunLifecycleScheduler>) {
    info!("🔧 Initialisation du worker d'expiration...");
    let worker = ExpirationWorker::new(config, scheduler);

    tokio::spawn(async move {
        worker.start().await;
    });

    info!("✅ Worker d'expiration démarré avec succès");
}
