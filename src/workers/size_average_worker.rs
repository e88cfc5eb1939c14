use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::core::size_estimates::{AggregationReport, SizeEstimateAggregator};
use crate::utils::error::Result;

/// Configuration du worker de calcul des tailles moyennes
#[derive(Debug, Clone)]
pub struct SizeAverageWorkerConfig {
    /// Intervalle entre deux calculs (secondes)
    pub interval_seconds: u64,
}

impl Default for SizeAverageWorkerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 86_400, // 1 jour
        }
    }
}

/// Worker de calcul des constantes de taille par fournisseur
pub struct SizeAverageWorker {
    config: SizeAverageWorkerConfig,
    aggregator: Arc<SizeEstimateAggregator>,
}

impl SizeAverageWorker {
    pub fn new(config: SizeAverageWorkerConfig, aggregator: Arc<SizeEstimateAggregator>) -> Self {
        Self { config, aggregator }
    }

    /// Démarre le worker en boucle infinie
    pub async fn start(self) {
        info!("🔧 Worker des tailles moyennes démarré avec config: {:?}", self.config);

        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        "✅ Cycle des tailles moyennes terminé: {} mis à jour, {} échecs",
                        report.updated.len(),
                        report.failures
                    );
                }
                Err(e) => {
                    error!("❌ Erreur lors du calcul des tailles moyennes: {}", e);
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.interval_seconds)).await;
        }
    }

    pub async fn run_cycle(&self) -> Result<AggregationReport> {
        info!("🔄 Démarrage du calcul des tailles moyennes...");
        self.aggregator.run().await
    }
}

/// Démarre le worker dans une tâche Tokio séparée
pub fn start_size_average_worker(config: SizeAverageWorkerConfig, aggregator: Arc<SizeEstimateAggregator>) {
    info!("🔧 Initialisation du worker des tailles moyennes...");
    let worker = SizeAverageWorker::new(config, aggregator);

    tokio::spawn(async move {
        worker.start().await;
    });

    info!("✅ Worker des tailles moyennes démarré avec succès");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::size_estimates::FeatureCounter;
    use crate::domain::{DataProvider, Geometry};
    use crate::infrastructure::memory::MemoryStore;
    use async_trait::async_trait;

    struct NoCounter;

    #[async_trait]
    impl FeatureCounter for NoCounter {
        async fn count(&self, _geometry: &Geometry) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_cycle_without_runs_changes_nothing() {
        let store = MemoryStore::new();
        let provider = DataProvider::new("OpenStreetMap Data", "osm");
        store.add_provider(provider.clone()).await;

        let worker = SizeAverageWorker::new(
            SizeAverageWorkerConfig::default(),
            Arc::new(SizeEstimateAggregator::new(Arc::new(store.clone()), Arc::new(NoCounter))),
        );

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.unchanged, vec![provider.uid]);
        assert!(store.provider(provider.uid).await.unwrap().size_estimate_constant.is_none());
    }
}
