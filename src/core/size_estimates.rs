// core/size_estimates.rs
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{DataProvider, DataProviderTaskRecord, Geometry};
use crate::infrastructure::database::ProviderStore;
use crate::utils::error::Result;

/// Tâches dont le fichier ne reflète pas la taille des données
pub const IGNORED_TASKS: [&str; 2] = ["Area of Interest (.geojson)", "Project file (.zip)"];

/// Nombre de runs récents examinés par fournisseur
pub const RUN_SAMPLE_SIZE: i64 = 100;

/// Slug du fournisseur dont l'estimation se fait par feature
pub const OSM_SLUG: &str = "osm";

/// Tailles minimales (Mo); en dessous, le fichier est considéré vide
pub const OSM_MIN_SIZE_MB: f64 = 0.5;
pub const AREA_MIN_SIZE_MB: f64 = 2.0;

/// Compte les features OSM contenues dans une emprise
#[async_trait]
pub trait FeatureCounter: Send + Sync {
    async fn count(&self, geometry: &Geometry) -> Result<u64>;
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Écart-type de population
fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Garde les valeurs strictement comprises dans `médiane ± deviations × σ`.
/// Trois valeurs ou moins, ou σ nul: les données sont rendues telles quelles.
pub fn remove_outliers(data: &[f64], deviations: f64) -> Vec<f64> {
    if data.len() <= 3 {
        return data.to_vec();
    }

    let sigma = std_dev(data);
    // Valeurs toutes égales: le filtre strict ne garderait rien et le
    // fournisseur ne serait jamais mis à jour, on garde donc tout
    if sigma == 0.0 {
        return data.to_vec();
    }

    let median = median(data);
    let lower = median - deviations * sigma;
    let upper = median + deviations * sigma;
    data.iter().copied().filter(|v| lower < *v && *v < upper).collect()
}

/// Taille (Go) du premier fichier produit pour `provider_name`.
///
/// Seul le premier enregistrement portant ce nom est examiné. 0 si aucun
/// fichier ne convient, si la taille manque ou si elle est sous `min_size` (Mo).
pub fn file_size_gb(records: &[DataProviderTaskRecord], provider_name: &str, min_size: f64) -> f64 {
    let Some(record) = records.iter().find(|r| r.name == provider_name) else {
        return 0.0;
    };

    record
        .tasks
        .iter()
        .filter(|task| !IGNORED_TASKS.contains(&task.name.as_str()))
        .find_map(|task| task.result.as_ref())
        .and_then(|result| result.size)
        .filter(|size| *size > 0.0 && *size >= min_size)
        .map(|size| size * 0.001)
        .unwrap_or(0.0)
}

/// `None` quand le run ou le nom du fournisseur manque
pub async fn get_file_size(
    store: &dyn ProviderStore,
    run_uid: Option<Uuid>,
    provider_name: Option<&str>,
    min_size: f64,
) -> Result<Option<f64>> {
    let (Some(run_uid), Some(provider_name)) = (run_uid, provider_name) else {
        error!("❌ Le run et le nom du fournisseur sont requis pour obtenir la taille");
        return Ok(None);
    };

    let records = store.provider_task_records(run_uid).await?;
    Ok(Some(file_size_gb(&records, provider_name, min_size)))
}

/// Résultat d'un passage d'agrégation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    pub updated: Vec<(Uuid, f64)>,
    /// Fournisseurs sans run ou sans valeur exploitable
    pub unchanged: Vec<Uuid>,
    pub failures: usize,
}

/// Calcule la taille moyenne produite par unité d'entrée pour chaque fournisseur
pub struct SizeEstimateAggregator {
    store: Arc<dyn ProviderStore>,
    counter: Arc<dyn FeatureCounter>,
}

impl SizeEstimateAggregator {
    pub fn new(store: Arc<dyn ProviderStore>, counter: Arc<dyn FeatureCounter>) -> Self {
        Self { store, counter }
    }

    pub async fn run(&self) -> Result<AggregationReport> {
        debug!("Calcul des constantes de taille moyenne");
        let providers = self.store.list_providers().await?;
        let mut report = AggregationReport::default();

        for provider in &providers {
            match self.estimate(provider).await {
                Ok(Some(average)) => match self.store.set_size_estimate(provider.uid, average).await {
                    Ok(()) => {
                        info!("📏 {}: {} (constante de taille)", provider.slug, average);
                        report.updated.push((provider.uid, average));
                    }
                    Err(e) => {
                        error!("❌ {}: enregistrement impossible: {}", provider.slug, e);
                        report.failures += 1;
                    }
                },
                Ok(None) => report.unchanged.push(provider.uid),
                Err(e) => {
                    error!("❌ {}: estimation impossible: {}", provider.slug, e);
                    report.failures += 1;
                }
            }
        }

        info!("✅ Constantes de taille calculées pour {} fournisseurs", report.updated.len());
        Ok(report)
    }

    /// Moyenne des ratios après retrait des valeurs aberrantes
    async fn estimate(&self, provider: &DataProvider) -> Result<Option<f64>> {
        let runs = self
            .store
            .recent_completed_runs(provider.uid, RUN_SAMPLE_SIZE)
            .await?;
        if runs.is_empty() {
            info!("{} has no runs", provider.slug);
            return Ok(None);
        }

        info!("------------- {} -------------", provider.slug);
        let mut ratios = Vec::with_capacity(runs.len());

        for run in &runs {
            if provider.slug == OSM_SLUG {
                let features = match self.counter.count(&run.geometry).await {
                    Ok(count) => count,
                    Err(e) => {
                        error!("❌ Run {}: comptage des features impossible: {}", run.run_uid, e);
                        continue;
                    }
                };
                if features == 0 {
                    continue;
                }
                let size = self.file_size(run.run_uid, &provider.name, OSM_MIN_SIZE_MB).await?;
                if size > 0.0 {
                    ratios.push(size / features as f64);
                }
            } else {
                let area_km2 = run.geometry.webmercator_area_m2() * 0.000_001;
                let size = self.file_size(run.run_uid, &provider.name, AREA_MIN_SIZE_MB).await?;
                if size > 0.0 && area_km2 > 0.0 {
                    ratios.push(size / area_km2);
                }
            }
        }

        let kept = remove_outliers(&ratios, 2.0);
        if kept.is_empty() {
            return Ok(None);
        }
        Ok(Some(kept.iter().sum::<f64>() / kept.len() as f64))
    }

    async fn file_size(&self, run_uid: Uuid, provider_name: &str, min_size: f64) -> Result<f64> {
        Ok(get_file_size(self.store.as_ref(), Some(run_uid), Some(provider_name), min_size)
            .await?
            .unwrap_or(0.0))
    }
}
