// core/job_service.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{ConfigType, DataProvider, ExportConfig, ExportFormat, Job, JobDetail, NewJobRequest, Tag, TagMap};
use crate::infrastructure::database::JobStore;
use crate::infrastructure::presets::default_tags;
use crate::utils::config::PresetFailurePolicy;
use crate::utils::error::{AppError, Result};
use crate::utils::validation::normalize_slugs;

/// Remet un job persisté au système d'exécution, sans attendre son traitement
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, job_uid: Uuid) -> Result<()>;
}

/// Lit le fichier d'un preset et en extrait les tags
#[async_trait]
pub trait PresetParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<TagMap>;
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn TaskRunner>,
    presets: Arc<dyn PresetParser>,
    upload_root: PathBuf,
    preset_policy: PresetFailurePolicy,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: Arc<dyn TaskRunner>,
        presets: Arc<dyn PresetParser>,
        upload_root: PathBuf,
        preset_policy: PresetFailurePolicy,
    ) -> Self {
        Self {
            store,
            runner,
            presets,
            upload_root,
            preset_policy,
        }
    }

    /// Créer un job d'export puis le remettre au runner.
    ///
    /// Toutes les lectures et le parsing du preset ont lieu avant la transaction;
    /// le dispatch n'a lieu qu'après le commit.
    pub async fn create_job(&self, owner: Uuid, request: NewJobRequest) -> Result<JobDetail> {
        request.validate()?;

        let formats = self.resolve_formats(&request.formats).await?;
        let providers = self.resolve_providers(&request.providers).await?;
        let configs = self.load_configs(&request).await?;

        let job = Job::new(
            owner,
            request.name.trim().to_string(),
            request.description.trim().to_string(),
            request.geometry,
            request.published,
        );

        let preset = configs.iter().find(|c| c.config_type == ConfigType::Preset);
        let tags = Tag::from_map(job.uid, &self.resolve_tags(preset).await?);

        if let Err(e) = self.persist(&job, &formats, &tags, &configs, &providers).await {
            error!("❌ Création du job {} annulée: {}", job.uid, e);
            return Err(AppError::ServerError(format!("Error creating export job: {}", e)));
        }
        info!(
            "✅ Job {} créé ({} formats, {} tags, {} configs)",
            job.uid,
            formats.len(),
            tags.len(),
            configs.len()
        );

        if let Err(e) = self.runner.run(job.uid).await {
            error!("❌ Dispatch du job {} impossible: {}", job.uid, e);
            return Err(AppError::Dispatch {
                job_uid: job.uid,
                reason: e.to_string(),
            });
        }
        info!("🚀 Job {} remis au runner", job.uid);

        Ok(JobDetail {
            job,
            formats,
            tags,
            configs,
            providers: providers.into_iter().map(|p| p.slug).collect(),
        })
    }

    /// Formats connus; les slugs inconnus sont ignorés
    async fn resolve_formats(&self, requested: &[String]) -> Result<Vec<ExportFormat>> {
        let slugs = normalize_slugs(requested);
        let formats = self.store.formats_by_slugs(&slugs).await?;

        for slug in slugs.iter().filter(|s| !formats.iter().any(|f| &f.slug == *s)) {
            warn!("⚠️  Format d'export inconnu ignoré: {}", slug);
        }

        if formats.is_empty() {
            return Err(AppError::InvalidFormat(requested.to_vec()));
        }
        Ok(formats)
    }

    async fn resolve_providers(&self, requested: &[String]) -> Result<Vec<DataProvider>> {
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let slugs = normalize_slugs(requested);
        let providers = self.store.providers_by_slugs(&slugs).await?;

        for slug in slugs.iter().filter(|s| !providers.iter().any(|p| &p.slug == *s)) {
            warn!("⚠️  Fournisseur inconnu ignoré: {}", slug);
        }
        Ok(providers)
    }

    /// Configurations référencées, dans l'ordre preset, translation, transform.
    /// Un même uid n'est attaché qu'une fois.
    async fn load_configs(&self, request: &NewJobRequest) -> Result<Vec<ExportConfig>> {
        let mut configs: Vec<ExportConfig> = Vec::new();
        for uid in [request.preset, request.translation, request.transform].into_iter().flatten() {
            if configs.iter().any(|c| c.uid == uid) {
                continue;
            }
            configs.push(self.store.get_config(uid).await?);
        }
        Ok(configs)
    }

    async fn resolve_tags(&self, preset: Option<&ExportConfig>) -> Result<TagMap> {
        let Some(preset) = preset else {
            return Ok(default_tags());
        };

        let path = self.upload_root.join(&preset.upload);
        let failure = match self.presets.parse(&path).await {
            Ok(tags) if !tags.is_empty() => return Ok(tags),
            Ok(_) => "no tags found".to_string(),
            Err(e) => e.to_string(),
        };

        match self.preset_policy {
            PresetFailurePolicy::Reject => Err(AppError::InvalidPreset(format!(
                "Could not read preset '{}': {}",
                preset.name, failure
            ))),
            PresetFailurePolicy::Defaults => {
                warn!(
                    "⚠️  Preset {} illisible ({}), tags par défaut utilisés",
                    preset.uid, failure
                );
                Ok(default_tags())
            }
        }
    }

    /// Une seule transaction; tout abandon avant `commit` annule les écritures
    async fn persist(
        &self,
        job: &Job,
        formats: &[ExportFormat],
        tags: &[Tag],
        configs: &[ExportConfig],
        providers: &[DataProvider],
    ) -> Result<()> {
        let mut tx = self.store.begin().await?;

        tx.insert_job(job).await?;
        tx.attach_formats(job.uid, formats).await?;
        for tag in tags {
            tx.insert_tag(tag).await?;
        }
        for (position, config) in configs.iter().enumerate() {
            tx.attach_config(job.uid, config, position as i32).await?;
        }
        tx.attach_providers(job.uid, providers).await?;

        tx.commit().await
    }
}
