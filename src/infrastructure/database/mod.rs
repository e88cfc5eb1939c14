//! Persistance: traits des stores et implémentations PostgreSQL

pub mod jobs;
pub mod providers;
pub mod runs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    DataProvider, DataProviderTaskRecord, ExpiringRun, ExportConfig, ExportFormat, Job, RunFootprint, Tag,
};
use crate::utils::error::Result;

pub use jobs::JobsRepository;
pub use providers::ProvidersRepository;
pub use runs::RunsRepository;

/// Gestion de la connexion à la base de données
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    /// Crée une nouvelle connexion à la base de données
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("🔌 Connexion à la base de données PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("✅ Connexion établie avec succès");

        Ok(Self { pool })
    }

    /// Applique les migrations embarquées
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("✅ Migrations appliquées");
        Ok(())
    }

    pub fn jobs(&self) -> JobsRepository {
        JobsRepository::new(self.pool.clone())
    }

    pub fn runs(&self) -> RunsRepository {
        RunsRepository::new(self.pool.clone())
    }

    pub fn providers(&self) -> ProvidersRepository {
        ProvidersRepository::new(self.pool.clone())
    }
}

/// Lecture des données de référence et ouverture des transactions de création
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Formats connus parmi les slugs donnés
    async fn formats_by_slugs(&self, slugs: &[String]) -> Result<Vec<ExportFormat>>;

    /// Fournisseurs connus parmi les slugs donnés
    async fn providers_by_slugs(&self, slugs: &[String]) -> Result<Vec<DataProvider>>;

    /// `AppError::NotFound` si la configuration n'existe pas
    async fn get_config(&self, uid: Uuid) -> Result<ExportConfig>;

    async fn begin(&self) -> Result<Box<dyn JobTransaction>>;
}

/// Écritures d'une création de job. Rien n'est visible avant `commit`;
/// abandonner la transaction annule tout.
#[async_trait]
pub trait JobTransaction: Send {
    async fn insert_job(&mut self, job: &Job) -> Result<()>;
    async fn attach_formats(&mut self, job_uid: Uuid, formats: &[ExportFormat]) -> Result<()>;
    async fn insert_tag(&mut self, tag: &Tag) -> Result<()>;
    async fn attach_config(&mut self, job_uid: Uuid, config: &ExportConfig, position: i32) -> Result<()>;
    async fn attach_providers(&mut self, job_uid: Uuid, providers: &[DataProvider]) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Tous les runs, avec nom du job et email du propriétaire
    async fn list_runs(&self) -> Result<Vec<ExpiringRun>>;
    async fn delete_run(&self, run_uid: Uuid) -> Result<()>;
    async fn mark_notified(&self, run_uid: Uuid, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn list_providers(&self) -> Result<Vec<DataProvider>>;

    /// Runs COMPLETED les plus récents dont le job référence le fournisseur
    async fn recent_completed_runs(&self, provider_uid: Uuid, limit: i64) -> Result<Vec<RunFootprint>>;

    async fn provider_task_records(&self, run_uid: Uuid) -> Result<Vec<DataProviderTaskRecord>>;

    async fn set_size_estimate(&self, provider_uid: Uuid, value: f64) -> Result<()>;
}

/// Données de test insérées directement en base (tests `#[sqlx::test]`)
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::{ExportRun, Geometry};
    use sqlx::query;

    pub async fn insert_format(pool: &Pool<Postgres>, slug: &str) -> ExportFormat {
        query("INSERT INTO export_formats (slug, name) VALUES ($1, $1)")
            .bind(slug)
            .execute(pool)
            .await
            .unwrap();
        ExportFormat {
            slug: slug.to_string(),
            name: slug.to_string(),
            description: String::new(),
        }
    }

    pub async fn insert_provider(pool: &Pool<Postgres>, name: &str, slug: &str) -> DataProvider {
        let provider = DataProvider::new(name, slug);
        query("INSERT INTO data_providers (uid, name, slug) VALUES ($1, $2, $3)")
            .bind(provider.uid)
            .bind(&provider.name)
            .bind(&provider.slug)
            .execute(pool)
            .await
            .unwrap();
        provider
    }

    /// Job commité via le repository, lié aux fournisseurs donnés
    pub async fn insert_job(pool: &Pool<Postgres>, providers: &[DataProvider]) -> Job {
        let job = Job::new(
            Uuid::new_v4(),
            "Monrovia".into(),
            "Hospitals".into(),
            Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40),
            false,
        );
        let mut tx = JobsRepository::new(pool.clone()).begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.attach_providers(job.uid, providers).await.unwrap();
        tx.commit().await.unwrap();
        job
    }

    pub async fn insert_run(pool: &Pool<Postgres>, run: &ExportRun) {
        query(
            r#"
            INSERT INTO export_runs (uid, job_uid, user_id, status, created_at, expiration, notified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(run.uid)
        .bind(run.job_uid)
        .bind(run.user_id)
        .bind(run.status.to_string())
        .bind(run.created_at)
        .bind(run.expiration)
        .bind(run.notified)
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn count(pool: &Pool<Postgres>, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }
}
