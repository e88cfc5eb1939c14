use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{query, query_as, Pool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{DataProvider, ExportConfig, ExportFormat, Job, Tag};
use crate::infrastructure::database::{JobStore, JobTransaction};
use crate::utils::error::{AppError, Result};

/// Repository pour les jobs d'export et leurs données de référence
#[derive(Clone)]
pub struct JobsRepository {
    pool: Pool<Postgres>,
}

type ConfigRow = (Uuid, String, String, String, bool, DateTime<Utc>);

fn config_from_row(row: ConfigRow) -> Result<ExportConfig> {
    let (uid, name, config_type, upload, published, created_at) = row;
    Ok(ExportConfig {
        uid,
        name,
        config_type: config_type.parse()?,
        upload,
        published,
        created_at,
    })
}

/// Remet les lignes dans l'ordre des slugs demandés
fn in_request_order<T>(slugs: &[String], mut rows: Vec<T>, slug_of: impl Fn(&T) -> &str) -> Vec<T> {
    rows.sort_by_key(|row| slugs.iter().position(|s| s == slug_of(row)).unwrap_or(usize::MAX));
    rows
}

impl JobsRepository {
    /// Crée une nouvelle instance du repository
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobsRepository {
    async fn formats_by_slugs(&self, slugs: &[String]) -> Result<Vec<ExportFormat>> {
        let rows = query_as::<_, (String, String, String)>(
            "SELECT slug, name, description FROM export_formats WHERE slug = ANY($1)",
        )
        .bind(slugs.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let formats = rows
            .into_iter()
            .map(|(slug, name, description)| ExportFormat { slug, name, description })
            .collect();
        Ok(in_request_order(slugs, formats, |f: &ExportFormat| f.slug.as_str()))
    }

    async fn providers_by_slugs(&self, slugs: &[String]) -> Result<Vec<DataProvider>> {
        let rows = query_as::<_, (Uuid, String, String, Option<f64>)>(
            "SELECT uid, name, slug, size_estimate_constant FROM data_providers WHERE slug = ANY($1)",
        )
        .bind(slugs.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let providers = rows
            .into_iter()
            .map(|(uid, name, slug, size_estimate_constant)| DataProvider {
                uid,
                name,
                slug,
                size_estimate_constant,
            })
            .collect();
        Ok(in_request_order(slugs, providers, |p: &DataProvider| p.slug.as_str()))
    }

    async fn get_config(&self, uid: Uuid) -> Result<ExportConfig> {
        let row = query_as::<_, ConfigRow>(
            r#"
            SELECT uid, name, config_type, upload, published, created_at
            FROM export_configs
            WHERE uid = $1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Config {}", uid)))?;

        config_from_row(row)
    }

    async fn begin(&self) -> Result<Box<dyn JobTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgJobTransaction { tx }))
    }
}

/// Transaction PostgreSQL d'une création de job (rollback au drop)
pub struct PgJobTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl JobTransaction for PgJobTransaction {
    async fn insert_job(&mut self, job: &Job) -> Result<()> {
        query(
            r#"
            INSERT INTO jobs (uid, name, description, geometry, user_id, created_at, published)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.uid)
        .bind(&job.name)
        .bind(&job.description)
        .bind(Json(&job.geometry))
        .bind(job.user_id)
        .bind(job.created_at)
        .bind(job.published)
        .execute(&mut *self.tx)
        .await?;
        debug!("Job {} inséré", job.uid);
        Ok(())
    }

    async fn attach_formats(&mut self, job_uid: Uuid, formats: &[ExportFormat]) -> Result<()> {
        for format in formats {
            query("INSERT INTO job_formats (job_uid, format_slug) VALUES ($1, $2)")
                .bind(job_uid)
                .bind(&format.slug)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &Tag) -> Result<()> {
        let geom_types: Vec<String> = tag.geom_types.iter().map(|g| g.to_string()).collect();
        query("INSERT INTO tags (id, job_uid, name, geom_types) VALUES ($1, $2, $3, $4)")
            .bind(tag.id)
            .bind(tag.job_uid)
            .bind(&tag.name)
            .bind(geom_types)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn attach_config(&mut self, job_uid: Uuid, config: &ExportConfig, position: i32) -> Result<()> {
        query("INSERT INTO job_configs (job_uid, config_uid, position) VALUES ($1, $2, $3)")
            .bind(job_uid)
            .bind(config.uid)
            .bind(position)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn attach_providers(&mut self, job_uid: Uuid, providers: &[DataProvider]) -> Result<()> {
        for provider in providers {
            query("INSERT INTO job_providers (job_uid, provider_uid) VALUES ($1, $2)")
                .bind(job_uid)
                .bind(provider.uid)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigType, Geometry, GeometryType};
    use crate::infrastructure::database::fixtures::{count, insert_format};

    #[test]
    fn test_rows_follow_request_order() {
        let slugs = vec!["gpkg".to_string(), "shp".to_string()];
        let rows = vec![
            ExportFormat { slug: "shp".into(), name: "Shapefile".into(), description: String::new() },
            ExportFormat { slug: "gpkg".into(), name: "Geopackage".into(), description: String::new() },
        ];
        let ordered = in_request_order(&slugs, rows, |f: &ExportFormat| f.slug.as_str());
        assert_eq!(ordered[0].slug, "gpkg");
        assert_eq!(ordered[1].slug, "shp");
    }

    #[test]
    fn test_config_row_conversion() {
        let uid = Uuid::new_v4();
        let row: ConfigRow = (uid, "hdm".into(), "PRESET".into(), "export/config/preset/hdm.json".into(), true, Utc::now());
        let config = config_from_row(row).unwrap();
        assert_eq!(config.uid, uid);
        assert_eq!(config.config_type, crate::domain::ConfigType::Preset);

        let bad: ConfigRow = (uid, "x".into(), "SCRIPT".into(), "x".into(), false, Utc::now());
        assert!(config_from_row(bad).is_err());
    }

    fn job() -> Job {
        Job::new(
            Uuid::new_v4(),
            "Monrovia".into(),
            "Hospitals".into(),
            Geometry::from_bbox(-10.85, 6.25, -10.62, 6.40),
            false,
        )
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "nécessite DATABASE_URL (PostgreSQL)"]
    async fn test_failure_mid_transaction_leaves_no_rows(pool: Pool<Postgres>) {
        let repo = JobsRepository::new(pool.clone());
        let shp = insert_format(&pool, "shp").await;
        let unknown = ExportFormat {
            slug: "nope".into(),
            name: "nope".into(),
            description: String::new(),
        };
        let job = job();

        {
            let mut tx = repo.begin().await.unwrap();
            tx.insert_job(&job).await.unwrap();
            tx.insert_tag(&Tag::new(job.uid, "building".into(), vec![GeometryType::Polygon]))
                .await
                .unwrap();
            // Clé étrangère vers un format absent
            assert!(tx.attach_formats(job.uid, &[shp, unknown]).await.is_err());
        }

        assert_eq!(count(&pool, "jobs").await, 0);
        assert_eq!(count(&pool, "tags").await, 0);
        assert_eq!(count(&pool, "job_formats").await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "nécessite DATABASE_URL (PostgreSQL)"]
    async fn test_committed_job_keeps_links(pool: Pool<Postgres>) {
        let repo = JobsRepository::new(pool.clone());
        let shp = insert_format(&pool, "shp").await;
        insert_format(&pool, "gpkg").await;
        let preset = ExportConfig {
            uid: Uuid::new_v4(),
            name: "hdm".into(),
            config_type: ConfigType::Preset,
            upload: "export/config/preset/hdm.json".into(),
            published: false,
            created_at: Utc::now(),
        };
        query("INSERT INTO export_configs (uid, name, config_type, upload) VALUES ($1, $2, $3, $4)")
            .bind(preset.uid)
            .bind(&preset.name)
            .bind(preset.config_type.to_string())
            .bind(&preset.upload)
            .execute(&pool)
            .await
            .unwrap();
        let job = job();

        let mut tx = repo.begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.attach_formats(job.uid, &[shp]).await.unwrap();
        tx.insert_tag(&Tag::new(job.uid, "amenity".into(), vec![GeometryType::Point]))
            .await
            .unwrap();
        tx.attach_config(job.uid, &preset, 0).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(count(&pool, "jobs").await, 1);
        assert_eq!(count(&pool, "job_formats").await, 1);
        assert_eq!(count(&pool, "tags").await, 1);
        assert_eq!(count(&pool, "job_configs").await, 1);

        let formats = repo
            .formats_by_slugs(&["gpkg".to_string(), "shp".to_string(), "nope".to_string()])
            .await
            .unwrap();
        let slugs: Vec<&str> = formats.iter().map(|f| f.slug.as_str()).collect();
        assert_eq!(slugs, vec!["gpkg", "shp"]);

        assert_eq!(repo.get_config(preset.uid).await.unwrap().config_type, ConfigType::Preset);
        assert!(matches!(
            repo.get_config(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
