use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{query, query_as, Pool, Postgres};
use uuid::Uuid;

use crate::domain::{
    DataProvider, DataProviderTaskRecord, ExportTaskRecord, FileProducingTaskResult, Geometry, RunFootprint,
    RunStatus,
};
use crate::infrastructure::database::ProviderStore;
use crate::utils::error::{AppError, Result};

/// Repository pour les fournisseurs de données et l'historique des tâches
#[derive(Clone)]
pub struct ProvidersRepository {
    pool: Pool<Postgres>,
}

impl ProvidersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderStore for ProvidersRepository {
    async fn list_providers(&self) -> Result<Vec<DataProvider>> {
        let rows = query_as::<_, (Uuid, String, String, Option<f64>)>(
            "SELECT uid, name, slug, size_estimate_constant FROM data_providers ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(uid, name, slug, size_estimate_constant)| DataProvider {
                uid,
                name,
                slug,
                size_estimate_constant,
            })
            .collect())
    }

    async fn recent_completed_runs(&self, provider_uid: Uuid, limit: i64) -> Result<Vec<RunFootprint>> {
        let rows = query_as::<_, (Uuid, Json<Geometry>)>(
            r#"
            SELECT r.uid, j.geometry
            FROM export_runs r
            JOIN jobs j ON j.uid = r.job_uid
            JOIN job_providers jp ON jp.job_uid = j.uid
            WHERE jp.provider_uid = $1 AND r.status = $2
            ORDER BY r.created_at DESC
            LIMIT $3
            "#,
        )
        .bind(provider_uid)
        .bind(RunStatus::Completed.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(run_uid, Json(geometry))| RunFootprint { run_uid, geometry })
            .collect())
    }

    async fn provider_task_records(&self, run_uid: Uuid) -> Result<Vec<DataProviderTaskRecord>> {
        let records = query_as::<_, (Uuid, String, String, DateTime<Utc>)>(
            r#"
            SELECT uid, name, slug, created_at
            FROM provider_task_records
            WHERE run_uid = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_uid)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(records.len());
        for (uid, name, slug, created_at) in records {
            let tasks = query_as::<_, (Uuid, String, bool, Option<f64>)>(
                r#"
                SELECT uid, name, has_result, result_size
                FROM export_task_records
                WHERE provider_task_uid = $1
                ORDER BY position ASC
                "#,
            )
            .bind(uid)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(uid, name, has_result, size)| ExportTaskRecord {
                uid,
                name,
                result: has_result.then_some(FileProducingTaskResult { size }),
            })
            .collect();

            result.push(DataProviderTaskRecord {
                uid,
                run_uid,
                name,
                slug,
                created_at,
                tasks,
            });
        }

        Ok(result)
    }

    async fn set_size_estimate(&self, provider_uid: Uuid, value: f64) -> Result<()> {
        let updated = query("UPDATE data_providers SET size_estimate_constant = $2 WHERE uid = $1")
            .bind(provider_uid)
            .bind(value)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Provider {}", provider_uid)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExportRun;
    use crate::infrastructure::database::fixtures::{insert_job, insert_provider, insert_run};
    use chrono::Duration;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "nécessite DATABASE_URL (PostgreSQL)"]
    async fn test_recent_completed_runs_filters_and_limits(pool: Pool<Postgres>) {
        let repo = ProvidersRepository::new(pool.clone());
        let osm = insert_provider(&pool, "OpenStreetMap Data", "osm").await;
        let other = insert_provider(&pool, "Imagery", "imagery").await;
        let linked = insert_job(&pool, &[osm.clone()]).await;
        let unlinked = insert_job(&pool, &[other.clone()]).await;

        let now = Utc::now();
        let expiration = now + Duration::days(14);
        let mut completed = Vec::new();
        for age in 0..120 {
            let mut run = ExportRun::new(linked.uid, linked.user_id, RunStatus::Completed, expiration);
            run.created_at = now - Duration::hours(age + 1);
            insert_run(&pool, &run).await;
            completed.push(run.uid);
        }
        // Plus récents, mais exclus par le statut ou le fournisseur
        let failed = ExportRun::new(linked.uid, linked.user_id, RunStatus::Failed, expiration);
        insert_run(&pool, &failed).await;
        let foreign = ExportRun::new(unlinked.uid, unlinked.user_id, RunStatus::Completed, expiration);
        insert_run(&pool, &foreign).await;

        let runs = repo.recent_completed_runs(osm.uid, 100).await.unwrap();
        let returned: Vec<Uuid> = runs.iter().map(|r| r.run_uid).collect();
        assert_eq!(returned, completed[..100].to_vec());
        assert_eq!(runs[0].geometry, linked.geometry);

        let runs = repo.recent_completed_runs(other.uid, 100).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_uid, foreign.uid);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "nécessite DATABASE_URL (PostgreSQL)"]
    async fn test_task_records_and_size_estimate(pool: Pool<Postgres>) {
        let repo = ProvidersRepository::new(pool.clone());
        let osm = insert_provider(&pool, "OpenStreetMap Data", "osm").await;
        let job = insert_job(&pool, &[osm.clone()]).await;
        let run = ExportRun::new(job.uid, job.user_id, RunStatus::Completed, Utc::now());
        insert_run(&pool, &run).await;

        let record_uid = Uuid::new_v4();
        query("INSERT INTO provider_task_records (uid, run_uid, name, slug) VALUES ($1, $2, $3, $4)")
            .bind(record_uid)
            .bind(run.uid)
            .bind(&osm.name)
            .bind(&osm.slug)
            .execute(&pool)
            .await
            .unwrap();
        for (position, name, has_result, size) in [(1, "Geopackage", true, Some(42.0)), (0, "pending", false, None)] {
            query(
                r#"
                INSERT INTO export_task_records (uid, provider_task_uid, name, position, has_result, result_size)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(record_uid)
            .bind(name)
            .bind(position)
            .bind(has_result)
            .bind(size)
            .execute(&pool)
            .await
            .unwrap();
        }

        let records = repo.provider_task_records(run.uid).await.unwrap();
        assert_eq!(records.len(), 1);
        let tasks = &records[0].tasks;
        assert_eq!(tasks[0].name, "pending");
        assert!(tasks[0].result.is_none());
        assert_eq!(tasks[1].result.as_ref().and_then(|r| r.size), Some(42.0));

        repo.set_size_estimate(osm.uid, 0.25).await.unwrap();
        let providers = repo.list_providers().await.unwrap();
        assert_eq!(providers[0].size_estimate_constant, Some(0.25));
        assert!(matches!(
            repo.set_size_estimate(Uuid::new_v4(), 1.0).await,
            Err(AppError::NotFound(_))
        ));
    }
}
