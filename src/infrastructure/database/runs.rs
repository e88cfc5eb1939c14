use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, Pool, Postgres};
use uuid::Uuid;

use crate::domain::{ExpiringRun, ExportRun};
use crate::infrastructure::database::RunStore;
use crate::utils::error::{AppError, Result};

/// Repository pour les runs d'export
#[derive(Clone)]
pub struct RunsRepository {
    pool: Pool<Postgres>,
}

type RunRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    String,
    Option<String>,
);

fn expiring_run_from_row(row: RunRow) -> Result<ExpiringRun> {
    let (uid, job_uid, user_id, status, created_at, expiration, notified, job_name, email) = row;
    Ok(ExpiringRun {
        run: ExportRun {
            uid,
            job_uid,
            user_id,
            status: status.parse()?,
            created_at,
            expiration,
            notified,
        },
        job_name,
        email: email.filter(|e| !e.trim().is_empty()),
    })
}

impl RunsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for RunsRepository {
    async fn list_runs(&self) -> Result<Vec<ExpiringRun>> {
        let rows = query_as::<_, RunRow>(
            r#"
            SELECT r.uid, r.job_uid, r.user_id, r.status, r.created_at, r.expiration, r.notified,
                   j.name, u.email
            FROM export_runs r
            JOIN jobs j ON j.uid = r.job_uid
            LEFT JOIN users u ON u.id = r.user_id
            ORDER BY r.expiration ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(expiring_run_from_row).collect()
    }

    async fn delete_run(&self, run_uid: Uuid) -> Result<()> {
        let result = query("DELETE FROM export_runs WHERE uid = $1")
            .bind(run_uid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Run {}", run_uid)));
        }
        Ok(())
    }

    async fn mark_notified(&self, run_uid: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = query("UPDATE export_runs SET notified = $2 WHERE uid = $1")
            .bind(run_uid)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Run {}", run_uid)));
        }
        Ok(())
    }
}
