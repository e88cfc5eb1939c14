use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Statut d'un run d'export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Submitted,
    Running,
    Completed,
    Cancelled,
    Incomplete,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Submitted => "SUBMITTED",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Incomplete => "INCOMPLETE",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

impl FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(RunStatus::Submitted),
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            "INCOMPLETE" => Ok(RunStatus::Incomplete),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(AppError::ParseError(format!("Unknown run status: {}", other))),
        }
    }
}

/// Seuil d'avertissement avant expiration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationThreshold {
    SevenDay,
    TwoDay,
}

impl ExpirationThreshold {
    pub fn window(&self) -> Duration {
        match self {
            ExpirationThreshold::SevenDay => Duration::days(7),
            ExpirationThreshold::TwoDay => Duration::days(2),
        }
    }
}

impl fmt::Display for ExpirationThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpirationThreshold::SevenDay => f.write_str("7-day"),
            ExpirationThreshold::TwoDay => f.write_str("2-day"),
        }
    }
}

/// Une exécution d'un job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRun {
    pub uid: Uuid,
    pub job_uid: Uuid,
    pub user_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub notified: Option<DateTime<Utc>>,
}

impl ExportRun {
    pub fn new(job_uid: Uuid, user_id: Uuid, status: RunStatus, expiration: DateTime<Utc>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            job_uid,
            user_id,
            status,
            created_at: Utc::now(),
            expiration,
            notified: None,
        }
    }
}

/// Run accompagné de ce qu'il faut pour prévenir son propriétaire
#[derive(Debug, Clone)]
pub struct ExpiringRun {
    pub run: ExportRun,
    pub job_name: String,
    pub email: Option<String>,
}

/// Propriétaire d'un run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(username: &str, email: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.map(str::to_string),
        }
    }
}
