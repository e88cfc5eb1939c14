use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::job_service::TaskRunner;
use crate::utils::error::Result;

/// Nom de la liste lue par les workers d'export
const EXPORT_QUEUE: &str = "queue:export_jobs";

/// Message publié pour chaque job à exécuter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub job_uid: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

/// Queue Redis des jobs d'export (LPUSH, consommée hors de ce service)
#[derive(Clone)]
pub struct RedisQueue {
    client: Arc<Client>,
    prefix: String,
}

impl RedisQueue {
    /// Ouvrir la queue et vérifier la connexion
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        info!("🔧 Initialisation de la queue Redis...");
        let client = Client::open(redis_url)?;

        let queue = Self {
            client: Arc::new(client),
            prefix: prefix.to_string(),
        };
        queue.health_check().await?;

        info!("✅ Queue Redis initialisée");
        Ok(queue)
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Clé de la liste des jobs à exécuter
    pub fn queue_key(&self) -> String {
        self.key(EXPORT_QUEUE)
    }

    pub fn message(job_uid: Uuid) -> DispatchMessage {
        DispatchMessage {
            job_uid,
            enqueued_at: Utc::now(),
        }
    }

    /// Vérifier la connexion Redis
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRunner for RedisQueue {
    async fn run(&self, job_uid: Uuid) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let data = serde_json::to_string(&Self::message(job_uid))?;

        let _: () = conn.lpush(self.queue_key(), data).await?;
        debug!("Job {} publié sur {}", job_uid, self.queue_key());
        Ok(())
    }
}

/// Runner sans Redis (STORE_BACKEND=memory): le job est seulement journalisé
#[derive(Debug, Clone, Default)]
pub struct LogQueue;

#[async_trait]
impl TaskRunner for LogQueue {
    async fn run(&self, job_uid: Uuid) -> Result<()> {
        info!("📨 Job {} prêt (aucune queue configurée)", job_uid);
        Ok(())
    }
}
