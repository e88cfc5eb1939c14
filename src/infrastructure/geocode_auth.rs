use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::utils::error::{AppError, Result};

/// Fournit le jeton d'authentification du géocodeur
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Jeton en cache, ou obtenu s'il n'y en a pas encore
    async fn get(&self) -> Result<Option<String>>;

    /// Obtient toujours un nouveau jeton
    async fn refresh(&self) -> Result<Option<String>>;

    /// `Authorization: Bearer <token>`, ou rien sans URL d'authentification
    async fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.get().await? {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| AppError::ExternalService(format!("invalid geocoding token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authentification du géocodeur, jeton mémorisé dans l'instance
pub struct GeocodeAuth {
    client: Client,
    auth_url: Option<String>,
    token: RwLock<Option<String>>,
}

impl GeocodeAuth {
    pub fn new(auth_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            auth_url,
            token: RwLock::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for GeocodeAuth {
    async fn get(&self) -> Result<Option<String>> {
        if self.auth_url.is_none() {
            return Ok(None);
        }
        let cached = self.token.read().await.clone();
        if let Some(token) = cached {
            return Ok(Some(token));
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<Option<String>> {
        let Some(url) = &self.auth_url else {
            return Ok(None);
        };

        info!("🔑 Nouveau jeton d'authentification pour le géocodeur");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!("❌ Authentification du géocodeur impossible: {}", e);
                AppError::ExternalService(e.to_string())
            })?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::ParseError(format!("geocoding auth response: {}", e)))?;

        *self.token.write().await = Some(body.access_token.clone());
        Ok(Some(body.access_token))
    }
}
