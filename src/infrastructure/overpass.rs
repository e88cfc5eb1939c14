use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, warn};

use crate::core::size_estimates::FeatureCounter;
use crate::domain::geometry::{Geometry, Position};
use crate::utils::error::{AppError, Result};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Inverse chaque position: `[lon, lat]` -> `[lat, lon]`
pub fn reverse_polygon_lat_lon(coords: &[Position]) -> Vec<Position> {
    coords.iter().map(|[x, y]| [*y, *x]).collect()
}

/// Positions jointes par des espaces: `a b a b ...`
pub fn coord_array_to_string(coords: &[Position]) -> String {
    coords
        .iter()
        .map(|[a, b]| format!("{} {}", a, b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Requête Overpass comptant les features dans l'anneau extérieur
pub fn build_count_query(geometry: &Geometry) -> Result<String> {
    let ring = geometry
        .outer_ring()
        .filter(|ring| !ring.is_empty())
        .ok_or_else(|| AppError::BadRequest("Geometry should be a polygon type".to_string()))?;

    let polygon = coord_array_to_string(&reverse_polygon_lat_lon(ring));
    Ok(format!(r#"[out:json];(node(poly:"{}");<;);out count;"#, polygon))
}

/// Lit `elements[0].tags.total` (nombre ou chaîne)
pub fn parse_count_response(body: &Value) -> Result<u64> {
    let total = body
        .pointer("/elements/0/tags/total")
        .ok_or_else(|| AppError::ParseError("Could not parse response from OSM server".to_string()))?;

    match total {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::ParseError(format!("Invalid feature count: {}", total)))
}

/// Client Overpass pour compter les features OSM d'une emprise
#[derive(Clone)]
pub struct OverpassClient {
    client: Client,
    url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl OverpassClient {
    pub fn new(url: &str, disable_ssl_verification: bool) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(disable_ssl_verification)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Politique de nouvelle tentative sur HTTP 429
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    async fn post(&self, query: &str) -> Result<reqwest::Response> {
        self.client
            .post(&self.url)
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| {
                error!("❌ Requête Overpass échouée: {}", e);
                AppError::ExternalService(format!("Overpass query failed: {}", e))
            })
    }
}

#[async_trait]
impl FeatureCounter for OverpassClient {
    async fn count(&self, geometry: &Geometry) -> Result<u64> {
        let query = build_count_query(geometry)?;

        let mut response = self.post(&query).await?;
        let mut attempts = 0;
        while response.status() == StatusCode::TOO_MANY_REQUESTS {
            if attempts >= self.max_retries {
                return Err(AppError::ExternalService(format!(
                    "Overpass still rate limited after {} retries",
                    attempts
                )));
            }
            attempts += 1;
            warn!("⏳ Overpass limite le débit, nouvelle tentative {}/{}", attempts, self.max_retries);
            tokio::time::sleep(self.retry_delay).await;
            response = self.post(&query).await?;
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| AppError::ParseError("Could not parse response from OSM server".to_string()))?;
        parse_count_response(&body)
    }
}
