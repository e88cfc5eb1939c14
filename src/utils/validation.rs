// utils/validation.rs
use crate::utils::error::{AppError, Result};
use uuid::Uuid;

/// Valider un UUID
pub fn validate_uuid(uuid_str: &str) -> Result<Uuid> {
    Uuid::parse_str(uuid_str.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid UUID: {}", uuid_str)))
}

/// Valider une URL http(s)
pub fn validate_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Configuration(format!("Invalid URL: {}", url)));
    }
    Ok(())
}

/// Normaliser une liste de slugs: trim, minuscules, sans doublons, ordre conservé
pub fn normalize_slugs(slugs: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let slug = slug.trim().to_lowercase();
        if !slug.is_empty() && !normalized.contains(&slug) {
            normalized.push(slug);
        }
    }
    normalized
}
