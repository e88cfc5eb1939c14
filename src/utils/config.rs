// utils/config.rs
use crate::utils::error::{AppError, Result};
use crate::utils::validation::validate_url;
use dotenv::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Comportement quand un preset ne peut pas être lu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetFailurePolicy {
    /// La création du job échoue (400)
    Reject,
    /// Les tags par défaut sont utilisés
    Defaults,
}

impl FromStr for PresetFailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(PresetFailurePolicy::Reject),
            "defaults" => Ok(PresetFailurePolicy::Defaults),
            other => Err(AppError::Configuration(format!(
                "PRESET_FAILURE_POLICY must be 'reject' or 'defaults', got '{}'",
                other
            ))),
        }
    }
}

/// Stockage utilisé par le service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Configuration(format!(
                "STORE_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Postgres => f.write_str("postgres"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,
    pub log_format: String,

    // Stockage
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Redis
    pub redis_url: Option<String>,
    pub redis_queue_prefix: String,

    // Email
    pub site_url: String,
    pub default_from_email: String,
    pub email_provider: String,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_tls: bool,

    // Services externes
    pub overpass_api_url: String,
    pub disable_ssl_verification: bool,
    pub geocoding_auth_url: Option<String>,

    // Jobs
    pub upload_root: PathBuf,
    pub preset_failure_policy: PresetFailurePolicy,

    // Maintenance
    pub expiration_sweep_interval_seconds: u64,
    pub size_average_interval_seconds: u64,
}

/// Lit une variable et la convertit, avec une valeur par défaut
fn parse_var<T: FromStr>(key: &str, default: &str) -> Result<T> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::Configuration(format!("{} has an invalid value", key)))
}

/// Variable optionnelle; une chaîne vide vaut absence
fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> Result<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();

        let store_backend: StoreBackend = parse_var("STORE_BACKEND", "postgres")?;
        let database_url = optional_var("DATABASE_URL");
        let redis_url = optional_var("REDIS_URL");

        if store_backend == StoreBackend::Postgres {
            for (key, value) in [("DATABASE_URL", &database_url), ("REDIS_URL", &redis_url)] {
                if value.is_none() {
                    return Err(AppError::Configuration(format!(
                        "Variable d'environnement requise manquante: {}",
                        key
                    )));
                }
            }
        }

        let config = Config {
            run_mode: env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", "8080")?,
            workers: parse_var("WORKERS", "4")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),

            store_backend,
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "20")?,

            redis_url,
            redis_queue_prefix: env::var("REDIS_QUEUE_PREFIX").unwrap_or_else(|_| "eventkit:".to_string()),

            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost".to_string()),
            default_from_email: env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "Eventkit Team <eventkit.team@gmail.com>".to_string()),
            email_provider: env::var("EMAIL_PROVIDER").unwrap_or_else(|_| "log".to_string()),
            smtp_host: optional_var("SMTP_HOST"),
            smtp_port: optional_var("SMTP_PORT")
                .map(|p| {
                    p.parse()
                        .map_err(|_| AppError::Configuration("SMTP_PORT must be a number".to_string()))
                })
                .transpose()?,
            smtp_username: optional_var("SMTP_USERNAME"),
            smtp_password: optional_var("SMTP_PASSWORD"),
            smtp_tls: parse_var("SMTP_TLS", "true")?,

            overpass_api_url: env::var("OVERPASS_API_URL")
                .unwrap_or_else(|_| "https://overpass-api.de/api/interpreter".to_string()),
            disable_ssl_verification: parse_var("DISABLE_SSL_VERIFICATION", "false")?,
            geocoding_auth_url: optional_var("GEOCODING_AUTH_URL"),

            upload_root: PathBuf::from(env::var("UPLOAD_ROOT").unwrap_or_else(|_| "./uploads".to_string())),
            preset_failure_policy: parse_var("PRESET_FAILURE_POLICY", "reject")?,

            expiration_sweep_interval_seconds: parse_var("EXPIRATION_SWEEP_INTERVAL_SECONDS", "3600")?,
            size_average_interval_seconds: parse_var("SIZE_AVERAGE_INTERVAL_SECONDS", "86400")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Vérifie la cohérence des paramètres
    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            return Err(AppError::Configuration("SERVER_PORT must be greater than 0".to_string()));
        }
        if self.workers == 0 {
            return Err(AppError::Configuration("WORKERS must be greater than 0".to_string()));
        }
        validate_url(&self.site_url)?;
        validate_url(&self.overpass_api_url)?;
        if let Some(url) = &self.geocoding_auth_url {
            validate_url(url)?;
        }
        if self.email_provider == "smtp" && self.smtp_host.is_none() {
            return Err(AppError::Configuration(
                "SMTP_HOST is required when EMAIL_PROVIDER=smtp".to_string(),
            ));
        }
        if self.expiration_sweep_interval_seconds == 0 || self.size_average_interval_seconds == 0 {
            return Err(AppError::Configuration("Sweep intervals must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Vérifier si on est en production
    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    /// URL de connexion PostgreSQL (requise pour le backend postgres)
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AppError::Configuration("DATABASE_URL is not set".to_string()))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        run_mode: "test".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 8080,
        workers: 1,
        log_level: "debug".to_string(),
        log_format: "compact".to_string(),
        store_backend: StoreBackend::Memory,
        database_url: None,
        database_max_connections: 1,
        redis_url: None,
        redis_queue_prefix: "test:".to_string(),
        site_url: "http://cloud.eventkit.test/".to_string(),
        default_from_email: "Eventkit Team <eventkit.team@gmail.com>".to_string(),
        email_provider: "log".to_string(),
        smtp_host: None,
        smtp_port: None,
        smtp_username: None,
        smtp_password: None,
        smtp_tls: false,
        overpass_api_url: "http://localhost/api/interpreter".to_string(),
        disable_ssl_verification: false,
        geocoding_auth_url: None,
        upload_root: PathBuf::from("./uploads"),
        preset_failure_policy: PresetFailurePolicy::Reject,
        expiration_sweep_interval_seconds: 3600,
        size_average_interval_seconds: 86400,
    }
}
