use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eventkit_backend::core::{
    ExpirationNotifier, FeatureCounter, JobService, RunLifecycleScheduler, SizeEstimateAggregator,
    TaskRunner,
};
use eventkit_backend::infrastructure::{
    Database, GeocodeAuth, JobStore, JsonPresetParser, LogMailer, LogQueue, Mailer, MemoryStore,
    OverpassClient, ProviderStore, RedisQueue, RunStore, TokenProvider,
};
use eventkit_backend::utils::{Config, StoreBackend};
use eventkit_backend::workers::{
    start_expiration_worker, start_size_average_worker, ExpirationWorkerConfig,
    SizeAverageWorkerConfig,
};
use eventkit_backend::{api, NAME, VERSION};

/// Stores partagés par les services
struct Stores {
    jobs: Arc<dyn JobStore>,
    runs: Arc<dyn RunStore>,
    providers: Arc<dyn ProviderStore>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Chargement de la configuration
    let config = Config::from_env()?;

    // Initialisation du logging
    setup_tracing(&config);
    info!("🚀 Démarrage de {} v{}", NAME, VERSION);
    info!("🔧 Mode: {} | stockage: {}", config.run_mode, config.store_backend);

    // Initialisation des services
    let stores = open_stores(&config).await?;
    let runner = open_runner(&config).await?;
    let mailer = open_mailer(&config)?;

    let overpass: Arc<dyn FeatureCounter> = Arc::new(OverpassClient::new(
        &config.overpass_api_url,
        config.disable_ssl_verification,
    )?);

    // Jeton du géocodeur obtenu au premier usage, puis mémorisé par l'instance
    let token_provider: Arc<dyn TokenProvider> = Arc::new(GeocodeAuth::new(config.geocoding_auth_url.clone()));
    let geocode_auth: web::Data<dyn TokenProvider> = web::Data::from(token_provider);

    let job_service = web::Data::new(JobService::new(
        stores.jobs.clone(),
        runner,
        Arc::new(JsonPresetParser::new()),
        config.upload_root.clone(),
        config.preset_failure_policy,
    ));

    // Démarrage des workers background
    let notifier = Arc::new(ExpirationNotifier::new(
        mailer,
        &config.site_url,
        &config.default_from_email,
    ));
    start_expiration_worker(
        ExpirationWorkerConfig {
            interval_seconds: config.expiration_sweep_interval_seconds,
        },
        Arc::new(RunLifecycleScheduler::new(stores.runs.clone(), notifier)),
    );
    start_size_average_worker(
        SizeAverageWorkerConfig {
            interval_seconds: config.size_average_interval_seconds,
        },
        Arc::new(SizeEstimateAggregator::new(stores.providers.clone(), overpass)),
    );

    // Configuration du serveur Actix-Web
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(job_service.clone())
            .app_data(geocode_auth.clone())
            .configure(api::config)
    })
    .bind(format!("{}:{}", config.server_host, config.server_port))?
    .workers(config.workers)
    .shutdown_timeout(10);

    info!("✅ Backend démarré avec succès!");
    info!("🔗 API disponible sur http://{}:{}", config.server_host, config.server_port);

    server.run().await?;
    Ok(())
}

/// Configure le tracing pour le logging structuré
fn setup_tracing(config: &Config) {
    let log_level = config.log_level.parse().unwrap_or(tracing::Level::INFO);

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(if config.log_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}

/// Ouvre PostgreSQL (migrations comprises) ou le stockage mémoire
async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let db = Database::new(config.require_database_url()?, config.database_max_connections).await?;
            db.migrate().await?;
            Ok(Stores {
                jobs: Arc::new(db.jobs()),
                runs: Arc::new(db.runs()),
                providers: Arc::new(db.providers()),
            })
        }
        StoreBackend::Memory => {
            warn!("⚠️  Stockage en mémoire: les données seront perdues à l'arrêt");
            let store = MemoryStore::with_reference_data().await;
            Ok(Stores {
                jobs: Arc::new(store.clone()),
                runs: Arc::new(store.clone()),
                providers: Arc::new(store),
            })
        }
    }
}

/// Queue Redis si configurée, sinon simple journalisation
async fn open_runner(config: &Config) -> anyhow::Result<Arc<dyn TaskRunner>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisQueue::new(url, &config.redis_queue_prefix).await?)),
        None => {
            warn!("⚠️  REDIS_URL absent: les jobs ne seront pas publiés");
            Ok(Arc::new(LogQueue))
        }
    }
}

#[cfg(feature = "email")]
fn open_mailer(config: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    if config.email_provider == "smtp" {
        let mailer = eventkit_backend::infrastructure::mailer::SmtpMailer::from_config(config)?;
        info!("📧 Envoi des emails via SMTP");
        return Ok(Arc::new(mailer));
    }
    Ok(Arc::new(LogMailer))
}

#[cfg(not(feature = "email"))]
fn open_mailer(config: &Config) -> anyhow::Result<Arc<dyn Mailer>> {
    if config.email_provider == "smtp" {
        warn!("⚠️  EMAIL_PROVIDER=smtp mais la feature 'email' est désactivée");
    }
    Ok(Arc::new(LogMailer))
}
