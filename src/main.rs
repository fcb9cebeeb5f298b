/// Mailcrypt service daemon
use clap::{Parser, Subcommand};
use mailcrypt::config::Config;
use mailcrypt::error::{Error, Result};
use mailcrypt::events::{EventBus, TracingSink, WebhookSink};
use mailcrypt::metrics::MetricsRegistry;
use mailcrypt::objstore::pipeline::AttachmentPipeline;
use mailcrypt::objstore::{FsObjectStore, ObjectStore, Presigner};
use mailcrypt::repo::PgRepo;
use mailcrypt::scheduler::RenewalScheduler;
use mailcrypt::server::{AppState, DatabaseProbe, HealthProbe, HealthState, ObjectStoreProbe};
use mailcrypt::ssl::{
    AcmeDelegateConfig, AcmeIssuer, AcmeRateLimiter, CertificateCache, CertificateManager,
    DelegateHttpIssuer, EncryptedCertStore, LocalCaIssuer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "mailcrypt", version, about = "Persistent disposable-email service core")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "mailcrypt.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service
    Serve,
    /// Load, validate and print the effective configuration
    ConfigCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)?;
    config.apply_env_overrides()?;
    config.validate()?;

    match cli.command {
        Command::ConfigCheck => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| Error::configuration(format!("Failed to render config: {}", e)))?;
            println!("{}", rendered);
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let metrics = Arc::new(MetricsRegistry::new());

    // Database-backed repositories
    let repo = Arc::new(
        PgRepo::connect(&config.database.url, config.database.max_connections).await?,
    );
    sqlx::migrate!("./migrations")
        .run(repo.pool())
        .await
        .map_err(|e| Error::database(format!("Migration failed: {}", e)))?;

    // Object store and attachment pipeline
    let presigner = Presigner::new(
        Config::expand_env_var(&config.attachments.presign_secret)?.into_bytes(),
        config.attachments.base_url.clone(),
    );
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
        &config.attachments.root_path,
        presigner.clone(),
    ));
    let pipeline = Arc::new(AttachmentPipeline::new(
        objects.clone(),
        repo.clone(),
        repo.clone(),
        config.attachments.large_file_threshold,
        Duration::from_secs(config.attachments.presign_expiry_secs),
    ));

    // Certificate lifecycle
    let cert_store = Arc::new(EncryptedCertStore::new(
        &config.certificates.root_path,
        config.certificate_key()?,
    ));
    let cache = Arc::new(CertificateCache::new(metrics.clone()));
    let rate_limiter = Arc::new(AcmeRateLimiter::new(config.rate_limits.clone()));
    let delegate = AcmeDelegateConfig {
        environment: config.acme.environment.clone(),
        contact_email: config.acme.contact_email.clone(),
        dns_provider: config.acme.dns_provider.clone(),
    };
    tracing::info!(
        directory = delegate.directory_url(),
        dns_provider = %delegate.dns_provider,
        "ACME delegate configured"
    );
    let issuer: Arc<dyn AcmeIssuer> = if config.acme.delegate_url.is_empty() {
        tracing::warn!("No ACME delegate configured; using the in-process issuer");
        Arc::new(LocalCaIssuer::default())
    } else {
        Arc::new(DelegateHttpIssuer::new(
            config.acme.delegate_url.clone(),
            delegate,
        )?)
    };
    let manager = Arc::new(CertificateManager::new(
        repo.clone(),
        repo.clone(),
        cert_store,
        issuer,
        cache,
        rate_limiter.clone(),
        metrics.clone(),
        config.certificates.provisioning_concurrency,
        config.provisioning_deadline(),
    ));

    // Event bus
    let mut events = EventBus::new().with_sink(Arc::new(TracingSink));
    if let Some(event_config) = &config.events {
        events = events.with_sink(Arc::new(WebhookSink::new(
            event_config.webhook_url.clone(),
            event_config.auth_token.clone(),
            Duration::from_secs(event_config.timeout_secs),
        )));
    }

    // Renewal scheduler
    let scheduler = Arc::new(RenewalScheduler::new(
        manager.clone(),
        repo.clone(),
        events.clone(),
        metrics.clone(),
        config.renewal.clone(),
    ));

    // Health probes
    let probes: Vec<Arc<dyn HealthProbe>> = vec![
        Arc::new(DatabaseProbe {
            pool: repo.pool().clone(),
        }),
        Arc::new(ObjectStoreProbe {
            store: objects.clone(),
        }),
    ];
    let health = Arc::new(HealthState::new(
        probes,
        Duration::from_secs(config.server.health_timeout_secs),
    ));

    // Warm the certificate cache before accepting traffic
    manager.load_all_certificates().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown_rx.clone()));
    let pruner_task = tokio::spawn(rate_limiter.clone().run_pruner());

    // Shutdown ordering: readiness off first, then the workers and server
    {
        let health = health.clone();
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                health.set_ready(false);
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let addr = config
        .server
        .listen_addr
        .parse()
        .map_err(|e| Error::configuration(format!("Invalid listen address: {}", e)))?;

    let jwt_secret = Arc::new(Config::expand_env_var(&config.server.jwt_secret)?);
    let state = AppState {
        config: config.clone(),
        domains: repo.clone(),
        aliases: repo.clone(),
        emails: repo.clone(),
        attachments: repo.clone(),
        pipeline,
        objects,
        presigner,
        ssl: manager,
        scheduler,
        events,
        metrics,
        health: health.clone(),
        jwt_secret,
        shutdown: shutdown_rx.clone(),
    };

    health.set_ready(true);
    mailcrypt::server::start_server(addr, state, shutdown_rx).await?;

    // In-flight renewals finish; the pruner has no pending work to drain
    let _ = scheduler_task.await;
    pruner_task.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
