mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trustwatch_alerts::{AlertError, AlertEvent};
use trustwatch_classifier::{ClassifierClient, ClassifierOptions};
use trustwatch_core::{AppConfig, Severity};
use trustwatch_db::DbError;
use trustwatch_pipeline::{
    Coordinator, CoordinatorOptions, MemoryQueue, MentionQueue, PgStoreWriter, StoreWriter,
};
use trustwatch_scoring::ScoringEngine;

#[derive(Debug, Parser)]
#[command(name = "trustwatch")]
#[command(about = "Campaign mention trust scoring and alerting pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process a batch of mentions through the full pipeline.
    Run {
        /// JSONL file with one raw mention per line.
        #[arg(long, default_value = "mentions.jsonl")]
        input: PathBuf,
    },
    /// Resolve an alert.
    Resolve { alert_id: Uuid },
    /// Acknowledge an open alert.
    Ack { alert_id: Uuid },
    /// List open and acknowledged alerts.
    Alerts {
        #[arg(long)]
        brand: Option<String>,
    },
    /// Show the rolling trust aggregate for a brand.
    Brand { brand: String },
    /// One-shot expired-alert resolution pass.
    Sweep,
    /// Apply pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = trustwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { input } => run(&config, &input).await,
        Commands::Resolve { alert_id } => resolve(&config, alert_id).await,
        Commands::Ack { alert_id } => acknowledge(&config, alert_id).await,
        Commands::Alerts { brand } => list_alerts(&config, brand.as_deref()).await,
        Commands::Brand { brand } => brand_status(&config, &brand).await,
        Commands::Sweep => sweep(&config).await,
        Commands::Migrate => migrate(&config).await,
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = trustwatch_db::PoolConfig::from_app_config(config);
    let pool = trustwatch_db::connect_pool(&config.database_url, pool_config).await?;
    Ok(pool)
}

async fn run(config: &AppConfig, input: &Path) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    trustwatch_db::run_migrations(&pool).await?;

    let policy = trustwatch_core::load_policy(&config.policy_path)?;
    let queue: Arc<dyn MentionQueue> = Arc::new(MemoryQueue::from_jsonl_path(input)?);
    let store: Arc<dyn StoreWriter> =
        Arc::new(PgStoreWriter::new(pool.clone(), policy.ewma_alpha));
    let classifier = ClassifierClient::new(
        &config.classifier_url,
        ClassifierOptions::from_app_config(config),
    )?;
    let scoring = Arc::new(ScoringEngine::new(classifier, policy.clone()));

    let coordinator = Coordinator::new(
        queue,
        store,
        scoring,
        policy.clone(),
        CoordinatorOptions::from_app_config(config),
    );

    let _scheduler =
        scheduler::build_scheduler(pool.clone(), &config.sweep_schedule, policy.cooldown_secs)
            .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel::<AlertEvent>(256);

    // The notifier attachment point: for now, events land in the log.
    let notifier = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.severity {
                Severity::Critical | Severity::High => tracing::error!(
                    alert_id = %event.alert_id,
                    brand = %event.brand,
                    severity = event.severity.as_str(),
                    trust_score = event.trust_score,
                    "alert"
                ),
                Severity::Medium => tracing::warn!(
                    alert_id = %event.alert_id,
                    brand = %event.brand,
                    trust_score = event.trust_score,
                    "alert"
                ),
                Severity::Low => tracing::info!(
                    alert_id = %event.alert_id,
                    brand = %event.brand,
                    "alert"
                ),
            }
        }
    });

    let mut pipeline = tokio::spawn(coordinator.run(shutdown_rx, event_tx));
    tokio::select! {
        joined = &mut pipeline => joined??,
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(true);
            // Workers finish their in-flight records before stopping.
            pipeline.await??;
        }
    }
    notifier.await?;
    Ok(())
}

async fn resolve(config: &AppConfig, alert_id: Uuid) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match trustwatch_db::resolve_alert(&pool, alert_id, Utc::now()).await {
        Ok(()) => {
            println!("alert {alert_id} resolved");
            Ok(())
        }
        Err(DbError::Alert(AlertError::AlertNotFound(_))) => {
            anyhow::bail!("no alert with id {alert_id}")
        }
        Err(DbError::Alert(AlertError::AlertAlreadyResolved(_))) => {
            anyhow::bail!("alert {alert_id} is already resolved")
        }
        Err(err) => Err(err.into()),
    }
}

async fn acknowledge(config: &AppConfig, alert_id: Uuid) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match trustwatch_db::acknowledge_alert(&pool, alert_id).await {
        Ok(()) => {
            println!("alert {alert_id} acknowledged");
            Ok(())
        }
        Err(DbError::Alert(AlertError::AlertNotFound(_))) => {
            anyhow::bail!("no alert with id {alert_id}")
        }
        Err(DbError::Alert(AlertError::AlertAlreadyResolved(_))) => {
            anyhow::bail!("alert {alert_id} is already resolved")
        }
        Err(err) => Err(err.into()),
    }
}

async fn list_alerts(config: &AppConfig, brand: Option<&str>) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let alerts = trustwatch_db::list_open_alerts(&pool, brand).await?;
    if alerts.is_empty() {
        println!("no open alerts");
        return Ok(());
    }
    for alert in alerts {
        println!(
            "{}  {:<8}  {:<10}  {:<12}  score {:>6}  {}",
            alert.id,
            alert.severity,
            alert.state,
            alert.bias_type.as_deref().unwrap_or("-"),
            alert.trust_score,
            alert.brand,
        );
    }
    Ok(())
}

async fn brand_status(config: &AppConfig, brand: &str) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match trustwatch_db::get_brand_aggregate(&pool, brand).await {
        Ok(aggregate) => {
            println!(
                "{}: {} mentions, avg trust {}, last updated {}",
                aggregate.brand,
                aggregate.mention_count,
                aggregate.avg_trust_score,
                aggregate.last_updated,
            );
            Ok(())
        }
        Err(DbError::NotFound) => anyhow::bail!("no scored mentions for brand '{brand}'"),
        Err(err) => Err(err.into()),
    }
}

async fn sweep(config: &AppConfig) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let policy = trustwatch_core::load_policy(&config.policy_path)?;
    let now = Utc::now();
    let cutoff = now - Duration::seconds(policy.cooldown_secs);
    let resolved = trustwatch_db::resolve_expired_alerts(&pool, cutoff, now).await?;
    println!("resolved {resolved} expired alerts");
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let applied = trustwatch_db::run_migrations(&pool).await?;
    println!("applied {applied} migrations");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
