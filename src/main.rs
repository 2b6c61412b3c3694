use std::{path::PathBuf, sync::Arc, time::Duration};

use campaign_lifecycle::{
    config::AppConfig,
    db::DbPool,
    observability::{self, metrics},
    retention::TrashRetentionJob,
    services::CampaignLifecycleService,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Config file used when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "campaign-lifecycle.toml";

/// CLI arguments for the campaign lifecycle service
#[derive(Parser, Debug)]
#[command(version, about = "Campaign trash lifecycle and retention", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./campaign-lifecycle.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the trash retention job until interrupted (default)
    Serve,
    /// Run a single retention cycle and exit
    ///
    /// Exits non-zero if the cycle failed, timed out, or was interrupted.
    PurgeOnce {
        /// Log what would be purged without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Print Prometheus metrics after the cycle
        #[arg(long)]
        print_metrics: bool,
    },
    /// Run database migrations and exit
    Migrate,
    /// Inspect the trash
    Trash {
        #[command(subcommand)]
        command: TrashCommand,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum TrashCommand {
    /// List a user's trashed campaigns, most recently deleted first
    List {
        /// Owner of the campaigns
        user_id: Uuid,
        #[arg(long, default_value = "0")]
        offset: i64,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::Migrate) => {
            run_migrate(args.config.as_deref()).await;
        }
        Some(Command::PurgeOnce {
            dry_run,
            print_metrics,
        }) => {
            run_purge_once(args.config.as_deref(), dry_run, print_metrics).await;
        }
        Some(Command::Trash {
            command:
                TrashCommand::List {
                    user_id,
                    offset,
                    limit,
                },
        }) => {
            run_trash_list(args.config.as_deref(), user_id, offset, limit).await;
        }
        Some(Command::Serve) | None => {
            run_server(args.config.as_deref()).await;
        }
    }
}

/// Load the config file or exit.
///
/// A missing default config file yields the built-in defaults; a missing
/// explicit path is an error.
fn load_config(explicit_path: Option<&str>) -> (AppConfig, Option<PathBuf>) {
    let path = PathBuf::from(explicit_path.unwrap_or(DEFAULT_CONFIG_FILE));

    if explicit_path.is_none() && !path.exists() {
        return (AppConfig::default(), None);
    }

    match AppConfig::from_file(&path) {
        Ok(config) => (config, Some(path)),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_observability(config: &AppConfig) -> observability::TracingGuard {
    let guard = match observability::init_tracing(&config.observability) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    guard
}

/// Connect to the configured database, check it answers, and run
/// migrations if enabled.
async fn connect(config: &AppConfig) -> Arc<DbPool> {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Add a [database] section.");
        std::process::exit(1);
    }

    let pool = match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pool.health_check().await {
        tracing::error!(error = %e, "Database health check failed");
        eprintln!("Error: Database health check failed: {}", e);
        std::process::exit(1);
    }

    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }

    Arc::new(pool)
}

async fn run_server(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);
    let _tracing_guard = init_observability(&config);

    if let Some(path) = &config_path {
        tracing::info!(config_file = %path.display(), "Loaded configuration");
    }

    let db = connect(&config).await;
    let service = CampaignLifecycleService::new(db);
    let job = Arc::new(TrashRetentionJob::new(service, &config.retention));

    let cancel = CancellationToken::new();
    let Some(handle) = job.start(cancel.clone()) else {
        tracing::warn!("Nothing to run: enable [retention] to start the purge job");
        return;
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, waiting for retention job to finish...");
    cancel.cancel();
    job.stop();

    match tokio::time::timeout(Duration::from_secs(30), handle).await {
        Ok(Ok(())) => tracing::info!("Retention job stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Retention job panicked"),
        Err(_) => tracing::warn!("Timeout waiting for retention job to stop"),
    }

    tracing::info!("Shutdown complete");
}

async fn run_purge_once(explicit_config_path: Option<&str>, dry_run: bool, print_metrics: bool) {
    let (mut config, _) = load_config(explicit_config_path);
    let _tracing_guard = init_observability(&config);

    config.retention.dry_run |= dry_run;
    let db = connect(&config).await;
    let job = TrashRetentionJob::new(CampaignLifecycleService::new(db), &config.retention);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Interrupted, finishing current campaign");
        interrupt.cancel();
    });

    let result = job.run_once(&cancel).await;

    if print_metrics {
        match metrics::render_metrics() {
            Some(rendered) => println!("{}", rendered),
            None => eprintln!("Metrics are not enabled in this build or configuration"),
        }
    }

    match result {
        Ok(report) => {
            println!(
                "cutoff={} candidates={} purged={} skipped={} failed={} would_purge={} duration_ms={}",
                report.cutoff.to_rfc3339(),
                report.candidates,
                report.purged,
                report.skipped,
                report.failed,
                report.would_purge,
                report.duration.as_millis()
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Retention cycle failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_trash_list(explicit_config_path: Option<&str>, user_id: Uuid, offset: i64, limit: i64) {
    let (config, _) = load_config(explicit_config_path);
    let _tracing_guard = init_observability(&config);

    let service = CampaignLifecycleService::new(connect(&config).await);
    let page = match service.list_trashed(user_id, offset, limit).await {
        Ok(page) => page,
        Err(e) => {
            eprintln!("Error: Failed to list trash: {}", e);
            std::process::exit(1);
        }
    };

    for campaign in &page.items {
        println!(
            "{}\t{}\t{}\t{}",
            campaign.id,
            campaign
                .deleted_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            campaign.version,
            campaign.name
        );
    }
    eprintln!("{} of {} trashed campaign(s)", page.items.len(), page.total);
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);
    let _tracing_guard = init_observability(&config);

    tracing::info!(
        config_file = ?config_path.as_ref().map(|p| p.display().to_string()),
        "Running database migrations"
    );

    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to migrate.");
        std::process::exit(1);
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => match pool.run_migrations().await {
            Ok(()) => {
                tracing::info!("Database migrations completed successfully");
            }
            Err(e) => {
                tracing::error!(error = %e, "Database migrations failed");
                eprintln!("Error: Database migrations failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

/// Export the config JSON schema to a file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match AppConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error: Failed to render schema: {}", e);
            std::process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &content) {
                eprintln!("Error: Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Config JSON schema written to {}", path);
        }
        None => println!("{}", content),
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
