use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use clap::Parser;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

mod config;
mod db;
mod maintenance;
mod middleware;
mod models;
pub mod observability;
mod phone;
mod retention;
mod routes;
pub mod services;
mod smpp;
mod sms;

#[cfg(test)]
mod tests;

/// Environment variable naming the config file when `--config` is absent.
const CONFIG_ENV: &str = "SMSGATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/smsgate.toml";

/// CLI arguments for smsgate
#[derive(Parser, Debug)]
#[command(version, about = "SMS activation gateway", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to $SMSGATE_CONFIG, then config/smsgate.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP API, the SMPP listener and the SMPP client workers (default)
    Serve {
        /// Override `server.host`
        #[arg(long)]
        host: Option<std::net::IpAddr>,
        /// Override `server.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run database migrations and exit
    Migrate,
    /// Tune, prune and reindex the database
    ///
    /// Tasks run in the order setup, prune, reindex. Prune periods can be
    /// overridden with PRUNE_SMS_DAYS, PRUNE_ORPHAN_DAYS and PRUNE_SESSION_DAYS.
    Maintenance {
        /// Apply storage settings and install the prune_old_data() function
        #[arg(long)]
        setup: bool,
        /// Delete old messages, orphans and closed sessions
        #[arg(long)]
        prune: bool,
        /// Rebuild indexes
        #[arg(long)]
        reindex: bool,
    },
    /// Insert countries and services into empty catalog tables
    Seed {
        #[arg(long, default_value = "data/catalog.toml")]
        file: PathBuf,
    },
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::SmsGateConfig>,
    pub db: Option<Arc<db::DbPool>>,
    pub services: Option<services::Services>,
    /// Numbers whose reservation is in flight, shared with SMPP ingestion.
    pub pending: sms::PendingSessions,
    /// Tracks background tasks so shutdown can wait for them.
    pub task_tracker: TaskTracker,
}

impl AppState {
    pub async fn new(config: config::SmsGateConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let pending = sms::PendingSessions::new(Duration::from_secs(
            config.smpp.matching.pending_ttl_secs,
        ));

        // Initialize database and services if configured
        #[allow(unreachable_patterns)]
        let (db, services) = match &config.database {
            config::DatabaseConfig::None => (None, None),
            _ => {
                let pool = db::DbPool::from_config(&config.database).await?;
                if config.database.migrate_on_startup() {
                    pool.run_migrations().await?;
                }
                let db = Arc::new(pool);
                let services =
                    services::Services::new(db.clone(), pending.clone(), config.api.balance);
                (Some(db), Some(services))
            }
        };

        Ok(Self {
            config: Arc::new(config),
            db,
            services,
            pending,
            task_tracker: TaskTracker::new(),
        })
    }
}

pub fn build_app(config: &config::SmsGateConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        .route(
            "/stubs/handler_api.php",
            get(routes::handler_api::handler_api),
        );

    // Admin routes need the database
    if state.db.is_some() {
        app = app.nest(
            "/admin",
            routes::admin::get_admin_routes().route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::admin_auth_middleware,
            )),
        );
    }

    app.layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Migrate) => {
            run_migrate(args.config.as_deref()).await;
        }
        Some(Command::Maintenance {
            setup,
            prune,
            reindex,
        }) => {
            let tasks = maintenance::MaintenanceTasks {
                setup,
                prune,
                reindex,
            };
            run_maintenance(args.config.as_deref(), tasks).await;
        }
        Some(Command::Seed { file }) => {
            run_seed(args.config.as_deref(), &file).await;
        }
        Some(Command::Serve { host, port }) => {
            run_server(args.config.as_deref(), host, port).await;
        }
        None => {
            run_server(args.config.as_deref(), None, None).await;
        }
    }
}

/// Resolve the config file: `--config`, then `$SMSGATE_CONFIG`, then
/// `config/smsgate.toml`. Only the default location may be absent, in which
/// case built-in defaults apply.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<Option<PathBuf>, String> {
    let env_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
    if let Some(path) = explicit_path.map(str::to_string).or(env_path) {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default_path.exists().then_some(default_path))
}

/// Load configuration or exit with status 1.
fn load_config(explicit_path: Option<&str>) -> (config::SmsGateConfig, String) {
    let path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let Some(path) = path else {
        return (config::SmsGateConfig::default(), "<defaults>".to_string());
    };

    match config::SmsGateConfig::from_file(&path) {
        Ok(c) => (c, path.display().to_string()),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing_or_exit(config: &config::SmsGateConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Connect to the configured database or exit with status 1.
async fn connect_or_exit(config: &config::SmsGateConfig, command: &str) -> db::DbPool {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured. Nothing to {command}.");
        std::process::exit(1);
    }
    match db::DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_server(
    explicit_config_path: Option<&str>,
    host: Option<std::net::IpAddr>,
    port: Option<u16>,
) {
    let (mut config, config_source) = load_config(explicit_config_path);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing_or_exit(&config);

    tracing::info!(config_file = %config_source, "Starting smsgate");

    if config.auth.admin_token.is_none() {
        tracing::warn!(
            "No admin token configured. The /admin API is unauthenticated. \
             Set auth.admin_token in smsgate.toml for production deployments."
        );
    }
    if config.database.is_none() {
        tracing::warn!(
            "No database configured. Only health checks are served and SMPP is disabled."
        );
    }

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            eprintln!("Error: Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let task_tracker = state.task_tracker.clone();

    if let Some(db) = state.db.clone() {
        start_background_tasks(&config, &state, db, &cancel).await;
    }

    let app = build_app(&config, state.clone());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind HTTP listener");
            eprintln!("Error: Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    // Graceful shutdown: wait for SIGINT/SIGTERM, then wait for all background tasks
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel, task_tracker, shutdown_timeout))
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    if let Some(db) = &state.db {
        db.close().await;
    }
    tracing::info!("Shutdown complete");
}

/// SMPP listener, whitelist refresh, client workers, retention and the
/// pending-reservation purge. All stop when `cancel` fires.
async fn start_background_tasks(
    config: &config::SmsGateConfig,
    state: &AppState,
    db: Arc<db::DbPool>,
    cancel: &CancellationToken,
) {
    let tracker = &state.task_tracker;
    let handler =
        sms::InboundSmsHandler::new(db.clone(), &config.smpp.matching, state.pending.clone());

    if config.smpp.server.enabled {
        let whitelist = Arc::new(smpp::SmppWhitelist::from_config(&config.smpp.whitelist));
        if let Err(e) = whitelist.refresh(&db).await {
            tracing::warn!(error = %e, "Initial SMPP whitelist refresh failed");
        }
        if whitelist.is_open() {
            tracing::warn!("SMPP whitelist is empty, accepting connections from any address");
        }

        match smpp::bind_listeners(&config.smpp.server).await {
            Ok(listeners) => {
                let server =
                    smpp::SmppServer::new(&config.smpp.server, whitelist.clone(), handler.clone());
                tracker.spawn(server.serve(listeners, cancel.clone()));
                tracker.spawn(whitelist.run_refresh(
                    db.clone(),
                    Duration::from_secs(config.smpp.whitelist.refresh_secs),
                    cancel.clone(),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to bind SMPP listeners");
                eprintln!("Error: Failed to bind SMPP listeners: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::info!("SMPP server disabled by configuration");
    }

    if config.smpp.client.enabled {
        if let Err(e) =
            smpp::spawn_provider_workers(&db, &config.smpp.client, &handler, cancel, tracker).await
        {
            tracing::error!(error = %e, "Failed to start SMPP client workers");
        }
    } else {
        tracing::info!("SMPP client workers disabled by configuration");
    }

    tracker.spawn(retention::start_retention_worker(
        db,
        config.retention.clone(),
        cancel.clone(),
    ));

    let pending = state.pending.clone();
    let purge_interval = Duration::from_secs(config.smpp.matching.pending_ttl_secs.max(1));
    let purge_cancel = cancel.clone();
    tracker.spawn(async move {
        loop {
            tokio::select! {
                _ = purge_cancel.cancelled() => break,
                _ = tokio::time::sleep(purge_interval) => {}
            }
            let purged = pending.purge();
            if purged > 0 {
                tracing::debug!(purged, "Expired pending reservations removed");
            }
        }
    });
}

async fn shutdown_signal(cancel: CancellationToken, task_tracker: TaskTracker, timeout: Duration) {
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

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    // Stop SMPP sessions and workers, then refuse new tasks
    cancel.cancel();
    task_tracker.close();

    match tokio::time::timeout(timeout, task_tracker.wait()).await {
        Ok(()) => tracing::info!("All background tasks completed"),
        Err(_) => {
            tracing::warn!("Timeout waiting for background tasks, some may not have completed")
        }
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, config_source) = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    tracing::info!(config_file = %config_source, "Running database migrations");

    let pool = connect_or_exit(&config, "migrate").await;
    match pool.run_migrations().await {
        Ok(()) => {
            tracing::info!("Database migrations completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_maintenance(
    explicit_config_path: Option<&str>,
    tasks: maintenance::MaintenanceTasks,
) {
    if tasks.is_empty() {
        use clap::CommandFactory;
        let mut cmd = Args::command();
        if let Some(sub) = cmd.find_subcommand_mut("maintenance") {
            let _ = sub.print_help();
        }
        std::process::exit(0);
    }

    let (config, config_source) = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    tracing::info!(config_file = %config_source, ?tasks, "Running maintenance");

    let pool = connect_or_exit(&config, "maintain").await;
    let result = maintenance::run(&pool, &config.retention, tasks).await;
    pool.close().await;

    match result {
        Ok(report) => {
            if report.setup {
                println!("setup: done");
            }
            if let Some(pruned) = report.pruned {
                let mode = if pruned.dry_run { " (dry run)" } else { "" };
                println!(
                    "prune{mode}: sms_messages={} orphan_sms={} closed_sessions={} total={}",
                    pruned.sms_messages,
                    pruned.orphan_sms,
                    pruned.closed_sessions,
                    pruned.total()
                );
            }
            if report.reindexed {
                println!("reindex: done");
            }
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "Maintenance failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_seed(explicit_config_path: Option<&str>, file: &std::path::Path) {
    let (config, config_source) = load_config(explicit_config_path);
    init_tracing_or_exit(&config);

    tracing::info!(config_file = %config_source, seed_file = %file.display(), "Seeding catalog");

    let seed = match services::CatalogSeed::from_file(file) {
        Ok(seed) => seed,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = connect_or_exit(&config, "seed").await;
    if let Err(e) = pool.run_migrations().await {
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }
    let catalog = services::CatalogService::new(Arc::new(pool));
    match catalog.seed(seed).await {
        Ok(summary) => {
            println!(
                "countries={} services={} skipped_services={}",
                summary.countries, summary.services, summary.skipped_services
            );
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "Seeding failed");
            eprintln!("Error: Seeding failed: {}", e);
            std::process::exit(1);
        }
    }
}
