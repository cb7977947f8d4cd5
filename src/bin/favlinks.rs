use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use favlinks::db::{self, services::{FavouriteFilter, FavouriteService}};
use favlinks::server::config::ServerConfig;
use favlinks::server::jobs::{LinkJob, LinkMaintenanceScheduler, PURGE_INTERVAL, REFRESH_INTERVAL};
use favlinks::services::auth_service;
use favlinks::services::link_probe::{HttpLinkProber, LinkProber};
use favlinks::web::{AppState, create_axum_router};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Re-probe every cached link once
    RefreshLinks,
    /// Delete cached links currently marked invalid
    PurgeInvalidLinks,
    /// Keep running and trigger the refresh hourly and the purge daily
    Schedule,
    /// Search favourites of every user
    Search {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Create the configured admin account if it does not exist
    InitAdmin,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "favlinks.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn build_prober(config: &ServerConfig) -> Result<Arc<dyn LinkProber>, BoxError> {
    let prober: Arc<dyn LinkProber> = Arc::new(HttpLinkProber::new(&config.probe_config())?);
    Ok(prober)
}

async fn serve(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Result<(), BoxError> {
    let prober = build_prober(&config)?;
    let app_state = Arc::new(AppState {
        db_pool,
        prober,
        config: config.clone(),
    });
    let app = create_axum_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "HTTP server listening.");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal.");
            }
            info!("Shutdown signal received.");
        })
        .await?;
    Ok(())
}

async fn search(
    db_pool: &DatabaseConnection,
    url: Option<String>,
    title: Option<String>,
    category: Option<String>,
    tag: Option<String>,
) -> Result<(), BoxError> {
    let filter = FavouriteFilter {
        url,
        title,
        category_name: category,
        tag_name: tag,
        ..Default::default()
    };
    let favourites = FavouriteService::search_favourites(db_pool, &filter).await?;
    for favourite in &favourites {
        println!("- URL: {}, Title: {}", favourite.url, favourite.title);
    }
    println!("Total results: {}", favourites.len());
    Ok(())
}

async fn init_admin(db_pool: &DatabaseConnection, config: &ServerConfig) -> Result<(), BoxError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Err("ADMIN_USERNAME and ADMIN_PASSWORD must be set".into());
    };
    if auth_service::ensure_admin(db_pool, username, password).await? {
        println!("Admin account '{username}' created.");
    } else {
        println!("Admin account '{username}' already exists.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config = Arc::new(ServerConfig::load(args.config.as_deref())?);
    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting favlinks.");

    let db_pool = db::connect(&config.database_url).await?;
    db::schema::ensure_schema(&db_pool).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db_pool, config).await?,
        Command::RefreshLinks => {
            let prober = build_prober(&config)?;
            let report = LinkJob::Refresh.run(&db_pool, prober.as_ref()).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::PurgeInvalidLinks => {
            let prober = build_prober(&config)?;
            let report = LinkJob::Purge.run(&db_pool, prober.as_ref()).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Schedule => {
            let prober = build_prober(&config)?;
            let scheduler = Arc::new(LinkMaintenanceScheduler::new(db_pool, prober));
            tokio::select! {
                _ = scheduler.run_periodic_tasks(REFRESH_INTERVAL, PURGE_INTERVAL) => {}
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received."),
            }
        }
        Command::Search { url, title, category, tag } => {
            search(&db_pool, url, title, category, tag).await?
        }
        Command::InitAdmin => init_admin(&db_pool, &config).await?,
    }
    Ok(())
}
