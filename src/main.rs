use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use acquisition_server::acquisition::{
    AcquisitionStore, BookExecutor, DedupFilter, Executors, ExternalToolchain, QueueService,
    RetryPolicy, Scheduler, SongExecutor, SqliteAcquisitionStore,
};
use acquisition_server::catalog::{BookMirrorAdapter, CatalogAdapter, MusicBrainzAdapter};
use acquisition_server::config;
use acquisition_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, env = "ACQUISITION_CONFIG", value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding acquisition.db. Can also be specified in config file.
    #[clap(long, env = "ACQUISITION_DB_DIR", value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, env = "ACQUISITION_PORT", default_value_t = 3002)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, env = "ACQUISITION_LOGGING_LEVEL", default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Base URL of the book mirror.
    #[clap(long, env = "ACQUISITION_MIRROR_BASE_URL")]
    pub mirror_base_url: Option<String>,

    /// Where downloaded books are stored. Defaults to <db_dir>/books.
    #[clap(long, env = "ACQUISITION_BOOK_DIR", value_parser = parse_path)]
    pub book_dir: Option<PathBuf>,

    /// Where downloaded songs are stored. Defaults to <db_dir>/songs.
    #[clap(long, env = "ACQUISITION_SONG_DIR", value_parser = parse_path)]
    pub song_dir: Option<PathBuf>,

    /// Seconds between scheduler passes.
    #[clap(long, env = "ACQUISITION_POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,

    /// Upper bound on downloads running at once.
    #[clap(long, env = "ACQUISITION_MAX_CONCURRENT_DOWNLOADS")]
    pub max_concurrent_downloads: Option<usize>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            logging_level: args.logging_level.clone(),
            mirror_base_url: args.mirror_base_url.clone(),
            book_dir: args.book_dir.clone(),
            song_dir: args.song_dir.clone(),
            poll_interval_secs: args.poll_interval_secs,
            max_concurrent_downloads: args.max_concurrent_downloads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  mirror_base_url: {}", app_config.mirror_base_url);
    info!("  book_dir: {:?}", app_config.book_dir);
    info!("  song_dir: {:?}", app_config.song_dir);

    for dir in [&app_config.book_dir, &app_config.song_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create library directory {:?}", dir))?;
    }

    info!(
        "Opening acquisition database at {:?}...",
        app_config.acquisition_db_path()
    );
    let store: Arc<dyn AcquisitionStore> =
        Arc::new(SqliteAcquisitionStore::new(app_config.acquisition_db_path())?);

    let retry_policy = RetryPolicy::new(&app_config.acquisition);
    let request_timeout = app_config.acquisition.request_timeout();

    let book_catalog: Arc<dyn CatalogAdapter> = Arc::new(BookMirrorAdapter::new(
        app_config.mirror_base_url.clone(),
        request_timeout,
        retry_policy.clone(),
    )?);
    let song_catalog: Arc<dyn CatalogAdapter> = Arc::new(MusicBrainzAdapter::new(
        app_config.musicbrainz.clone(),
        request_timeout,
        retry_policy.clone(),
    )?);

    let executors = Executors {
        book: Arc::new(BookExecutor::new(
            app_config.mirror_base_url.clone(),
            app_config.book_dir.clone(),
            request_timeout,
            retry_policy.clone(),
        )?),
        song: Arc::new(SongExecutor::new(
            Arc::new(ExternalToolchain::new(&app_config.tools)),
            app_config.song_dir.clone(),
            request_timeout,
            retry_policy,
        )?),
    };

    let queue = Arc::new(QueueService::new(store.clone()));
    let dedup = Arc::new(DedupFilter::new(store));
    let scheduler = Arc::new(Scheduler::new(
        queue.clone(),
        executors,
        &app_config.acquisition,
    ));

    let shutdown_token = CancellationToken::new();

    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let token = shutdown_token.child_token();
        tokio::spawn(async move { scheduler.run(token).await })
    };

    let state = ServerState::new(
        ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
        },
        queue,
        dedup,
        book_catalog,
        song_catalog,
        scheduler.active_downloads(),
    );

    info!("Ready to serve at port {}!", app_config.port);

    let server_token = shutdown_token.clone();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, initiating graceful shutdown");
        signal_token.cancel();
    });

    let result = run_server(state, server_token).await;
    if let Err(e) = &result {
        error!("HTTP server stopped: {:#}", e);
    }
    shutdown_token.cancel();

    info!("Waiting for the current scheduler pass to finish...");
    if let Err(e) = scheduler_handle.await {
        error!("Scheduler task failed: {}", e);
    }

    result
}
