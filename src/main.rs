//! HB Fetcher CLI application
//!
//! Command-line interface for mirroring a Humble Bundle library to disk.
//! Verifies existing files against cached MD5 sidecars and resumes partial
//! downloads.

use std::process;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use hb_fetcher::app::{SignalHandler, create_shutdown_channel};
use hb_fetcher::cli::{
    Cli, Commands, DownloadArgs, handle_auth, handle_download, handle_list, handle_verify,
};
use hb_fetcher::config::AppConfig;
use hb_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        error!("{} error: {}", e.category(), e);
        eprintln!("Error: {}", e);
        if e.is_recoverable() {
            eprintln!("This looks transient; running the command again may succeed.");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli).await;

    info!("HB Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let (trigger, shutdown) = create_shutdown_channel();
    let _signals = SignalHandler::new(trigger).setup();

    match cli.command.clone() {
        None => {
            info!("No command given, downloading according to configuration");
            handle_download(&cli.global, DownloadArgs::default(), shutdown).await
        }
        Some(Commands::Download(args)) => handle_download(&cli.global, args, shutdown).await,
        Some(Commands::List(args)) => handle_list(&cli.global, args).await,
        Some(Commands::Verify(args)) => handle_verify(&cli.global, args, shutdown).await,
        Some(Commands::Auth(args)) => handle_auth(&cli.global, args).await,
    }
}

/// Initialize logging from the verbosity flags, else the config file level
async fn init_logging(cli: &Cli) {
    let level = match cli.log_level() {
        Some(level) => level.to_string().to_lowercase(),
        None => AppConfig::load(cli.global.config.clone())
            .await
            .map(|config| config.logging.level)
            .unwrap_or_else(|_| hb_fetcher::constants::logging::DEFAULT_LOG_LEVEL.to_string()),
    };

    let mut filter = EnvFilter::from_default_env();
    let directive = format!("hb_fetcher={}", level);
    let invalid_level = match directive.parse() {
        Ok(directive) => {
            filter = filter.add_directive(directive);
            false
        }
        Err(_) => true,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if invalid_level {
        warn!("Ignoring unknown log level '{}'", level);
    }
    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    }
}
