//! Command handlers for HB Fetcher CLI
//!
//! Each handler loads the configuration, applies the command-line overrides,
//! wires the engine components together and reports the outcome.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::{
    Catalog, ChecksumStore, DownloadPlanner, HttpHandler, HumbleCatalog, IntegrityChecker,
    ItemOutcome, Order, PlatformSelection, ProgressBus, ProgressEvent, ResumableFetcher,
    RunSummary, ShutdownSignal,
};
use crate::app::events::EventKind;
use crate::auth::{resolve_session_cookie, setup_session_cookie, show_auth_status};
use crate::cli::args::{key_filter, AuthAction, AuthArgs, DownloadArgs, GlobalArgs, ListArgs, VerifyArgs};
use crate::cli::progress::{ConsoleReporter, ProgressConfig};
use crate::config::{AppConfig, RuntimeConfig};
use crate::errors::{AppError, Result};

/// Handle the download command (also the default action)
pub async fn handle_download(
    global: &GlobalArgs,
    args: DownloadArgs,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let platforms = args.item_type.as_ref().map(|item_type| item_type.platforms());
    let config = load_config(global, platforms).await?;
    config.validate()?;

    let mut runtime = config.to_runtime_config();
    runtime.checksum = runtime
        .checksum
        .with_ignore_checksum(args.ignore_checksum || runtime.checksum.ignore_checksum)
        .with_force_recompute(args.force_recompute || runtime.checksum.force_recompute);
    if args.no_resume {
        runtime.transfer.resume = false;
    }
    runtime.planner.dry_run = args.dry_run;
    runtime.planner.order_keys = key_filter(&args.keys);

    info!(
        "Library at {} (platforms: {})",
        runtime.planner.download_location.display(),
        runtime.planner.platforms.enabled_platforms().join(", ")
    );

    let mut bus = ProgressBus::new();
    if !global.quiet {
        ConsoleReporter::new(ProgressConfig::default())?.attach(&mut bus);
    }

    let cookie = session_cookie(global, &config)?;
    let summary = run_planner(&cookie, runtime, bus, shutdown).await?;
    print_summary(&summary, args.dry_run);

    if summary.cancelled > 0 {
        return Err(AppError::generic(format!(
            "Run cancelled with {} items left",
            summary.cancelled
        )));
    }
    if !summary.is_successful() {
        return Err(AppError::generic(format!(
            "{} items failed, {} invalid, {} orders unreadable",
            summary.failed, summary.invalid, summary.orders_skipped
        )));
    }
    Ok(())
}

/// Handle the verify command: classify every file and print the verdicts
pub async fn handle_verify(
    global: &GlobalArgs,
    args: VerifyArgs,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let config = load_config(global, None).await?;
    config.validate()?;

    let mut runtime = config.to_runtime_config();
    runtime.checksum = runtime
        .checksum
        .with_force_recompute(args.force_recompute || runtime.checksum.force_recompute);
    runtime.planner.dry_run = true;
    runtime.planner.order_keys = key_filter(&args.keys);

    let mut bus = ProgressBus::new();
    if !global.quiet {
        ConsoleReporter::new(ProgressConfig::default())?.attach(&mut bus);
    }
    bus.subscribe(EventKind::Classified, |event| {
        if let ProgressEvent::Classified {
            path,
            summary,
            needs_fetch,
        } = event
        {
            let status = if *needs_fetch { "FETCH" } else { "OK" };
            println!("{}\t{}\t{}", status, path.display(), summary);
        }
    });

    let cookie = session_cookie(global, &config)?;
    let summary = run_planner(&cookie, runtime, bus, shutdown).await?;
    print_summary(&summary, true);

    if summary.failed > 0 || summary.orders_skipped > 0 {
        return Err(AppError::generic(format!(
            "{} files could not be checked, {} orders unreadable",
            summary.failed, summary.orders_skipped
        )));
    }
    Ok(())
}

/// Handle the list command: print the library as a tab-separated tree
pub async fn handle_list(global: &GlobalArgs, args: ListArgs) -> Result<()> {
    let platforms = args.item_type.as_ref().map(|item_type| item_type.platforms());
    let config = load_config(global, platforms).await?;
    let runtime = config.to_runtime_config();
    let cookie = session_cookie(global, &config)?;

    let catalog = HumbleCatalog::new(&runtime.client, &runtime.transfer, &cookie)?;
    let keys = match key_filter(&args.keys) {
        Some(keys) => keys,
        None => catalog.order_keys().await?,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for key in keys {
        let order = match catalog.order(&key).await {
            Ok(order) => order,
            Err(e) => {
                warn!("Skipping order {}: {}", key, e);
                continue;
            }
        };
        for line in format_order_listing(&order, &runtime.planner.platforms, args.print_url) {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

/// Handle authentication commands
pub async fn handle_auth(global: &GlobalArgs, args: AuthArgs) -> Result<()> {
    let config = load_config(global, None).await?;
    let runtime = config.to_runtime_config();

    match args.action {
        AuthAction::Setup => setup_session_cookie(&runtime.client, &runtime.transfer).await?,
        AuthAction::Status => {
            show_auth_status(
                global.cookie.as_deref(),
                config.session_cookie.as_deref(),
                &runtime.client,
                &runtime.transfer,
            )
            .await?
        }
    }
    Ok(())
}

/// Load the config file and apply global and per-command overrides
async fn load_config(global: &GlobalArgs, platforms: Option<Vec<String>>) -> Result<AppConfig> {
    let mut config = AppConfig::load(global.config.clone()).await?;
    let mut overrides = global.overrides();
    overrides.platforms = platforms;
    config.apply_overrides(&overrides);
    debug!("Effective configuration: {:?}", redacted(&config));
    Ok(config)
}

fn redacted(config: &AppConfig) -> AppConfig {
    AppConfig {
        session_cookie: config.session_cookie.as_ref().map(|_| "<redacted>".to_string()),
        ..config.clone()
    }
}

fn session_cookie(global: &GlobalArgs, config: &AppConfig) -> Result<String> {
    let (cookie, source) =
        resolve_session_cookie(global.cookie.as_deref(), config.session_cookie.as_deref())?;
    debug!("Session cookie taken from {}", source);
    Ok(cookie)
}

/// Wire the engine components and run the planner
async fn run_planner(
    cookie: &str,
    runtime: RuntimeConfig,
    bus: ProgressBus,
    shutdown: ShutdownSignal,
) -> Result<RunSummary> {
    let bus = Arc::new(bus);
    let catalog = HumbleCatalog::new(&runtime.client, &runtime.transfer, cookie)?;

    let store = Arc::new(ChecksumStore::new(runtime.checksum, Arc::clone(&bus)));
    let http = HttpHandler::new(
        runtime.client.build_http_client()?,
        runtime.transfer.max_attempts,
        runtime.transfer.retry_base_delay,
    );
    let fetcher = ResumableFetcher::new(http, Arc::clone(&store), Arc::clone(&bus), runtime.transfer)
        .with_shutdown(shutdown.clone());

    let planner = DownloadPlanner::new(
        catalog,
        IntegrityChecker::new(store),
        fetcher,
        bus,
        runtime.planner,
    )
    .with_shutdown(shutdown);

    Ok(planner.run().await?)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!(
            "{} files need fetching, {} already downloaded",
            summary.pending, summary.satisfied
        );
    } else {
        println!("{}", summary);
    }

    for report in summary.reports_where(|outcome| {
        matches!(outcome, ItemOutcome::Failed { .. } | ItemOutcome::Invalid { .. })
    }) {
        println!("  {} [{}]: {}", report.label, report.order_key, report.outcome);
    }
}

/// Tab-separated tree of one order: order, subproduct and download lines
///
/// Only downloads on enabled platforms are listed; an order or subproduct
/// without any is omitted entirely.
pub fn format_order_listing(order: &Order, platforms: &PlatformSelection, print_url: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut order_printed = false;

    for subproduct in &order.subproducts {
        let mut subproduct_printed = false;
        for download in &subproduct.downloads {
            let platform = download.platform.as_deref().unwrap_or_default();
            if !platforms.is_enabled(platform) {
                continue;
            }
            if !order_printed {
                order_printed = true;
                lines.push(format!(
                    "{}\t({})\t{}\t{}",
                    order.display_name(),
                    order.gamekey,
                    order.product.category.as_deref().unwrap_or_default(),
                    order.product.machine_name.as_deref().unwrap_or_default()
                ));
            }
            if !subproduct_printed {
                subproduct_printed = true;
                lines.push(format!(
                    "\t{}",
                    subproduct.human_name.as_deref().unwrap_or_default()
                ));
            }
            for file in &download.download_struct {
                let mut line = format!(
                    "\t\t{}\t{}\t{}\t{}",
                    platform,
                    download.machine_name.as_deref().unwrap_or_default(),
                    file.name.as_deref().unwrap_or_default(),
                    file.human_size.as_deref().unwrap_or_default()
                );
                if print_url {
                    let url = file
                        .url
                        .as_ref()
                        .and_then(|urls| urls.web.as_deref())
                        .unwrap_or_default();
                    line.push('\t');
                    line.push_str(url);
                }
                lines.push(line);
            }
        }
    }

    lines
}
