use anyhow::{Context, Result};
use dotenv::dotenv;
use identity_pool::FingerprintPool;
use logger::TelegramNotifier;
use odds_harvest::config::{date_range, resolve_range, HarvestSettings, ParameterFile, ProxySettings, LOG_DIR};
use odds_harvest::harvest::{export, Harvester};
use odds_harvest::runtime::{build_proxy_pool, init_tracing};
use rate_client::{ClientSession, SessionConfig};
use sofascore_feed::EventAggregator;
use std::env;
use std::fs::File;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("=== OddsHarvest: date-range harvest ===");
    info!("Logs: ./{}/", LOG_DIR);

    // Single instance lock
    let lock_file_path = env::temp_dir().join("odds_harvest.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another harvest is already running! Exiting.");
            return Ok(());
        }
    };

    let notifier = TelegramNotifier::from_env();
    if notifier.is_none() {
        info!("Telegram not configured, failures are only logged");
    }

    if let Err(e) = run(notifier.clone()).await {
        error!("💥 Harvest aborted: {:#}", e);
        if let Some(n) = &notifier {
            n.notify_error(&e).await;
        }
        return Err(e);
    }
    Ok(())
}

async fn run(notifier: Option<TelegramNotifier>) -> Result<()> {
    let mut settings = HarvestSettings::from_env().context("reading harvest settings")?;
    let args: Vec<String> = env::args().skip(1).collect();
    settings.apply_args(&args).context("parsing arguments")?;

    let params = ParameterFile::load(settings.filter_path.as_deref(), settings.sport)?;
    let (from, to) = resolve_range(&settings, &params)?;
    let dates = date_range(from, to);
    info!(sport = %settings.sport, "📆 Harvesting {} dates, {} to {}", dates.len(), from, to);

    let proxies = ProxySettings::from_env()?.with_fallback(params.proxy());
    let session = ClientSession::new(
        build_proxy_pool(&proxies),
        Arc::new(FingerprintPool::generate(FingerprintPool::DEFAULT_SIZE)),
        SessionConfig::default(),
    )
    .with_audit_log(LOG_DIR);
    let aggregator = EventAggregator::new(Arc::new(session)).with_audit_log(LOG_DIR);

    let harvester = Harvester::new(aggregator, settings.sport, params.output_params)
        .with_date_timeout(settings.date_timeout)
        .with_notifier(notifier)
        .with_audit_log(LOG_DIR);

    let report = harvester.run(&dates).await;
    info!(
        "🏁 {} of {} dates scanned, {} rows kept, {} failed",
        report.scanned,
        dates.len(),
        report.rows.len(),
        report.failed.len()
    );
    for (date, reason) in &report.failed {
        warn!("  {}: {}", date, reason);
    }

    export(&report.rows, &settings.output_dir, settings.sport, from, to)?;
    Ok(())
}
