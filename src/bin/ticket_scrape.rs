//! One-shot ticket scrape: `ticket-scrape <eventId>`.

use anyhow::{Context, Result};
use dotenv::dotenv;
use logger::TelegramNotifier;
use odds_harvest::config::TicketSettings;
use odds_harvest::runtime::{build_ticket_scraper, init_tracing};
use std::env;
use ticket_scraper::save_snapshot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let event_id = env::args()
        .nth(1)
        .filter(|id| !id.trim().is_empty())
        .context("usage: ticket-scrape <eventId>")?;

    let settings = TicketSettings::from_env()?;
    let scraper = build_ticket_scraper(&settings)?;

    info!("🎫 Scraping event {} from {}", event_id, settings.base_url);
    match scraper.scrape(&event_id).await {
        Ok(outcome) => {
            let path = save_snapshot(&settings.output_dir, &event_id, &outcome.tickets)?;
            info!(
                "✅ {} tickets in {:.1}s after {} attempt(s){}",
                outcome.tickets.len(),
                outcome.elapsed.as_secs_f64(),
                outcome.attempts,
                if outcome.direct { ", direct connection" } else { "" }
            );
            info!("📁 {}", path.display());
            Ok(())
        }
        Err(e) => {
            let err = anyhow::Error::new(e);
            error!("❌ {:#}", err);
            if let Some(n) = TelegramNotifier::from_env() {
                n.notify_error(&err).await;
            }
            Err(err)
        }
    }
}
