use anyhow::{Context, Result};
use dotenv::dotenv;
use odds_harvest::config::TicketSettings;
use odds_harvest::runtime::{build_ticket_scraper, init_tracing};
use odds_harvest::ticket_api::{start_http_server, ApiState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let settings = TicketSettings::from_env()?;
    let bind: SocketAddr = settings
        .api_bind
        .parse()
        .with_context(|| format!("TICKET_API_BIND `{}` is not an address", settings.api_bind))?;
    let scraper = build_ticket_scraper(&settings)?;

    info!("📁 Snapshots go to {}", settings.output_dir.display());
    let state = Arc::new(ApiState { scraper, output_dir: settings.output_dir });

    tokio::select! {
        res = start_http_server(state, bind) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutting down ticket API");
            Ok(())
        }
    }
}
