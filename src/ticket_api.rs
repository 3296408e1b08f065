//! Small HTTP front for the ticket scraper: `/health`, `/scrape`, `/info`.

use anyhow::{Context, Result};
use logger::{error_payload, now_iso};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use ticket_scraper::{save_snapshot, BrowserLauncher, ChromeLauncher, TicketScraper};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

pub struct ApiState<L: BrowserLauncher = ChromeLauncher> {
    pub scraper: TicketScraper<L>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn status_line(&self) -> &'static str {
        match self.status {
            200 => "HTTP/1.1 200 OK",
            400 => "HTTP/1.1 400 Bad Request",
            404 => "HTTP/1.1 404 Not Found",
            _ => "HTTP/1.1 500 Internal Server Error",
        }
    }
}

/// First non-empty value of `key` in the query string of `target`.
pub fn query_param(target: &str, key: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, v)| k == key && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
}

pub async fn route<L: BrowserLauncher>(state: &ApiState<L>, method: &str, target: &str) -> ApiResponse {
    let path = target.split('?').next().unwrap_or_default();
    match (method, path) {
        ("GET", "/health") => ApiResponse::new(
            200,
            json!({ "status": "OK", "message": "Ticket scraper API is running", "timestamp": now_iso() }),
        ),
        ("GET", "/info") => match query_param(target, "eventId") {
            Some(id) => ApiResponse::new(
                200,
                json!({
                    "eventId": id,
                    "message": "Use /scrape to get full ticket data",
                    "scrapeUrl": format!("/scrape?eventId={id}"),
                    "timestamp": now_iso(),
                }),
            ),
            None => missing_event_id("/info"),
        },
        ("GET", "/scrape") => match query_param(target, "eventId") {
            Some(id) => scrape(state, &id).await,
            None => missing_event_id("/scrape"),
        },
        _ => ApiResponse::new(404, json!({ "success": false, "error": format!("No route for {method} {path}") })),
    }
}

fn missing_event_id(path: &str) -> ApiResponse {
    ApiResponse::new(
        400,
        json!({
            "success": false,
            "error": format!("Missing eventId parameter. Usage: {path}?eventId=YOUR_EVENT_ID"),
            "example": format!("{path}?eventId=157794939"),
        }),
    )
}

async fn scrape<L: BrowserLauncher>(state: &ApiState<L>, event_id: &str) -> ApiResponse {
    info!("🎫 API scrape request for event {}", event_id);
    let started = Instant::now();

    let result: Result<_> = async {
        let outcome = state.scraper.scrape(event_id).await?;
        let path = save_snapshot(&state.output_dir, event_id, &outcome.tickets)?;
        Ok((outcome, path))
    }
    .await;

    match result {
        Ok((outcome, path)) => {
            let secs = started.elapsed().as_secs_f64().round() as u64;
            info!("✅ Event {}: {} tickets in {}s", event_id, outcome.tickets.len(), secs);
            ApiResponse::new(
                200,
                json!({
                    "success": true,
                    "eventId": event_id,
                    "ticketCount": outcome.tickets.len(),
                    "timeTaken": secs,
                    "timestamp": now_iso(),
                    "filePath": path.display().to_string(),
                    "data": outcome.tickets,
                }),
            )
        }
        Err(e) => {
            error!("❌ API scrape for event {} failed: {:#}", event_id, e);
            ApiResponse::new(
                500,
                json!({
                    "success": false,
                    "error": format!("Scraping failed: {e}"),
                    "eventId": event_id,
                    "timestamp": now_iso(),
                    "details": error_payload(&e),
                }),
            )
        }
    }
}

async fn handle_http_connection<L: BrowserLauncher>(mut stream: TcpStream, state: Arc<ApiState<L>>) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("");

    let response = route(&state, method, target).await;
    let body = serde_json::to_string_pretty(&response.body).unwrap_or_else(|_| "{}".to_string());
    let resp = format!(
        "{}\r\nContent-Type: application/json; charset=utf-8\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status_line(),
        body.as_bytes().len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.context("http write")?;
    Ok(())
}

pub async fn serve<L: BrowserLauncher + 'static>(listener: TcpListener, state: Arc<ApiState<L>>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

pub async fn start_http_server<L: BrowserLauncher + 'static>(state: Arc<ApiState<L>>, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    info!("🚀 Ticket API listening on http://{} (GET /health, /scrape?eventId=, /info?eventId=)", bind);
    serve(listener, state).await
}
