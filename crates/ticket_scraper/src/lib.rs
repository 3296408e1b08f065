//! OddsHarvest: ticket scraper
//!
//! Drives a real browser to a marketplace event page, switches off the
//! "recommended" listing filter, reloads the page as `view-source:` and pulls
//! the embedded `{grid:{items}}` payload out of the source table.

pub mod behavior;
pub mod browser;
pub mod chrome;
pub mod extract;
pub mod filters;
pub mod pipeline;
pub mod selectors;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use behavior::{HumanBehavior, Intensity};
pub use browser::{BrowserError, BrowserLauncher, BrowserPage, LaunchConfig, LoadCondition, NavigationStrategy};
pub use chrome::ChromeLauncher;
pub use extract::{extract_tickets, ExtractionError, TicketRow};
pub use filters::{FilterReport, ToggleOutcome};
pub use pipeline::{AttemptError, ScrapeOutcome, ScraperConfig, TicketScrapeError, TicketScraper, DEFAULT_BASE_URL};
pub use selectors::{Probe, SelectorSet};
pub use snapshot::save_snapshot;
