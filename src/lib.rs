//! OddsHarvest: shared glue for the `harvest`, `ticket-scrape` and
//! `ticket-api` binaries.

pub mod config;
pub mod harvest;
pub mod runtime;
pub mod ticket_api;
