//! OddsHarvest: Sofascore feed
//!
//! Endpoint catalogue, lenient response types and the per-date event
//! aggregator that joins every per-event resource into one record.

pub mod aggregator;
pub mod endpoints;
pub mod types;

pub use aggregator::EventAggregator;
pub use endpoints::{Endpoints, StandingsScope, API_BASE};
pub use types::*;
