//! OddsHarvest: row formatting
//!
//! Turns joined event records into flat per-sport rows, filters them against
//! a parameter file and writes the survivors to CSV or XLSX.

pub mod export;
pub mod filter;
pub mod odds;
pub mod row;

pub use export::{columns, to_csv, write_csv, write_xlsx};
pub use filter::{filter_rows, FieldFilter, FilterConfig, FilterConfigError};
pub use row::{columns_for, format_rows, sort_rows, BasketballRow, FieldValue, FootballRow, OutputRow};
