//! Domain types for the filings pipeline.

pub mod checkpoint;
pub mod cik;
pub mod config;
pub mod filing;
pub mod record;
