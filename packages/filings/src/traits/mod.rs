//! Core trait abstractions for the filings pipeline.

pub mod cache;
pub mod checkpoint;
pub mod extractor;
pub mod reviewer;
pub mod transport;
pub mod worker;
