//! Fetch clients.
//!
//! - `HttpTransport` - reqwest GET with failure classification
//! - `RateLimitedClient` - pacing, retry with backoff, cache lookup/write-back
//! - `FilingsClient` - typed filings API on top of the two

pub mod filings;
pub mod http;
pub mod rate_limited;

pub use filings::FilingsClient;
pub use http::HttpTransport;
pub use rate_limited::{FetchRequest, RateLimitedClient};
