//! Origin access: HTTP fetch, payload extraction and resolve errors

pub mod client;
pub mod errors;
pub mod extract;

pub use client::{FetchResponse, Fetcher, HttpFetcher};
pub use errors::{FetchError, ResolveError};
pub use extract::{Extractor, SharedDataExtractor};
