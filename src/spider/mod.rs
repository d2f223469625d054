//! Fetching side of the pipeline: HTTP access, policies and the ingest loop.

pub mod http_client;
pub mod ingestor;
pub mod policy;

pub use http_client::{FetchError, FetchResponse, Fetcher, HttpClient};
pub use ingestor::{Ingestor, RunReport};
pub use policy::{IdRange, RateLimit, RetryPolicy, UrlTemplate};
