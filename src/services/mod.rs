pub mod cache;
pub mod classifier;
pub mod credentials;
pub mod fetcher;
pub mod metrics;
pub mod parser;
pub mod query;
pub mod refresh;
