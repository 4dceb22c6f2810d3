pub mod config;
pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod reporter;
pub mod shutdown;

pub mod error;
pub mod logger;
pub mod time;
