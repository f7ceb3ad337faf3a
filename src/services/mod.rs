//! Application services

pub mod ingest;
pub mod query;

pub use ingest::IngestionService;
pub use query::QueryService;
