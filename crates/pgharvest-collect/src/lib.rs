//! Metadata extractors for monitored PostgreSQL servers.

pub mod options;
pub mod postgres;
pub mod source;

pub use options::SourceOptions;
pub use postgres::PostgresSource;
pub use source::Source;
