//! Loading harvested rows into the admin database.
//!
//! The [`Loader`] runs one metric against one server and writes the rows it
//! collected through a [`Sink`]; the [`Harvester`] walks the active server
//! directory and runs every configured loader.

pub mod loader;
pub mod orchestrator;
pub mod postgres;
pub mod sink;

pub use loader::{LIST_DATABASES_OPERATION, Loader};
pub use orchestrator::{DIRECTORY_OPERATION, HarvestOptions, Harvester};
pub use postgres::AdminDatabase;
pub use sink::{ServerDirectory, Sink, SinkTransaction};
