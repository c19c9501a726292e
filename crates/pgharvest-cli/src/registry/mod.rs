//! Run directory, report artifacts and log setup for `pgharvest harvest`.

mod logging;
mod run;

pub use logging::init_logging;
pub use run::{RunContext, start_run, write_report};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot write run artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode run artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot install log subscriber: {0}")]
    Logging(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
