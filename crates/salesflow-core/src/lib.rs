pub mod error;
pub mod config;
pub mod table;
pub mod join;
pub mod summary;
pub mod ingestion;
pub mod preprocessing;
pub mod calendar;
pub mod features;
pub mod eda;
pub mod stages;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
