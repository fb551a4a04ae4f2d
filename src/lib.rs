pub mod artifacts;
pub mod config;
pub mod error;
pub mod features;
pub mod ml;
pub mod pipeline;
pub mod preprocessing;
pub mod table;
pub mod telemetry;
pub mod tuning;

pub use config::Config;
pub use error::{PipelineError, Result, Stage};
pub use pipeline::{Pipeline, PipelineReport};
