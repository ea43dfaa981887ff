pub mod config;
pub mod error;
pub mod outputs;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, MonotoneProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::ItemPipeline;
