pub mod batch;
pub mod broadcast;
pub mod chunker;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod item;
pub mod pipeline;
pub mod quality;
pub mod repair;
pub mod sanitize;
pub mod telemetry;
pub mod text;
pub mod worker;

pub use batch::{BatchError, BatchService};
pub use broadcast::{ItemProgressBroadcaster, ItemProgressEvent};
pub use chunker::{Chunk, DocumentChunker, Granularity};
pub use collaborators::{Generation, Publishing, TextExtraction};
pub use config::{load_config, load_config_from_str, Config};
pub use db::Database;
pub use error::{CasepressError, ConfigError, Result};
pub use generation::{ContentDraft, GenerationOrchestrator};
pub use item::{ItemState, WorkItem};
pub use pipeline::{ItemPipeline, PipelineConfig, PipelineError};
pub use quality::{Category, QualityGate, QualityReport};
pub use worker::{BatchScheduler, SchedulerHandle};
