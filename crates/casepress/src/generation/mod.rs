//! Draft generation: prompts, post-processing and the quality-gated retry loop.

pub mod draft;
pub mod links;
pub mod orchestrator;
pub mod postprocess;
pub mod prompts;

pub use draft::{ContentDraft, FaqItem};
pub use orchestrator::{GenerationFailure, GenerationInput, GenerationOrchestrator, GenerationOutcome};
pub use postprocess::PostProcessor;
