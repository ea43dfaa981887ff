//! Shared test utilities for casepress integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp-dir database
//! - `ScriptedGenerator` and `RecordingProgress` fakes
//! - Builders for configs, items and canned model replies

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::{RecordingProgress, ScriptedGenerator};
pub use harness::TestHarness;
