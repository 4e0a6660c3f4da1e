//! Core pipeline for the caldraft ecosystem.
//!
//! Turns unstructured source text into a validated calendar event, using a
//! text-generation backend as an unreliable oracle:
//! - `prompt` builds the instruction sent to the backend
//! - `model` invokes backends and swaps them out on resource exhaustion
//! - `extract` recovers a structure from a noisy reply
//! - `normalize` anchors start/end to UTC and enforces ordering
//! - `validation` is the per-item state machine, `pipeline` drives it
//! - `calendar` and `remote` publish the finished draft

pub mod artifacts;
pub mod calendar;
pub mod config;
pub mod confirm;
pub mod constants;
pub mod context;
pub mod draft;
pub mod error;
pub mod extract;
pub mod interaction;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod remote;
pub mod validation;

pub use context::ExtractionContext;
pub use draft::{EventDraft, TimePoint};
pub use error::{DraftError, DraftResult};
pub use pipeline::{ItemOutcome, Pipeline, PipelineSettings};
