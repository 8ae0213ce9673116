//! Folio: core library for a personal profile page: per-project summary
//! enrichment against a text generation service, and classification of the
//! returned text into numbered lists, bulleted lists, or paragraphs.

pub mod catalog;
pub mod classify;
pub mod error;
pub mod events;
pub mod gemini;
pub mod generator;
pub mod prompt;
pub mod tracker;
pub mod types;

pub use catalog::Catalog;
pub use classify::classify;
pub use error::{CatalogError, ConfigError, FailureKind, GenerateError};
pub use events::{EnrichmentEvent, EventBus};
pub use gemini::{GeminiClient, GeminiConfig};
pub use generator::TextGenerator;
pub use prompt::build_prompt;
pub use tracker::{Dispatch, EnrichmentTracker, TrackerConfig};
pub use types::*;
