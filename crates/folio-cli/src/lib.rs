//! Folio front ends: command line, interactive REPL, and HTTP API over the
//! `folio` enrichment library.

pub mod config;
pub mod render;
pub mod repl;
pub mod session;
pub mod transport;

pub use config::{Overrides, Settings};
pub use session::{EnrichmentReport, Session};
