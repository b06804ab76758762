//! Core domain types for Medley: media file model and status state machine,
//! upload session, dispatch payloads, progress events, validation and
//! configuration. Everything here is infrastructure-free; the sibling crates
//! supply storage, persistence and transport.

pub mod config;
pub mod error;
pub mod models;
pub mod progress;
pub mod validation;

pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use progress::{ProgressEvent, ProgressNotifier, ProgressStatus};
