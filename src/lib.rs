//! Graphbot - scheduled statistics-graph updates for a chat channel
//!
//! The scheduler persists its state across restarts, fires a pluggable
//! update pipeline (cleanup, generate, post) on a day-based schedule with an
//! optional fixed clock time, and is watched by a health supervisor that
//! restarts it when the loop dies or drifts.

pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod tasks;

pub use error::{GraphbotError, Result};
