//! CLI module for graphbot - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for schedule preview and
//! state file inspection.

pub mod commands;

pub use commands::Cli;
