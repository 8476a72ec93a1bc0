//! CLI module for tempora - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the kernel,
//! managing persisted plans and inspecting configuration.

pub mod commands;

pub use commands::Cli;
