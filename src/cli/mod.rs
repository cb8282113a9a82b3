//! CLI module for relayr - command-line interface and subcommands.
//!
//! `run` (the default) supervises the agent; `status` reports progress
//! from the state directory without starting anything.

pub mod commands;

pub use commands::Cli;
