//! Subcommand implementations

pub mod report;
pub mod settings;
pub mod trackers;
