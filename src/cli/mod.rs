//! CLI command handlers

pub mod commands;

pub use commands::{check, collect_inputs, convert, ConvertOptions};
