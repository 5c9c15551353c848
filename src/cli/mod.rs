//! CLI entry points for signing, verification and key inspection

pub mod commands;

pub use commands::*;
