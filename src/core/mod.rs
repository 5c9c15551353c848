//! Sessions, credentials and artifact orchestration around the engine
pub mod artifacts;
pub mod config;
pub mod credentials;
pub mod manifest;
pub mod session;
