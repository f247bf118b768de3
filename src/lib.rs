// ABOUTME: Library root for flotilla - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod bootstrap;
pub mod certs;
pub mod cluster;
pub mod commands;
pub mod components;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod environments;
pub mod error;
pub mod install;
pub mod machine;
pub mod output;
pub mod ssh;
pub mod types;
