//! visitlog: a store of visited addresses with debounced, shutdown-safe persistence.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
#[cfg(feature = "sqlite")]
pub mod database;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
