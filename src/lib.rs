#![forbid(unsafe_code)]

//! `agent-bridge` — line-delimited JSON bridge between a supervisor and a
//! hosted agent application.
//!
//! - [`app`]: the App model (agents, toolkits, tools) a host exposes.
//! - [`host`]: the dispatcher that serves an App on stdin/stdout.
//! - [`client`]: the supervisor that spawns a host and calls it.
//! - [`protocol`]: envelopes, payloads, and line framing shared by both.

pub mod app;
pub mod client;
pub mod config;
pub mod demo;
pub mod errors;
pub mod host;
pub mod protocol;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
