//! Host-side dispatcher.
//!
//! A host process builds an [`App`](crate::app::App), then calls
//! [`serve_stdio`] to expose it on its stdin/stdout:
//!
//! ```rust,ignore
//! let app = Arc::new(build_app()?);
//! serve_stdio(app, CancellationToken::new()).await?;
//! ```
//!
//! Anything the host logs must go to stderr; stdout carries the protocol.
//!
//! Submodules:
//! - `dispatcher`: line validation and method handlers.
//! - `server`: the read loop, per-request tasks, and shutdown handling.

pub mod dispatcher;
pub mod server;

pub use dispatcher::{classify_line, Call, Dispatcher, LineOutcome};
pub use server::{serve, serve_stdio, ServeOutcome};
