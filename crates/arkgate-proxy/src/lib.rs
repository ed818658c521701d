//! HTTP adapter for the arkgate chat completion gateway.
//!
//! Accepts OpenAI-style chat completion requests, rewrites them for an Ark
//! deployment, and relays the backend's answer: either one JSON document or
//! a line-by-line stream.
//!
//! - [`backend`]: one POST per request, outcome classified as buffered,
//!   streaming or failed
//! - [`relay`]: forwards a streamed body line by line with explicit flushes
//! - [`server`]: axum router and the `serve()` entry point
#![deny(unsafe_code)]

pub mod backend;
pub mod error;
pub mod relay;
pub mod server;

pub use backend::{BackendClient, BackendError, BackendOutcome, BackendStream};
pub use error::{ErrorResponse, GatewayError};
pub use relay::{ChannelSink, ChunkSink, RelayEnd, RelayFault, RelaySummary, WriterSink, relay_lines};
pub use server::{AppState, router, serve};
