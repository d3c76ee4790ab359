//! HTTP proxy: request handlers, forwarding, and streaming re-encoding.

pub mod forward;
pub mod handlers;
pub mod server;
pub mod stream;
pub mod types;

pub use forward::{forward, Forwarded};
pub use server::{create_router, run_server, AppState};
pub use stream::{encode_event_stream, CompletionCallback, StreamOutcome};
