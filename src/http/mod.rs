//! HTTP API for observing the recorder
//!
//! Read-only endpoints backed by the session status reporter:
//! - GET /health - Health check
//! - GET /status - Current status snapshot (JSON)
//! - GET /status/text - The same snapshot as `KEY=value` lines

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
