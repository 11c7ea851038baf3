//! Recording session management
//!
//! This module drives the recorder end to end:
//! - `Orchestrator`: one session's state machine (Idle, Routing, Waiting,
//!   Recording, Draining, Error) fed by a single ordered event channel
//! - `Supervisor`: runs sessions back to back and reconnects to the player
//! - `StatusReporter`: snapshot and change notifications for observers

mod config;
mod event;
mod orchestrator;
mod state;
mod status;
mod supervisor;

pub use config::SessionConfig;
pub use event::{EncoderExit, SessionEvent};
pub use orchestrator::{Orchestrator, SessionEnd};
pub use state::SessionState;
pub use status::{
    spawn_status_file_writer, LastResult, ResultKind, StatusReporter, StatusSnapshot,
};
pub use supervisor::{forward_interrupts, Supervisor};
