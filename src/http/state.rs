use crate::session::StatusReporter;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Source of status snapshots
    pub status: StatusReporter,
}

impl AppState {
    pub fn new(status: StatusReporter) -> Self {
        Self { status }
    }
}
