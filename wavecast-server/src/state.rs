//! Shared Axum application state: one struct holding everything request
//! handlers need, injected into every handler via Axum's `State`
//! extractor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wavecast_core::dispatcher::DispatcherHandle;
use wavecast_core::session::manager::SessionManager;

/// Shared across every Axum handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// Live dispatcher handles, one per connected streaming session. A
    /// session can exist in [`SessionManager`] (reachable via REST) without
    /// an active dispatcher — e.g. between WebSocket reconnects.
    pub dispatchers: Arc<parking_lot::Mutex<std::collections::HashMap<String, DispatcherHandle>>>,
    /// Number of currently-open `/audio/{id}/stream` sockets, surfaced by `/health`.
    pub active_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            dispatchers: Arc::new(parking_lot::Mutex::new(std::collections::HashMap::new())),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }
}
