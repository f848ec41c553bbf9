//! Shared gateway state: the engine, the session conversation buffer, and
//! the backpressure gate.

use aegis_core::{ContextMessage, GovernanceEngine};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Keep at most this many prior messages in the session context.
const SESSION_CONTEXT_CAP: usize = 20;

/// Concurrent chat requests beyond this are rejected with 503.
pub const CHAT_HIGH_WATER_MARK: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GovernanceEngine>,
    /// In-memory conversation context for the session; `/clear` resets it.
    pub session: Arc<Mutex<Vec<ContextMessage>>>,
    /// Backpressure gate over the backend fan-out pool.
    pub chat_gate: Arc<Semaphore>,
}

impl AppState {
    pub fn new(engine: Arc<GovernanceEngine>) -> Self {
        Self {
            engine,
            session: Arc::new(Mutex::new(Vec::new())),
            chat_gate: Arc::new(Semaphore::new(CHAT_HIGH_WATER_MARK)),
        }
    }

    /// Snapshot of the session context.
    pub fn session_context(&self) -> Vec<ContextMessage> {
        self.session.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Appends one exchange, keeping the buffer bounded.
    pub fn remember_exchange(&self, user_text: &str, assistant_text: &str) {
        if let Ok(mut session) = self.session.lock() {
            session.push(ContextMessage::user(user_text));
            session.push(ContextMessage::assistant(assistant_text));
            if session.len() > SESSION_CONTEXT_CAP {
                let excess = session.len() - SESSION_CONTEXT_CAP;
                session.drain(..excess);
            }
        }
    }

    pub fn clear_session(&self) {
        if let Ok(mut session) = self.session.lock() {
            session.clear();
        }
    }
}
