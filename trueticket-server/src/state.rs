//! Application state shared across all request handlers.

use trueticket_core::TicketingEngine;

use crate::config::runtime::{CollaboratorConfig, SharedConfig};

/// Cheap to clone: the engine components and every config section are
/// behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub engine: TicketingEngine,
    /// Runtime configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
}

/// Which collaborator signed an incoming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Payment,
    Ledger,
}

impl AppState {
    pub fn new(engine: TicketingEngine, config: SharedConfig) -> Self {
        Self { engine, config }
    }

    /// HMAC key shared with a collaborator, or `None` when it is not
    /// configured.
    pub async fn collaborator_secret(&self, collaborator: Collaborator) -> Option<Box<[u8]>> {
        match collaborator {
            Collaborator::Payment => Some(self.config.payment.read().await.secret_bytes().into()),
            Collaborator::Ledger => self
                .config
                .ledger
                .read()
                .await
                .as_ref()
                .map(|ledger: &CollaboratorConfig| ledger.secret_bytes().into()),
        }
    }
}
