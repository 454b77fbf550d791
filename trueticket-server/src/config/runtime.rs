//! Runtime configuration, shared by request handlers and reloaded on SIGHUP.
//!
//! The engine's own knobs live in [`TicketingSettings`] inside a
//! [`ConfigStore`] so background processors see reloads too.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

pub use trueticket_core::config::{AdminConfig, ConfigStore, TicketingSettings};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// A collaborator endpoint and the HMAC key shared with it.
#[derive(Clone)]
pub struct CollaboratorConfig {
    pub endpoint: Url,
    secret: Box<[u8]>,
}

impl CollaboratorConfig {
    pub fn new(endpoint: Url, secret: Box<[u8]>) -> Self {
        Self { endpoint, secret }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl std::fmt::Debug for CollaboratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Every reloadable section behind its own lock.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub payment: Arc<RwLock<CollaboratorConfig>>,
    pub ledger: Arc<RwLock<Option<CollaboratorConfig>>>,
    pub settings: ConfigStore<TicketingSettings>,
}
