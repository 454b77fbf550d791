//! Runtime configuration types for the ticketing engine.
//!
//! These are the validated values the engine runs with. Loading and parsing
//! the TOML file is the server crate's job.

mod admin;
mod config_store;
mod settings;

pub use admin::AdminConfig;
pub use config_store::{ConfigStore, ConfigWatcher};
pub use settings::TicketingSettings;
