#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod capacity;
pub mod checkin;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod events;
pub mod market;
pub mod pricing;
pub mod processors;
pub mod purchase;
pub mod store;
pub mod tickets;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{EngineDeps, TicketingEngine};
pub use error::{TicketingError, TicketingResult};
