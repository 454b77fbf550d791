use uuid::Uuid;

use super::event::ResalePolicy;

/// A priced category of tickets within an event, with its own capacity.
///
/// Invariant: `sold_quantity + reserved_quantity <= total_quantity`, and
/// neither counter goes below zero. Only [`crate::capacity::CapacityLedger`]
/// mutates the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub total_quantity: i32,
    pub sold_quantity: i32,
    pub reserved_quantity: i32,
    /// `None` means no per-holder limit.
    pub max_per_wallet: Option<i32>,
    /// Face price in minor currency units.
    pub price_face: i64,
    /// Overrides the event's resale policy for this tier.
    pub resale_policy: Option<ResalePolicy>,
}

impl Tier {
    pub fn available(&self) -> i32 {
        self.total_quantity - self.sold_quantity - self.reserved_quantity
    }
}
