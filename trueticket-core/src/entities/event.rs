use time::OffsetDateTime;
use uuid::Uuid;

/// A time-boxed event. Authoring happens elsewhere; the engine only reads
/// the resale rules and the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    /// Default resale rules for every tier of the event.
    pub resale_policy: ResalePolicy,
    /// Share of every resale price paid out as royalty, in basis points.
    pub royalty_bps: i32,
}

/// Price cap plus optional floor applied to resale listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResalePolicy {
    pub cap: PriceCapPolicy,
    pub min_resale_price: Option<i64>,
}

impl ResalePolicy {
    pub const fn face_value_only() -> Self {
        Self {
            cap: PriceCapPolicy::FaceValueOnly,
            min_resale_price: None,
        }
    }
}

/// How far above the original price a ticket may be resold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceCapPolicy {
    FaceValueOnly,
    /// Markup in basis points over the original price.
    PercentageCap { bps: i32 },
    /// Fixed markup in minor currency units over the original price.
    AbsoluteCap { amount: i64 },
}

/// Storage discriminant of [`PriceCapPolicy`]; the payload lives in a
/// separate `*_cap_value` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "price_cap_kind")]
pub enum PriceCapKind {
    FaceValueOnly,
    PercentageCap,
    AbsoluteCap,
}

impl PriceCapPolicy {
    pub fn kind(&self) -> PriceCapKind {
        match self {
            PriceCapPolicy::FaceValueOnly => PriceCapKind::FaceValueOnly,
            PriceCapPolicy::PercentageCap { .. } => PriceCapKind::PercentageCap,
            PriceCapPolicy::AbsoluteCap { .. } => PriceCapKind::AbsoluteCap,
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            PriceCapPolicy::FaceValueOnly => 0,
            PriceCapPolicy::PercentageCap { bps } => i64::from(*bps),
            PriceCapPolicy::AbsoluteCap { amount } => *amount,
        }
    }

    /// Rebuild a policy from its stored columns. Returns `None` when a
    /// percentage does not fit the basis-point range.
    pub fn from_parts(kind: PriceCapKind, value: i64) -> Option<Self> {
        match kind {
            PriceCapKind::FaceValueOnly => Some(PriceCapPolicy::FaceValueOnly),
            PriceCapKind::PercentageCap => i32::try_from(value)
                .ok()
                .map(|bps| PriceCapPolicy::PercentageCap { bps }),
            PriceCapKind::AbsoluteCap => Some(PriceCapPolicy::AbsoluteCap { amount: value }),
        }
    }
}
