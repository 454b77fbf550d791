//! Resale price caps and royalty arithmetic.
//!
//! All amounts are minor currency units. Divisions round toward negative
//! infinity, and results are clamped at zero.

use smallvec::SmallVec;
use thiserror::Error;

use crate::entities::{Beneficiary, PriceCapPolicy, ResalePolicy, RoyaltyAllocation};
use crate::error::TicketingError;

const BPS_DENOMINATOR: i128 = 10_000;

fn clamp_to_i64(value: i128) -> i64 {
    i64::try_from(value.max(0)).unwrap_or(i64::MAX)
}

/// Highest price a ticket bought at `original_price` may be listed for.
pub fn compute_max_resale_price(policy: PriceCapPolicy, original_price: i64) -> i64 {
    let original = i128::from(original_price);
    let max = match policy {
        PriceCapPolicy::FaceValueOnly => original,
        PriceCapPolicy::PercentageCap { bps } => {
            (original * (BPS_DENOMINATOR + i128::from(bps))).div_euclid(BPS_DENOMINATOR)
        }
        PriceCapPolicy::AbsoluteCap { amount } => original + i128::from(amount),
    };
    clamp_to_i64(max)
}

/// Check a proposed listing price. The cap is checked before the floor.
pub fn check_listing_price(
    policy: &ResalePolicy,
    original_price: i64,
    price: i64,
) -> Result<(), TicketingError> {
    let max_price = compute_max_resale_price(policy.cap, original_price);
    if price > max_price {
        return Err(TicketingError::PriceCapExceeded { price, max_price });
    }
    if let Some(min_price) = policy.min_resale_price {
        if price < min_price {
            return Err(TicketingError::BelowMinimumPrice { price, min_price });
        }
    }
    Ok(())
}

/// Total royalty owed on a resale at `price`.
pub fn royalty_total(price: i64, royalty_bps: i32) -> i64 {
    let royalty = (i128::from(price) * i128::from(royalty_bps)).div_euclid(BPS_DENOMINATOR);
    clamp_to_i64(royalty).min(price.max(0))
}

/// Divides a royalty total among beneficiaries.
pub trait RoyaltySplit: Send + Sync {
    fn allocate(&self, total: i64) -> Vec<RoyaltyAllocation>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoyaltySplitError {
    #[error("royalty split has no beneficiaries")]
    Empty,
    #[error("beneficiary {0:?} appears more than once")]
    Duplicate(Beneficiary),
    #[error("royalty split weights sum to {0} basis points, expected 10000")]
    BadTotal(u32),
}

/// Splits by basis-point weights. Rounding leftovers go to the first
/// beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedRoyaltySplit {
    shares: SmallVec<[(Beneficiary, u32); 4]>,
}

impl WeightedRoyaltySplit {
    pub fn new(
        shares: impl IntoIterator<Item = (Beneficiary, u32)>,
    ) -> Result<Self, RoyaltySplitError> {
        let shares: SmallVec<[(Beneficiary, u32); 4]> = shares.into_iter().collect();
        if shares.is_empty() {
            return Err(RoyaltySplitError::Empty);
        }
        for (i, (beneficiary, _)) in shares.iter().enumerate() {
            if shares[..i].iter().any(|(seen, _)| seen == beneficiary) {
                return Err(RoyaltySplitError::Duplicate(*beneficiary));
            }
        }
        let total: u32 = shares.iter().map(|(_, w)| *w).sum();
        if i128::from(total) != BPS_DENOMINATOR {
            return Err(RoyaltySplitError::BadTotal(total));
        }
        Ok(Self { shares })
    }

    /// Everything to the host.
    pub fn host_only() -> Self {
        let mut shares = SmallVec::new();
        shares.push((Beneficiary::Host, 10_000));
        Self { shares }
    }

    pub fn shares(&self) -> &[(Beneficiary, u32)] {
        &self.shares
    }
}

impl Default for WeightedRoyaltySplit {
    fn default() -> Self {
        Self::host_only()
    }
}

impl RoyaltySplit for WeightedRoyaltySplit {
    fn allocate(&self, total: i64) -> Vec<RoyaltyAllocation> {
        if total <= 0 {
            return Vec::new();
        }
        let mut allocations: Vec<RoyaltyAllocation> = self
            .shares
            .iter()
            .map(|(beneficiary, weight)| RoyaltyAllocation {
                beneficiary: *beneficiary,
                amount: clamp_to_i64(
                    (i128::from(total) * i128::from(*weight)).div_euclid(BPS_DENOMINATOR),
                ),
            })
            .collect();
        let assigned: i64 = allocations.iter().map(|a| a.amount).sum();
        if let Some(first) = allocations.first_mut() {
            first.amount += total - assigned;
        }
        allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_cap_boundary() {
        let policy = ResalePolicy {
            cap: PriceCapPolicy::PercentageCap { bps: 2000 },
            min_resale_price: None,
        };
        assert_eq!(compute_max_resale_price(policy.cap, 10_000), 12_000);
        assert!(check_listing_price(&policy, 10_000, 12_000).is_ok());
        match check_listing_price(&policy, 10_000, 12_001) {
            Err(TicketingError::PriceCapExceeded { price, max_price }) => {
                assert_eq!(price, 12_001);
                assert_eq!(max_price, 12_000);
            }
            other => panic!("expected PriceCapExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_cap_kinds() {
        assert_eq!(compute_max_resale_price(PriceCapPolicy::FaceValueOnly, 4_999), 4_999);
        assert_eq!(
            compute_max_resale_price(PriceCapPolicy::AbsoluteCap { amount: 250 }, 4_999),
            5_249
        );
        // 999 * 1.15 = 1148.85, floored
        assert_eq!(
            compute_max_resale_price(PriceCapPolicy::PercentageCap { bps: 1500 }, 999),
            1_148
        );
    }

    #[test]
    fn test_cap_never_negative() {
        assert_eq!(
            compute_max_resale_price(PriceCapPolicy::AbsoluteCap { amount: -500 }, 100),
            0
        );
        assert_eq!(
            compute_max_resale_price(PriceCapPolicy::PercentageCap { bps: -20_000 }, 100),
            0
        );
    }

    #[test]
    fn test_minimum_price() {
        let policy = ResalePolicy {
            cap: PriceCapPolicy::FaceValueOnly,
            min_resale_price: Some(2_000),
        };
        assert!(matches!(
            check_listing_price(&policy, 5_000, 1_999),
            Err(TicketingError::BelowMinimumPrice { min_price: 2_000, .. })
        ));
        assert!(check_listing_price(&policy, 5_000, 2_000).is_ok());
    }

    #[test]
    fn test_royalty_total() {
        assert_eq!(royalty_total(12_000, 1_000), 1_200);
        assert_eq!(royalty_total(999, 250), 24);
        assert_eq!(royalty_total(0, 1_000), 0);
    }

    #[test]
    fn test_weighted_split_gives_remainder_to_first() {
        let split = WeightedRoyaltySplit::new([
            (Beneficiary::Artist, 5_000),
            (Beneficiary::Venue, 3_000),
            (Beneficiary::Host, 2_000),
        ])
        .unwrap();
        let allocations = split.allocate(1_001);
        let amounts: Vec<i64> = allocations.iter().map(|a| a.amount).collect();
        assert_eq!(amounts, vec![501, 300, 200]);
        assert_eq!(amounts.iter().sum::<i64>(), 1_001);
        assert!(split.allocate(0).is_empty());
    }

    #[test]
    fn test_weighted_split_validation() {
        assert_eq!(
            WeightedRoyaltySplit::new(Vec::new()),
            Err(RoyaltySplitError::Empty)
        );
        assert_eq!(
            WeightedRoyaltySplit::new([(Beneficiary::Host, 5_000), (Beneficiary::Host, 5_000)]),
            Err(RoyaltySplitError::Duplicate(Beneficiary::Host))
        );
        assert_eq!(
            WeightedRoyaltySplit::new([(Beneficiary::Host, 9_000)]),
            Err(RoyaltySplitError::BadTotal(9_000))
        );
    }
}
