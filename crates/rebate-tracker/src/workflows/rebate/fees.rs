use serde::Serialize;

/// Flat filing fee charged on every project regardless of cost.
pub const FILING_FEE: f64 = 25.0;

/// Referral fee bracket selected by project cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralTier {
    pub label: &'static str,
    pub min_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    pub fee: f64,
}

const REFERRAL_TIERS: [ReferralTier; 5] = [
    ReferralTier {
        label: "under-2500",
        min_cost: 0.0,
        max_cost: Some(2_500.0),
        fee: 0.0,
    },
    ReferralTier {
        label: "2500-4499",
        min_cost: 2_500.0,
        max_cost: Some(4_500.0),
        fee: 150.0,
    },
    ReferralTier {
        label: "4500-7999",
        min_cost: 4_500.0,
        max_cost: Some(8_000.0),
        fee: 250.0,
    },
    ReferralTier {
        label: "8000-14999",
        min_cost: 8_000.0,
        max_cost: Some(15_000.0),
        fee: 400.0,
    },
    ReferralTier {
        label: "15000-plus",
        min_cost: 15_000.0,
        max_cost: None,
        fee: 600.0,
    },
];

/// Tier covering `cost`. Bounds are inclusive-low, exclusive-high; costs below
/// zero fall into the first tier.
pub fn referral_tier(cost: f64) -> ReferralTier {
    REFERRAL_TIERS
        .iter()
        .rev()
        .find(|tier| cost >= tier.min_cost)
        .copied()
        .unwrap_or(REFERRAL_TIERS[0])
}

pub fn calculate_referral_fee(cost: f64) -> f64 {
    referral_tier(cost).fee
}

/// Fee breakdown quoted for a single project.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFees {
    pub referral_fee: f64,
    pub filing_fee: f64,
    pub total_fees: f64,
    pub fee_percentage: f64,
}

pub fn calculate_project_fees(cost: f64) -> ProjectFees {
    let referral_fee = calculate_referral_fee(cost);
    let total_fees = referral_fee + FILING_FEE;
    let fee_percentage = if cost > 0.0 {
        round_cents(total_fees / cost * 100.0)
    } else {
        0.0
    };

    ProjectFees {
        referral_fee,
        filing_fee: FILING_FEE,
        total_fees,
        fee_percentage,
    }
}

/// Outstanding fee position for a contractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractorBalance {
    pub filing_fees_owed: f64,
    pub referral_fees_owed: f64,
    pub approval_fee_paid: bool,
    pub total_owed: f64,
}

pub fn calculate_contractor_balance(
    filing_owed: f64,
    referral_owed: f64,
    approval_paid: bool,
) -> ContractorBalance {
    ContractorBalance {
        filing_fees_owed: filing_owed,
        referral_fees_owed: referral_owed,
        approval_fee_paid: approval_paid,
        total_owed: filing_owed + referral_owed,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_fee_matches_tier_table() {
        let cases = [
            (2_000.0, 0.0),
            (3_500.0, 150.0),
            (6_000.0, 250.0),
            (10_000.0, 400.0),
            (20_000.0, 600.0),
        ];
        for (cost, expected) in cases {
            assert_eq!(calculate_referral_fee(cost), expected, "cost {cost}");
        }
    }

    #[test]
    fn referral_fee_boundaries_are_inclusive_low() {
        let cases = [
            (2_499.99, 0.0),
            (2_500.0, 150.0),
            (4_499.99, 150.0),
            (4_500.0, 250.0),
            (7_999.99, 250.0),
            (8_000.0, 400.0),
            (14_999.99, 400.0),
            (15_000.0, 600.0),
        ];
        for (cost, expected) in cases {
            assert_eq!(calculate_referral_fee(cost), expected, "cost {cost}");
        }
    }

    #[test]
    fn referral_fee_never_decreases_with_cost() {
        let mut previous = calculate_referral_fee(0.0);
        let mut cost = 0.0;
        while cost <= 30_000.0 {
            let fee = calculate_referral_fee(cost);
            assert!(fee >= previous, "fee dropped at cost {cost}");
            previous = fee;
            cost += 125.5;
        }
    }

    #[test]
    fn project_fees_add_filing_fee() {
        for cost in [0.0, 1_000.0, 2_500.0, 9_999.0, 42_000.0] {
            let fees = calculate_project_fees(cost);
            assert_eq!(fees.total_fees, fees.referral_fee + 25.0);
            assert_eq!(fees.filing_fee, FILING_FEE);
        }
    }

    #[test]
    fn fee_percentage_is_rounded_and_zero_for_zero_cost() {
        assert_eq!(calculate_project_fees(0.0).fee_percentage, 0.0);
        assert_eq!(calculate_project_fees(-10.0).fee_percentage, 0.0);
        // (250 + 25) / 6000 = 4.5833..%
        assert_eq!(calculate_project_fees(6_000.0).fee_percentage, 4.58);
        assert_eq!(calculate_project_fees(3_500.0).fee_percentage, 5.0);
    }

    #[test]
    fn tier_labels_follow_cost() {
        assert_eq!(referral_tier(100.0).label, "under-2500");
        assert_eq!(referral_tier(-5.0).label, "under-2500");
        assert_eq!(referral_tier(15_000.0).label, "15000-plus");
        assert!(referral_tier(15_000.0).max_cost.is_none());
    }

    #[test]
    fn contractor_balance_sums_outstanding_fees() {
        let balance = calculate_contractor_balance(75.0, 400.0, true);
        assert_eq!(balance.total_owed, 475.0);
        assert!(balance.approval_fee_paid);

        let empty = calculate_contractor_balance(0.0, 0.0, false);
        assert_eq!(empty.total_owed, 0.0);
    }
}
