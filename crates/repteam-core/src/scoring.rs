//! Points, commission, and bonus-tier math.
//!
//! The constants are policy, not incidental: defaults must stay at
//! 2 pts / $5 per shirt and 1 pt / $3 per ticket for compatibility with the
//! existing program, but every value is configurable.

use serde::Serialize;

use crate::types::{Sale, SaleKind};

/// One bonus tier: a unit threshold and its reward label.
#[derive(Debug, Clone, Serialize)]
pub struct BonusTier {
    pub units: u64,
    pub reward: String,
}

impl BonusTier {
    pub fn new(units: u64, reward: impl Into<String>) -> Self {
        Self {
            units,
            reward: reward.into(),
        }
    }
}

/// Progress against one bonus tier. Tiers carry independent achieved flags;
/// they need not be contiguous or exhaustive.
#[derive(Debug, Clone, Serialize)]
pub struct TierProgress {
    pub units: u64,
    pub reward: String,
    pub achieved: bool,
}

/// Scoring policy: per-kind point and commission weights plus bonus tiers.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub points_per_shirt: u64,
    pub points_per_ticket: u64,
    /// Whole dollars per shirt sold.
    pub commission_per_shirt: i64,
    /// Whole dollars per ticket sold.
    pub commission_per_ticket: i64,
    pub bonus_tiers: Vec<BonusTier>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points_per_shirt: 2,
            points_per_ticket: 1,
            commission_per_shirt: 5,
            commission_per_ticket: 3,
            bonus_tiers: vec![
                BonusTier::new(10, "Free Shirt"),
                BonusTier::new(25, "$50 Bonus"),
                BonusTier::new(40, "$50 Bonus"),
            ],
        }
    }
}

impl ScoringConfig {
    /// points = points_per_shirt * shirts + points_per_ticket * tickets
    pub fn points(&self, totals: &SalesTotals) -> u64 {
        self.points_per_shirt * totals.shirts + self.points_per_ticket * totals.tickets
    }

    /// commission = commission_per_shirt * shirts + commission_per_ticket * tickets
    pub fn commission(&self, totals: &SalesTotals) -> i64 {
        self.commission_per_shirt * totals.shirts as i64
            + self.commission_per_ticket * totals.tickets as i64
    }

    /// Monotonic step function over total units against the ordered tier list.
    pub fn tier_progress(&self, total_units: u64) -> Vec<TierProgress> {
        self.bonus_tiers
            .iter()
            .map(|tier| TierProgress {
                units: tier.units,
                reward: tier.reward.clone(),
                achieved: total_units >= tier.units,
            })
            .collect()
    }
}

/// Per-kind quantity sums over a rep's sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SalesTotals {
    pub shirts: u64,
    pub tickets: u64,
}

impl SalesTotals {
    pub fn from_sales<'a>(sales: impl IntoIterator<Item = &'a Sale>) -> Self {
        let mut totals = Self::default();
        for sale in sales {
            match sale.kind {
                SaleKind::Shirt => totals.shirts += u64::from(sale.quantity),
                SaleKind::Ticket => totals.tickets += u64::from(sale.quantity),
            }
        }
        totals
    }

    pub fn total_units(&self) -> u64 {
        self.shirts + self.tickets
    }
}
