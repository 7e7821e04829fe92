//! Tier thresholds.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// One configured tier: inclusive lower bound, up to the next band's bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBand {
    pub name: String,
    pub min_points: u64,
    #[serde(default)]
    pub discount_percent: u8,
}

impl TierBand {
    pub fn new(name: impl Into<String>, min_points: u64, discount_percent: u8) -> Self {
        Self {
            name: name.into(),
            min_points,
            discount_percent,
        }
    }
}

/// A resolved tier. Compares by rank, lowest tier first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tier {
    pub rank: usize,
    pub name: String,
    pub min_points: u64,
    pub discount_percent: u8,
}

/// Non-overlapping bands covering `[0, ∞)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            bands: Self::default_bands(),
        }
    }
}

impl TierTable {
    /// Validate `bands`: non-empty, starting at 0, strictly increasing lower
    /// bounds, unique non-blank names.
    pub fn new(bands: Vec<TierBand>) -> Result<Self, SyncError> {
        let first = bands
            .first()
            .ok_or_else(|| SyncError::validation("tier table is empty"))?;
        if first.min_points != 0 {
            return Err(SyncError::validation(format!(
                "first tier `{}` must start at 0, starts at {}",
                first.name, first.min_points
            )));
        }
        for (i, band) in bands.iter().enumerate() {
            if band.name.trim().is_empty() {
                return Err(SyncError::validation(format!("tier {} has no name", i)));
            }
            if band.discount_percent > 100 {
                return Err(SyncError::validation(format!(
                    "tier `{}` discount {}% exceeds 100%",
                    band.name, band.discount_percent
                )));
            }
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(SyncError::validation(format!(
                    "duplicate tier name `{}`",
                    band.name
                )));
            }
            if i > 0 && band.min_points <= bands[i - 1].min_points {
                return Err(SyncError::validation(format!(
                    "tier `{}` must start above `{}`",
                    band.name,
                    bands[i - 1].name
                )));
            }
        }
        Ok(Self { bands })
    }

    /// bronce, plata, oro, platino.
    pub fn default_bands() -> Vec<TierBand> {
        vec![
            TierBand::new("bronce", 0, 0),
            TierBand::new("plata", 2_000, 5),
            TierBand::new("oro", 5_000, 10),
            TierBand::new("platino", 10_000, 15),
        ]
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }

    /// The tier a balance falls in.
    pub fn tier_for(&self, balance: u64) -> Tier {
        let rank = self
            .bands
            .iter()
            .rposition(|band| band.min_points <= balance)
            .unwrap_or(0);
        self.tier_at(rank)
    }

    /// Look a tier up by its stored name.
    pub fn by_name(&self, name: &str) -> Option<Tier> {
        self.bands
            .iter()
            .position(|band| band.name == name)
            .map(|rank| self.tier_at(rank))
    }

    /// Discount percent for a balance.
    pub fn discount_for(&self, balance: u64) -> u8 {
        self.tier_for(balance).discount_percent
    }

    /// The next tier up and how many points are missing to reach it.
    /// None at the top tier.
    pub fn next_tier(&self, balance: u64) -> Option<(Tier, u64)> {
        let rank = self.tier_for(balance).rank + 1;
        if rank >= self.bands.len() {
            return None;
        }
        let next = self.tier_at(rank);
        let missing = next.min_points.saturating_sub(balance);
        Some((next, missing))
    }

    fn tier_at(&self, rank: usize) -> Tier {
        let band = &self.bands[rank];
        Tier {
            rank,
            name: band.name.clone(),
            min_points: band.min_points,
            discount_percent: band.discount_percent,
        }
    }
}
