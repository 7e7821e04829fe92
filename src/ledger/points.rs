//! Grant reasons and how many points each is worth.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;
use crate::error::SyncError;

/// Why points were granted. Stored snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Purchase,
    Registration,
    Referral,
    Birthday,
    Promotion,
    Bonus,
    /// Manual correction, positive or negative.
    Adjustment,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Purchase => "purchase",
            Reason::Registration => "registration",
            Reason::Referral => "referral",
            Reason::Birthday => "birthday",
            Reason::Promotion => "promotion",
            Reason::Bonus => "bonus",
            Reason::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `floor(amount * rate)`.
pub fn derive_from_purchase(amount: f64, rate: f64) -> Result<u64, SyncError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(SyncError::validation(format!(
            "purchase amount must be a non-negative number, got {}",
            amount
        )));
    }
    if !rate.is_finite() || rate < 0.0 {
        return Err(SyncError::validation(format!(
            "conversion rate must be a non-negative number, got {}",
            rate
        )));
    }
    let points = (amount * rate).floor();
    if points >= u64::MAX as f64 {
        return Err(SyncError::validation(format!(
            "purchase of {} overflows the point balance",
            amount
        )));
    }
    Ok(points as u64)
}

/// What a grant is for.
#[derive(Debug, Clone, PartialEq)]
pub enum Award {
    /// Points derived from the amount spent.
    Purchase { amount: f64 },
    /// The configured bonus for a reason that has one.
    Fixed(Reason),
    /// Caller-chosen points.
    Custom { reason: Reason, points: u64 },
}

impl Award {
    pub fn reason(&self) -> Reason {
        match self {
            Award::Purchase { .. } => Reason::Purchase,
            Award::Fixed(reason) | Award::Custom { reason, .. } => *reason,
        }
    }

    pub fn purchase_amount(&self) -> Option<f64> {
        match self {
            Award::Purchase { amount } => Some(*amount),
            _ => None,
        }
    }
}

/// A request to credit an account.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRequest {
    pub account_id: String,
    pub award: Award,
    pub description: Option<String>,
}

impl GrantRequest {
    pub fn purchase(account_id: impl Into<String>, amount: f64) -> Self {
        Self::new(account_id, Award::Purchase { amount })
    }

    pub fn fixed(account_id: impl Into<String>, reason: Reason) -> Self {
        Self::new(account_id, Award::Fixed(reason))
    }

    pub fn custom(account_id: impl Into<String>, reason: Reason, points: u64) -> Self {
        Self::new(account_id, Award::Custom { reason, points })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn new(account_id: impl Into<String>, award: Award) -> Self {
        Self {
            account_id: account_id.into(),
            award,
            description: None,
        }
    }
}

/// Conversion rate and fixed bonuses.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsPolicy {
    pub points_per_currency_unit: f64,
    pub registration_bonus: u64,
    pub birthday_bonus: u64,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl PointsPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            points_per_currency_unit: config.points_per_currency_unit,
            registration_bonus: config.registration_bonus,
            birthday_bonus: config.birthday_bonus,
        }
    }

    /// The fixed bonus for `reason`, if it has one.
    pub fn fixed_bonus(&self, reason: Reason) -> Option<u64> {
        match reason {
            Reason::Registration => Some(self.registration_bonus),
            Reason::Birthday => Some(self.birthday_bonus),
            _ => None,
        }
    }

    /// Points an award is worth. Always positive.
    pub fn points_for(&self, award: &Award) -> Result<u64, SyncError> {
        let points = match award {
            Award::Purchase { amount } => {
                derive_from_purchase(*amount, self.points_per_currency_unit)?
            }
            Award::Fixed(reason) => self.fixed_bonus(*reason).ok_or_else(|| {
                SyncError::validation(format!("{} has no fixed bonus", reason))
            })?,
            Award::Custom {
                reason: Reason::Purchase,
                ..
            } => {
                return Err(SyncError::validation(
                    "purchase points are derived from the amount spent",
                ))
            }
            Award::Custom {
                reason: Reason::Adjustment,
                ..
            } => {
                return Err(SyncError::validation(
                    "adjustments are not grants, use Ledger::adjust_balance",
                ))
            }
            Award::Custom { points, .. } => *points,
        };
        if points == 0 {
            return Err(SyncError::validation(format!(
                "{} award is worth no points",
                award.reason()
            )));
        }
        Ok(points)
    }
}
