//! Ledger accounts (clients) and the append-only transaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Reason;
use crate::error::SyncError;
use crate::Table;

/// Kind of identity document a client registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    NationalId,
    Passport,
    DriverLicense,
    Other,
}

impl IdKind {
    pub fn label(&self) -> &'static str {
        match self {
            IdKind::NationalId => "National ID",
            IdKind::Passport => "Passport",
            IdKind::DriverLicense => "Driver license",
            IdKind::Other => "Other",
        }
    }
}

/// A loyalty client. `tier` is always the tier of `points_balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "clients")]
pub struct Client {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday_day: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday_month: Option<u8>,
    #[serde(default)]
    pub accepts_promotions: bool,
    pub id_kind: IdKind,
    pub id_number: String,
    pub qr_code: String,
    pub points_balance: u64,
    pub tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_granted_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Enrollment input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub birthday_day: Option<u8>,
    pub birthday_month: Option<u8>,
    pub accepts_promotions: bool,
    pub id_kind: IdKind,
    pub id_number: String,
}

impl NewClient {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        id_kind: IdKind,
        id_number: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: None,
            birthday_day: None,
            birthday_month: None,
            accepts_promotions: false,
            id_kind,
            id_number: id_number.into(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_birthday(mut self, day: u8, month: u8) -> Self {
        self.birthday_day = Some(day);
        self.birthday_month = Some(month);
        self
    }

    pub fn accepting_promotions(mut self) -> Self {
        self.accepts_promotions = true;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        require_text("id_number", &self.id_number)?;
        check_email(&self.email)?;
        check_birthday(self.birthday_day, self.birthday_month)
    }
}

/// A partial profile edit. Unset fields are left alone.
///
/// The balance is not editable here. Corrections go through
/// `Ledger::adjust_balance` so they are logged like any grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday_day: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday_month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts_promotions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_kind: Option<IdKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
}

impl ClientUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if let Some(name) = &self.first_name {
            require_text("first_name", name)?;
        }
        if let Some(name) = &self.last_name {
            require_text("last_name", name)?;
        }
        if let Some(number) = &self.id_number {
            require_text("id_number", number)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        check_birthday(self.birthday_day, self.birthday_month)
    }
}

/// One grant. Never edited or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "loyalty_transactions")]
pub struct LoyaltyTransaction {
    pub client_id: String,
    /// Signed delta. Only adjustments go negative.
    pub points: i64,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn require_text(field: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), SyncError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(SyncError::validation(format!("invalid email `{}`", email))),
    }
}

fn check_birthday(day: Option<u8>, month: Option<u8>) -> Result<(), SyncError> {
    if let Some(day) = day {
        if !(1..=31).contains(&day) {
            return Err(SyncError::validation(format!("birthday day {} out of range", day)));
        }
    }
    if let Some(month) = month {
        if !(1..=12).contains(&month) {
            return Err(SyncError::validation(format!(
                "birthday month {} out of range",
                month
            )));
        }
    }
    Ok(())
}
