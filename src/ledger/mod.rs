//! Loyalty points ledger.
//!
//! Clients hold a denormalized running balance and the tier it falls in;
//! every credit is also written to an append-only transaction log:
//!
//! ```ignore
//! let ledger = Ledger::from_context(&ctx)?;
//! let ana = ledger.enroll(&owner, NewClient::new("Ana", "Pérez", "ana@x.io", IdKind::Passport, "X1"))?;
//! let grant = ledger.grant(&owner, &GrantRequest::purchase(&ana.id, 250.0))?;
//! assert_eq!(grant.balance, 350);
//! ```

mod account;
mod mutator;
mod points;
mod qr;
mod tier;

pub use account::{Client, ClientUpdate, IdKind, LoyaltyTransaction, NewClient};
pub use mutator::{Grant, Ledger};
pub use points::{derive_from_purchase, Award, GrantRequest, PointsPolicy, Reason};
pub use qr::{decode_code, generate_code, QrEncoder};
pub use tier::{Tier, TierBand, TierTable};
