//! Ledger - grants, enrollment and client lookups against the remote store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::account::{Client, ClientUpdate, LoyaltyTransaction, NewClient};
use super::points::{GrantRequest, PointsPolicy, Reason};
use super::qr::{decode_code, generate_code, QrEncoder};
use super::tier::{Tier, TierTable};
use crate::config::LedgerConfig;
use crate::error::SyncError;
use crate::record::Row;
use crate::remote::{ErrorCode, Query, RemoteStore, TablesExt};
use crate::session::SessionContext;

/// Outcome of a successful grant.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    pub transaction: Row<LoyaltyTransaction>,
    pub balance: u64,
    pub tier: Tier,
    /// Conditional writes it took, 1 when uncontended.
    pub attempts: u32,
}

const MAX_CODE_ATTEMPTS: u32 = 8;

#[derive(Serialize)]
struct BalancePatch<'a> {
    points_balance: u64,
    tier: &'a str,
    last_granted_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CodePatch<'a> {
    qr_code: &'a str,
}

/// Point ledger over the `clients` and `loyalty_transactions` tables.
///
/// Every grant appends its transaction first and only then moves the
/// balance, with a write conditioned on the row version it read. A lost race
/// re-reads and tries again, up to `max_grant_attempts` times.
pub struct Ledger<S> {
    store: Arc<S>,
    tiers: TierTable,
    policy: PointsPolicy,
    max_attempts: u32,
}

impl<S: RemoteStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Result<Self, SyncError> {
        if config.max_grant_attempts == 0 {
            return Err(SyncError::validation("max_grant_attempts must be at least 1"));
        }
        Ok(Self {
            store,
            tiers: TierTable::new(config.tiers.clone())?,
            policy: PointsPolicy::from_config(config),
            max_attempts: config.max_grant_attempts,
        })
    }

    /// A ledger over the session's store and configuration.
    pub fn from_context(ctx: &SessionContext<S>) -> Result<Self, SyncError> {
        Self::new(ctx.shared_store(), &ctx.config().ledger)
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn policy(&self) -> &PointsPolicy {
        &self.policy
    }

    pub fn tier_for(&self, balance: u64) -> Tier {
        self.tiers.tier_for(balance)
    }

    /// Discount percent a balance earns.
    pub fn discount_for(&self, balance: u64) -> u8 {
        self.tiers.discount_for(balance)
    }

    /// Credit `delta` points to an account.
    pub fn grant_points(
        &self,
        owner_id: &str,
        account_id: &str,
        delta: u64,
        reason: Reason,
        description: Option<&str>,
    ) -> Result<Grant, SyncError> {
        self.apply_delta(owner_id, account_id, signed(delta)?, reason, None, description)
    }

    /// Credit whatever `request` is worth under the points policy.
    pub fn grant(&self, owner_id: &str, request: &GrantRequest) -> Result<Grant, SyncError> {
        let points = self.policy.points_for(&request.award)?;
        self.apply_delta(
            owner_id,
            &request.account_id,
            signed(points)?,
            request.award.reason(),
            request.award.purchase_amount(),
            request.description.as_deref(),
        )
    }

    /// Correct a balance by `delta` points, up or down.
    ///
    /// Logged as an `Adjustment` transaction and written like a grant, so the
    /// balance keeps matching the sum of the log. A correction that would
    /// take the balance below zero is rejected before anything is written.
    pub fn adjust_balance(
        &self,
        owner_id: &str,
        account_id: &str,
        delta: i64,
        description: Option<&str>,
    ) -> Result<Grant, SyncError> {
        self.apply_delta(owner_id, account_id, delta, Reason::Adjustment, None, description)
    }

    fn apply_delta(
        &self,
        owner_id: &str,
        account_id: &str,
        delta: i64,
        reason: Reason,
        purchase_amount: Option<f64>,
        description: Option<&str>,
    ) -> Result<Grant, SyncError> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::Unauthenticated);
        }
        if account_id.trim().is_empty() {
            return Err(SyncError::validation("account id is required"));
        }
        if delta == 0 {
            return Err(SyncError::validation("points delta must not be zero"));
        }

        let clients = self.store.table::<Client>();
        let account = clients.require_owned(owner_id, account_id)?;
        moved_balance(account_id, account.data.data.points_balance, delta)?;

        let transaction = self.store.table::<LoyaltyTransaction>().insert(
            owner_id,
            &LoyaltyTransaction {
                client_id: account_id.to_string(),
                points: delta,
                reason,
                purchase_amount,
                description: description.map(str::to_string),
            },
        )?;

        for attempt in 1..=self.max_attempts {
            let current = clients.require(account_id)?;
            let balance = moved_balance(account_id, current.data.data.points_balance, delta)
                .map_err(|e| {
                    warn!(
                        account_id,
                        delta,
                        transaction_id = %transaction.id,
                        "balance moved out of range under a concurrent write"
                    );
                    e
                })?;
            let tier = self.tiers.tier_for(balance);
            let patch = BalancePatch {
                points_balance: balance,
                tier: &tier.name,
                last_granted_at: Utc::now(),
            };

            match clients.update_if(account_id, &patch, current.version) {
                Ok(_) => {
                    info!(
                        account_id,
                        delta,
                        %reason,
                        balance,
                        tier = %tier.name,
                        attempt,
                        "points granted"
                    );
                    return Ok(Grant {
                        transaction,
                        balance,
                        tier,
                        attempts: attempt,
                    });
                }
                Err(SyncError::Remote(e)) if e.code == ErrorCode::VersionConflict => {
                    debug!(account_id, attempt, "balance write lost a race, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            account_id,
            attempts = self.max_attempts,
            transaction_id = %transaction.id,
            "giving up on balance write"
        );
        Err(SyncError::ConcurrentUpdate {
            account_id: account_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Enroll a client with the registration bonus.
    ///
    /// The row is written with a provisional code, then the code is re-issued
    /// from the assigned id. If re-issuing fails the provisional code stays.
    /// Either way the code is unique among the owner's clients.
    /// The welcome bonus is logged as a registration transaction.
    pub fn enroll(&self, owner_id: &str, new_client: NewClient) -> Result<Row<Client>, SyncError> {
        if owner_id.trim().is_empty() {
            return Err(SyncError::Unauthenticated);
        }
        new_client.validate()?;

        let bonus = self.policy.registration_bonus;
        let bonus_delta = signed(bonus)?;
        let provisional = self.issue_code(
            owner_id,
            &Uuid::new_v4().simple().to_string(),
            None,
            &new_client.first_name,
            &new_client.last_name,
        )?;
        let clients = self.store.table::<Client>();
        let mut row = clients.insert(
            owner_id,
            &Client {
                first_name: new_client.first_name,
                last_name: new_client.last_name,
                email: new_client.email,
                phone: new_client.phone,
                birthday_day: new_client.birthday_day,
                birthday_month: new_client.birthday_month,
                accepts_promotions: new_client.accepts_promotions,
                id_kind: new_client.id_kind,
                id_number: new_client.id_number,
                qr_code: provisional,
                points_balance: bonus,
                tier: self.tiers.tier_for(bonus).name,
                last_granted_at: None,
            },
        )?;

        let reissued = self
            .issue_code(
                owner_id,
                &row.id,
                Some(&row.id),
                &row.data.first_name,
                &row.data.last_name,
            )
            .and_then(|code| clients.update(&row.id, &CodePatch { qr_code: &code }));
        match reissued {
            Ok(updated) => row = updated,
            Err(e) => warn!(client_id = %row.id, error = %e, "keeping provisional loyalty code"),
        }

        if bonus_delta > 0 {
            self.store.table::<LoyaltyTransaction>().insert(
                owner_id,
                &LoyaltyTransaction {
                    client_id: row.id.clone(),
                    points: bonus_delta,
                    reason: Reason::Registration,
                    purchase_amount: None,
                    description: Some("Welcome bonus".to_string()),
                },
            )?;
        }

        info!(client_id = %row.id, bonus, "client enrolled");
        Ok(row)
    }

    /// Apply a profile edit to one of the owner's clients.
    pub fn update_client(
        &self,
        owner_id: &str,
        id: &str,
        update: &ClientUpdate,
    ) -> Result<Row<Client>, SyncError> {
        if update.is_empty() {
            return Err(SyncError::validation("client update has no fields"));
        }
        update.validate()?;

        let clients = self.store.table::<Client>();
        clients.require_owned(owner_id, id)?;
        clients.update(id, update)
    }

    /// Delete one of the owner's clients. Its transactions stay in the log.
    pub fn remove_client(&self, owner_id: &str, id: &str) -> Result<(), SyncError> {
        let clients = self.store.table::<Client>();
        clients.require_owned(owner_id, id)?;
        clients.delete(id)?;
        debug!(client_id = id, "client removed");
        Ok(())
    }

    /// The owner's clients, newest first.
    pub fn clients(&self, owner_id: &str) -> Result<Vec<Row<Client>>, SyncError> {
        self.store.table::<Client>().list(owner_id)
    }

    /// The owner's transactions, newest first, optionally for one client.
    pub fn transactions(
        &self,
        owner_id: &str,
        account_id: Option<&str>,
    ) -> Result<Vec<Row<LoyaltyTransaction>>, SyncError> {
        let mut query = Query::new().eq("owner_id", owner_id);
        if let Some(account_id) = account_id {
            query = query.eq("client_id", account_id);
        }
        self.store.table::<LoyaltyTransaction>().select(&query)
    }

    /// The owner's client holding `code`. No match, or a blank code, is
    /// `Ok(None)`. A code held by several clients is `AmbiguousCode`.
    pub fn find_by_code(&self, owner_id: &str, code: &str) -> Result<Option<Row<Client>>, SyncError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let query = Query::new().eq("owner_id", owner_id).eq("qr_code", code);
        let mut matches = self.store.table::<Client>().select(&query)?;
        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            n => Err(SyncError::AmbiguousCode {
                code: code.to_string(),
                matches: n,
            }),
        }
    }

    /// Resolve a scanned string: first as a stored code, then as a code
    /// carrying the client id.
    pub fn identify(&self, owner_id: &str, scanned: &str) -> Result<Option<Row<Client>>, SyncError> {
        if let Some(client) = self.find_by_code(owner_id, scanned)? {
            return Ok(Some(client));
        }
        let Some(client_id) = decode_code(scanned) else {
            return Ok(None);
        };
        match self.store.table::<Client>().get(&client_id)? {
            Some(found) if found.data.owner_id == owner_id => Ok(Some(found.data)),
            _ => Ok(None),
        }
    }

    /// Render a client's code with `encoder`.
    pub fn qr_image(&self, client: &Row<Client>, encoder: &dyn QrEncoder) -> Result<Vec<u8>, SyncError> {
        if client.data.qr_code.trim().is_empty() {
            return Err(SyncError::validation(format!(
                "client {} has no loyalty code",
                client.id
            )));
        }
        encoder.encode(&client.data.qr_code)
    }

    /// A code no other client of the owner holds.
    ///
    /// Codes only see the start of their seed, so a taken code is retried
    /// from a random seed.
    fn issue_code(
        &self,
        owner_id: &str,
        seed: &str,
        holder: Option<&str>,
        first_name: &str,
        last_name: &str,
    ) -> Result<String, SyncError> {
        let mut seed = seed.to_string();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_code(&seed, first_name, last_name, Utc::now().timestamp_millis());
            if !self.code_taken(owner_id, &code, holder)? {
                return Ok(code);
            }
            debug!(code = %code, "loyalty code taken, reseeding");
            seed = Uuid::new_v4().simple().to_string();
        }
        Err(SyncError::validation(format!(
            "no free loyalty code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Whether a client other than `holder` already has `code`.
    fn code_taken(&self, owner_id: &str, code: &str, holder: Option<&str>) -> Result<bool, SyncError> {
        let query = Query::new().eq("owner_id", owner_id).eq("qr_code", code);
        Ok(self
            .store
            .table::<Client>()
            .select(&query)?
            .iter()
            .any(|client| Some(client.id.as_str()) != holder))
    }
}

fn signed(points: u64) -> Result<i64, SyncError> {
    i64::try_from(points)
        .map_err(|_| SyncError::validation(format!("{} points is more than one grant can carry", points)))
}

/// `balance` moved by `delta`, unless that leaves the `u64` range.
fn moved_balance(account_id: &str, balance: u64, delta: i64) -> Result<u64, SyncError> {
    balance.checked_add_signed(delta).ok_or_else(|| {
        SyncError::validation(format!(
            "{:+} points would take account {} out of range from {}",
            delta, account_id, balance
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use crate::ledger::IdKind;
    use crate::remote::{InMemoryRemoteStore, RemoteError};

    fn ledger() -> Ledger<InMemoryRemoteStore> {
        Ledger::new(Arc::new(InMemoryRemoteStore::new()), &LedgerConfig::default()).unwrap()
    }

    fn ana() -> NewClient {
        NewClient::new("Ana", "Pérez", "ana@example.com", IdKind::Passport, "X123")
    }

    #[test]
    fn enroll_credits_welcome_bonus() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        assert_eq!(client.data.points_balance, 100);
        assert_eq!(client.data.tier, "bronce");
        assert_eq!(client.data.qr_code, generate_code(&client.id, "Ana", "Pérez", 0));

        let log = ledger.transactions("shop", Some(&client.id)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].data.reason, Reason::Registration);
        assert_eq!(log[0].data.points, 100);
    }

    /// Accepts inserts but rejects every update.
    struct NoUpdates(InMemoryRemoteStore);

    impl RemoteStore for NoUpdates {
        fn select(&self, table: &str, query: &Query) -> Result<Vec<crate::Record>, RemoteError> {
            self.0.select(table, query)
        }

        fn get(
            &self,
            table: &str,
            id: &str,
        ) -> Result<Option<crate::Versioned<crate::Record>>, RemoteError> {
            self.0.get(table, id)
        }

        fn insert(&self, table: &str, record: crate::NewRecord) -> Result<crate::Record, RemoteError> {
            self.0.insert(table, record)
        }

        fn update(
            &self,
            _table: &str,
            _id: &str,
            _patch: serde_json::Map<String, Value>,
        ) -> Result<crate::Record, RemoteError> {
            Err(RemoteError::rejected("read only"))
        }

        fn update_if(
            &self,
            _table: &str,
            _id: &str,
            _patch: serde_json::Map<String, Value>,
            _expected_version: u64,
        ) -> Result<crate::Versioned<crate::Record>, RemoteError> {
            Err(RemoteError::rejected("read only"))
        }

        fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError> {
            self.0.delete(table, id)
        }

        fn delete_where(&self, table: &str, field: &str, value: &Value) -> Result<usize, RemoteError> {
            self.0.delete_where(table, field, value)
        }
    }

    #[test]
    fn provisional_codes_stay_unique() {
        let ledger = Ledger::new(
            Arc::new(NoUpdates(InMemoryRemoteStore::new())),
            &LedgerConfig::default(),
        )
        .unwrap();

        let ana = ledger.enroll("shop", ana()).unwrap();
        let bea = ledger
            .enroll(
                "shop",
                NewClient::new("Bea", "Ruiz", "bea@example.com", IdKind::Passport, "Y456"),
            )
            .unwrap();
        assert_ne!(ana.data.qr_code, bea.data.qr_code);
        assert_eq!(ana.data.points_balance, 100);
        assert_eq!(ledger.transactions("shop", Some(&ana.id)).unwrap().len(), 1);

        let scanned = ledger.identify("shop", &ana.data.qr_code).unwrap().unwrap();
        assert_eq!(scanned.data.first_name, "Ana");
        let scanned = ledger.find_by_code("shop", &bea.data.qr_code).unwrap().unwrap();
        assert_eq!(scanned.id, bea.id);
    }

    #[test]
    fn taken_code_is_reissued_from_a_fresh_seed() {
        let ledger = ledger();
        // Both ids start with the same five characters, so their codes agree.
        let taken = generate_code("3f2a9c11", "Ana", "Pérez", 0);
        assert_eq!(taken, generate_code("3f2a9d22", "Ana", "Pérez", 0));
        let holder = ledger.enroll("shop", ana()).unwrap();
        ledger
            .store
            .table::<Client>()
            .update(&holder.id, &CodePatch { qr_code: &taken })
            .unwrap();

        let code = ledger
            .issue_code("shop", "3f2a9d22", Some("3f2a9d22"), "Ana", "Pérez")
            .unwrap();
        assert_ne!(code, taken);
        assert!(!ledger.code_taken("shop", &code, None).unwrap());
        // Another owner's codes do not count.
        assert_eq!(
            ledger
                .issue_code("other-shop", "3f2a9d22", None, "Ana", "Pérez")
                .unwrap(),
            taken
        );
    }

    #[test]
    fn shared_code_is_ambiguous_not_a_guess() {
        let ledger = ledger();
        let ana = ledger.enroll("shop", ana()).unwrap();
        let bea = ledger
            .enroll(
                "shop",
                NewClient::new("Bea", "Ruiz", "bea@example.com", IdKind::Passport, "Y456"),
            )
            .unwrap();
        ledger
            .store
            .table::<Client>()
            .update(&bea.id, &CodePatch { qr_code: &ana.data.qr_code })
            .unwrap();

        assert_eq!(
            ledger.find_by_code("shop", &ana.data.qr_code),
            Err(SyncError::AmbiguousCode {
                code: ana.data.qr_code.clone(),
                matches: 2,
            })
        );
        assert!(ledger.identify("shop", &ana.data.qr_code).is_err());
    }

    #[test]
    fn grant_moves_balance_and_tier() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        let grant = ledger
            .grant_points("shop", &client.id, 1_900, Reason::Bonus, Some("opening day"))
            .unwrap();
        assert_eq!(grant.balance, 2_000);
        assert_eq!(grant.tier.name, "plata");
        assert_eq!(grant.attempts, 1);
        assert_eq!(grant.transaction.data.description.as_deref(), Some("opening day"));

        let stored = ledger.store.table::<Client>().require(&client.id).unwrap();
        assert_eq!(stored.data.data.points_balance, 2_000);
        assert_eq!(stored.data.data.tier, "plata");
        assert!(stored.data.data.last_granted_at.is_some());
        assert_eq!(ledger.discount_for(grant.balance), 5);
    }

    #[test]
    fn purchase_grant_derives_points() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        let grant = ledger
            .grant("shop", &GrantRequest::purchase(&client.id, 250.0))
            .unwrap();
        assert_eq!(grant.transaction.data.points, 250);
        assert_eq!(grant.transaction.data.purchase_amount, Some(250.0));
        assert_eq!(grant.balance, 350);
    }

    #[test]
    fn grant_rejects_bad_input_before_writing() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        assert!(matches!(
            ledger.grant_points("shop", &client.id, 0, Reason::Bonus, None),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            ledger.grant("shop", &GrantRequest::fixed(&client.id, Reason::Promotion)),
            Err(SyncError::Validation(_))
        ));
        assert_eq!(
            ledger.grant_points("", &client.id, 5, Reason::Bonus, None),
            Err(SyncError::Unauthenticated)
        );
        assert_eq!(ledger.transactions("shop", Some(&client.id)).unwrap().len(), 1);
    }

    #[test]
    fn grant_to_unknown_or_foreign_account_is_not_found() {
        let ledger = ledger();
        assert_eq!(
            ledger.grant_points("shop", "ghost", 5, Reason::Bonus, None),
            Err(SyncError::not_found("clients", "ghost"))
        );

        let client = ledger.enroll("shop", ana()).unwrap();
        assert_eq!(
            ledger.grant_points("other-shop", &client.id, 5, Reason::Bonus, None),
            Err(SyncError::not_found("clients", &client.id))
        );
        assert!(ledger.transactions("other-shop", None).unwrap().is_empty());
    }

    #[test]
    fn adjustments_are_logged_and_keep_the_tier() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        let up = ledger
            .adjust_balance("shop", &client.id, 4_900, Some("card migrated"))
            .unwrap();
        assert_eq!(up.balance, 5_000);
        assert_eq!(up.tier.name, "oro");
        assert_eq!(up.transaction.data.reason, Reason::Adjustment);

        let down = ledger.adjust_balance("shop", &client.id, -4_000, None).unwrap();
        assert_eq!(down.balance, 1_000);
        assert_eq!(down.tier.name, "bronce");
        assert_eq!(down.transaction.data.points, -4_000);

        let logged: i64 = ledger
            .transactions("shop", Some(&client.id))
            .unwrap()
            .iter()
            .map(|t| t.data.points)
            .sum();
        assert_eq!(logged, 1_000);
    }

    #[test]
    fn adjustment_below_zero_writes_nothing() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        assert!(matches!(
            ledger.adjust_balance("shop", &client.id, -101, None),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            ledger.adjust_balance("shop", &client.id, 0, None),
            Err(SyncError::Validation(_))
        ));
        assert_eq!(ledger.transactions("shop", Some(&client.id)).unwrap().len(), 1);
        let stored = ledger.store.table::<Client>().require(&client.id).unwrap();
        assert_eq!(stored.data.data.points_balance, 100);
    }

    #[test]
    fn profile_edit_leaves_the_balance_alone() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        let updated = ledger
            .update_client(
                "shop",
                &client.id,
                &ClientUpdate {
                    phone: Some("555-0100".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.data.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.data.points_balance, 100);
        assert_eq!(updated.data.tier, "bronce");
    }

    #[test]
    fn update_client_validation_and_missing_rows() {
        let ledger = ledger();
        assert!(matches!(
            ledger.update_client("shop", "c-1", &ClientUpdate::default()),
            Err(SyncError::Validation(_))
        ));
        let rename = ClientUpdate {
            first_name: Some("Ann".into()),
            ..Default::default()
        };
        assert_eq!(
            ledger.update_client("shop", "ghost", &rename),
            Err(SyncError::not_found("clients", "ghost"))
        );
    }

    #[test]
    fn other_owners_cannot_edit_or_remove() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();
        let rename = ClientUpdate {
            first_name: Some("Mallory".into()),
            ..Default::default()
        };

        assert_eq!(
            ledger.update_client("other-shop", &client.id, &rename),
            Err(SyncError::not_found("clients", &client.id))
        );
        assert_eq!(
            ledger.remove_client("other-shop", &client.id),
            Err(SyncError::not_found("clients", &client.id))
        );
        assert_eq!(
            ledger.adjust_balance("other-shop", &client.id, 10, None),
            Err(SyncError::not_found("clients", &client.id))
        );

        let stored = ledger.store.table::<Client>().require(&client.id).unwrap();
        assert_eq!(stored.data.data.first_name, "Ana");
        assert_eq!(ledger.clients("shop").unwrap().len(), 1);
    }

    #[test]
    fn lookups_by_code() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();

        let found = ledger.find_by_code("shop", &client.data.qr_code).unwrap();
        assert_eq!(found.unwrap().id, client.id);
        assert!(ledger.find_by_code("shop", "NOPE").unwrap().is_none());
        assert!(ledger.find_by_code("shop", "   ").unwrap().is_none());
        assert!(ledger
            .find_by_code("other-shop", &client.data.qr_code)
            .unwrap()
            .is_none());

        let scanned = ledger.identify("shop", &format!(" {} ", client.data.qr_code));
        assert_eq!(scanned.unwrap().unwrap().id, client.id);
    }

    #[test]
    fn lookup_surfaces_remote_errors() {
        let ledger = ledger();
        ledger.store.fail_next(RemoteError::transport("offline"));
        assert!(matches!(
            ledger.find_by_code("shop", "ABC"),
            Err(SyncError::Remote(_))
        ));
    }

    #[test]
    fn qr_image_uses_the_encoder() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();
        let encoder = |data: &str| -> Result<Vec<u8>, SyncError> { Ok(data.as_bytes().to_vec()) };

        let image = ledger.qr_image(&client, &encoder).unwrap();
        assert_eq!(image, client.data.qr_code.as_bytes());
    }

    #[test]
    fn remove_client_keeps_the_log() {
        let ledger = ledger();
        let client = ledger.enroll("shop", ana()).unwrap();
        ledger
            .grant("shop", &GrantRequest::custom(&client.id, Reason::Referral, 40))
            .unwrap();

        ledger.remove_client("shop", &client.id).unwrap();
        assert!(ledger.clients("shop").unwrap().is_empty());
        assert_eq!(ledger.transactions("shop", None).unwrap().len(), 2);
    }
}
