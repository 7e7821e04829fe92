// Lets `#[derive(Table)]` expand to `synced_rust::Table` inside this crate too.
extern crate self as synced_rust;

mod cache;
mod catalog;
mod config;
mod error;
mod feed;
mod ledger;
mod record;
mod remote;
mod session;
mod tasks;

pub use cache::{Applied, ChangeEvent, ReconcilingCache, SyncedCollection};
pub use catalog::{Catalog, NewProduct, Product, ProductImage, ProductListing};
pub use config::{Config, ConfigError, LedgerConfig, RemoteConfig};
pub use error::SyncError;
pub use feed::{
    ChangeFeed, ChangeKind, FeedFilter, FeedHub, FeedSubscription, RowChange, RowKey,
    SubscriptionHandle,
};
pub use ledger::{
    decode_code, derive_from_purchase, generate_code, Award, Client, ClientUpdate, Grant,
    GrantRequest, IdKind, Ledger, LoyaltyTransaction, NewClient, PointsPolicy, QrEncoder, Reason,
    Tier, TierBand, TierTable,
};
pub use record::{to_patch, Keyed, NewRecord, Record, Row, Table, Versioned, RESERVED_FIELDS};
pub use remote::{
    ErrorCode, InMemoryRemoteStore, Query, RemoteError, RemoteStore, TableRepository, TablesExt,
    TimeoutStore,
};
pub use session::{Session, SessionContext};
pub use tasks::{Task, TaskList};

// Re-export the derive alongside the trait of the same name
pub use synced_rust_macros::Table;
