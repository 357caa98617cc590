//! Google Sheets-backed data layer for the reading digest.
//!
//! The front-end only ever asks for two things: "give me this table" and "flip
//! the read flag for this item". This crate turns those into remote calls and
//! exposes:
//! - Typed configuration and service-account credentials
//! - A process-wide authorized client, opened once
//! - Store/table handle discovery with create-on-demand
//! - Exponential-backoff retry for rate-limited calls
//! - A TTL cache of full-table snapshots
//! - Single-row upserts into the read-status table
//! - The article/read-status join used by the listing view

pub mod a1;
pub mod articles;
mod auth;
mod cache;
pub mod config;
mod error;
pub mod google;
pub mod memory;
mod registry;
pub mod remote;
pub mod retry;
mod store;
mod upsert;

pub use articles::{load_articles, Article};
pub use auth::Authenticator;
pub use cache::{Clock, ManualClock, ReadCache, SystemClock, TableSnapshot, DEFAULT_TTL};
pub use config::{ConfigError, CredentialSource, DigestConfig, ServiceAccountKey, StoreConfig};
pub use error::{ApiError, DataError, Result};
pub use registry::TableRegistry;
pub use remote::{Connector, Grid, SheetsApi, StoreHandle, TableHandle};
pub use retry::{RetryExecutor, RetryPolicy, Sleeper};
pub use store::{DigestStore, DigestStoreBuilder};
pub use upsert::{
    flag_text, index_item_keys, status_headers, UpsertEngine, UpsertMode, UpsertOutcome,
    STATUS_FLAG_COLUMN, STATUS_KEY_COLUMN,
};
