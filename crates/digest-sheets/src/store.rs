use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Authenticator;
use crate::cache::{Clock, ReadCache, SystemClock, TableSnapshot};
use crate::config::{CredentialSource, DigestConfig};
use crate::error::Result;
use crate::google::GoogleConnector;
use crate::registry::TableRegistry;
use crate::remote::{Connector, TableHandle};
use crate::retry::{RetryExecutor, RetryPolicy, Sleeper};
use crate::upsert::{UpsertEngine, UpsertMode, UpsertOutcome};

/// The data layer as seen by the front-end.
///
/// One `DigestStore` is meant to live for the whole process: it owns the
/// authorized client, the handle registry and the read cache, all of which
/// are filled on first use and kept until it is dropped. Share it behind an
/// `Arc`; every method takes `&self` and blocks until the store answers.
#[derive(Debug)]
pub struct DigestStore {
    registry: Arc<TableRegistry>,
    cache: Arc<ReadCache>,
    upserts: UpsertEngine,
    retry: RetryExecutor,
}

impl DigestStore {
    /// Data layer talking to Google Sheets with the configured credentials.
    pub fn connect(config: &DigestConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: &DigestConfig) -> DigestStoreBuilder {
        DigestStoreBuilder::new(config)
    }

    /// Cached read of a whole table. Creates the table (empty) if it does not exist.
    pub fn load_table(&self, store_id: &str, table: &str) -> Result<Arc<TableSnapshot>> {
        self.cache.read_table(store_id, table)
    }

    /// Set the read flag for `item_key`, bypassing the cache, then invalidate it.
    pub fn upsert(&self, store_id: &str, item_key: &str, read: bool) -> Result<UpsertOutcome> {
        self.upserts.upsert_status(store_id, item_key, read)
    }

    /// Replace a table's contents with `columns` as the header followed by `rows`.
    ///
    /// Not for the status table: a concurrent upsert can land between the
    /// clear and the rewrite and be lost.
    pub fn write_full_table(
        &self,
        store_id: &str,
        table: &str,
        columns: &[String],
        rows: &[Vec<String>],
    ) -> Result<()> {
        // The rewrite below puts the header in place, so creation skips it.
        let handle = self.registry.get_or_create_table(store_id, table, None)?;
        let client = self.registry.authenticator().client()?;

        self.retry
            .execute("clear table", || client.clear_table(&handle))?;

        let mut values = Vec::with_capacity(rows.len() + 1);
        values.push(columns.to_vec());
        values.extend(rows.iter().cloned());
        self.retry
            .execute("write table", || client.write_range(&handle, "A1", &values))?;
        log::info!(
            "rewrote {store_id}/{table} with {} column(s) and {} row(s)",
            columns.len(),
            rows.len()
        );

        self.cache.invalidate_all();
        Ok(())
    }

    pub fn get_or_create_table(
        &self,
        store_id: &str,
        table: &str,
        headers: Option<&[String]>,
    ) -> Result<TableHandle> {
        self.registry.get_or_create_table(store_id, table, headers)
    }

    pub fn list_tables(&self, store_id: &str) -> Result<HashMap<String, TableHandle>> {
        self.registry.list_tables(store_id)
    }

    /// Drop every cached snapshot so the next read goes to the store.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn status_table(&self) -> &str {
        self.upserts.status_table()
    }
}

/// Assembles a [`DigestStore`], with hooks for swapping the remote side,
/// the clock and the backoff sleeper.
pub struct DigestStoreBuilder {
    credentials: CredentialSource,
    status_table: String,
    ttl: Duration,
    mode: UpsertMode,
    connector: Option<Arc<dyn Connector>>,
    clock: Arc<dyn Clock>,
    sleeper: Option<Sleeper>,
}

impl DigestStoreBuilder {
    pub fn new(config: &DigestConfig) -> Self {
        Self {
            credentials: config.credential_source(),
            status_table: config.store.status_table.clone(),
            ttl: config.cache_ttl(),
            mode: if config.store.serialize_upserts {
                UpsertMode::PerKeyLock
            } else {
                UpsertMode::Unserialized
            },
            connector: None,
            clock: Arc::new(SystemClock),
            sleeper: None,
        }
    }

    pub fn credentials(mut self, credentials: CredentialSource) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn upsert_mode(mut self, mode: UpsertMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> DigestStore {
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(GoogleConnector::default()),
        };
        let retry = match self.sleeper {
            Some(sleeper) => RetryExecutor::with_sleeper(RetryPolicy::default(), sleeper),
            None => RetryExecutor::default(),
        };

        let auth = Arc::new(Authenticator::new(self.credentials, connector));
        let registry = Arc::new(TableRegistry::new(auth, retry.clone()));
        let cache = Arc::new(ReadCache::new(
            Arc::clone(&registry),
            retry.clone(),
            self.clock,
            self.ttl,
        ));
        let upserts = UpsertEngine::new(
            Arc::clone(&registry),
            retry.clone(),
            Arc::clone(&cache),
            self.status_table,
            self.mode,
        );

        DigestStore {
            registry,
            cache,
            upserts,
            retry,
        }
    }
}
