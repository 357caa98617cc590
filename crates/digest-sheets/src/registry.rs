use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::auth::Authenticator;
use crate::error::Result;
use crate::remote::{StoreHandle, TableHandle, DEFAULT_COL_CAPACITY, DEFAULT_ROW_CAPACITY};
use crate::retry::RetryExecutor;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Store and table handles, discovered once and kept for the registry's lifetime.
///
/// Each store's tables are listed with a single metadata call the first time
/// the store is touched; tables created afterwards are added to that listing
/// instead of re-listing. Nothing here is ever invalidated: a table deleted
/// remotely keeps its stale handle until the process restarts.
///
/// Locks are only held around map access, never across a remote call.
#[derive(Debug)]
pub struct TableRegistry {
    auth: Arc<Authenticator>,
    retry: RetryExecutor,
    stores: Mutex<HashMap<String, StoreHandle>>,
    tables: Mutex<HashMap<String, HashMap<String, TableHandle>>>,
}

impl TableRegistry {
    pub fn new(auth: Arc<Authenticator>, retry: RetryExecutor) -> Self {
        Self {
            auth,
            retry,
            stores: Mutex::new(HashMap::new()),
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    pub fn open_store(&self, store_id: &str) -> Result<StoreHandle> {
        if let Some(store) = lock(&self.stores).get(store_id) {
            return Ok(store.clone());
        }

        let client = self.auth.client()?;
        let store = self
            .retry
            .execute("open store", || client.open_store(store_id))?;
        log::debug!("opened store {store_id} ({})", store.title);

        Ok(lock(&self.stores)
            .entry(store_id.to_string())
            .or_insert(store)
            .clone())
    }

    /// Title -> handle for every table in the store.
    pub fn list_tables(&self, store_id: &str) -> Result<HashMap<String, TableHandle>> {
        if let Some(tables) = lock(&self.tables).get(store_id) {
            return Ok(tables.clone());
        }

        let store = self.open_store(store_id)?;
        let client = self.auth.client()?;
        let listed = self
            .retry
            .execute("list tables", || client.list_tables(&store))?;
        log::debug!("store {store_id} has {} table(s)", listed.len());

        let listed: HashMap<String, TableHandle> = listed
            .into_iter()
            .map(|table| (table.title.clone(), table))
            .collect();
        Ok(lock(&self.tables)
            .entry(store_id.to_string())
            .or_insert(listed)
            .clone())
    }

    /// Look up `name`, creating it (2000 x 26, with an optional header row) if absent.
    ///
    /// Headers are only written when the table is created here; an existing
    /// table is returned as-is.
    pub fn get_or_create_table(
        &self,
        store_id: &str,
        name: &str,
        headers: Option<&[String]>,
    ) -> Result<TableHandle> {
        if let Some(table) = self.list_tables(store_id)?.remove(name) {
            return Ok(table);
        }

        let store = self.open_store(store_id)?;
        let client = self.auth.client()?;
        let created = self.retry.execute("create table", || {
            client.create_table(&store, name, DEFAULT_ROW_CAPACITY, DEFAULT_COL_CAPACITY)
        })?;
        log::info!("created table `{name}` in store {store_id}");

        let table = lock(&self.tables)
            .entry(store_id.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(created)
            .clone();

        if let Some(headers) = headers.filter(|h| !h.is_empty()) {
            let header_row = [headers.to_vec()];
            self.retry
                .execute("write headers", || client.write_range(&table, "A1", &header_row))?;
        }

        Ok(table)
    }
}
