use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::ReadCache;
use crate::error::Result;
use crate::registry::TableRegistry;
use crate::retry::RetryExecutor;

pub const STATUS_KEY_COLUMN: &str = "ItemKey";
pub const STATUS_FLAG_COLUMN: &str = "Read";

/// 1-based column of the read flag in the status table.
const FLAG_COLUMN: u32 = 2;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn status_headers() -> Vec<String> {
    vec![STATUS_KEY_COLUMN.to_string(), STATUS_FLAG_COLUMN.to_string()]
}

pub fn flag_text(read: bool) -> &'static str {
    if read {
        "true"
    } else {
        "false"
    }
}

/// Map each item key to its 1-based sheet row.
///
/// `grid` is the full table including its header row, which is skipped. When
/// a key appears more than once the last row wins; earlier duplicates stay in
/// the table untouched.
pub fn index_item_keys(grid: &[Vec<String>]) -> HashMap<&str, u32> {
    grid.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, row)| {
            let key = row.first()?;
            Some((key.as_str(), idx as u32 + 1))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The flag cell of an existing row was rewritten.
    Updated { row: u32 },
    /// A new `(key, flag)` row was appended.
    Appended,
}

/// How concurrent upserts of the same key interact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertMode {
    /// No coordination. Two upserts racing on one key may both read the old
    /// state; the later write wins and the earlier one is lost (or both append).
    #[default]
    Unserialized,
    /// Upserts of the same key are serialized within this process. Writers in
    /// other processes are not coordinated.
    PerKeyLock,
}

/// Per-key mutexes, created on first use and never dropped.
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn for_key(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.locks).entry(key.to_string()).or_default())
    }
}

/// Read-modify-write of single rows in the status table.
///
/// Always reads the table straight from the store: deciding between update
/// and append from a cached snapshot would append duplicates or overwrite the
/// wrong row. The whole read cache is invalidated after each successful write.
#[derive(Debug)]
pub struct UpsertEngine {
    registry: Arc<TableRegistry>,
    retry: RetryExecutor,
    cache: Arc<ReadCache>,
    status_table: String,
    mode: UpsertMode,
    key_locks: KeyLocks,
}

impl UpsertEngine {
    pub fn new(
        registry: Arc<TableRegistry>,
        retry: RetryExecutor,
        cache: Arc<ReadCache>,
        status_table: impl Into<String>,
        mode: UpsertMode,
    ) -> Self {
        Self {
            registry,
            retry,
            cache,
            status_table: status_table.into(),
            mode,
            key_locks: KeyLocks::default(),
        }
    }

    pub fn status_table(&self) -> &str {
        &self.status_table
    }

    pub fn mode(&self) -> UpsertMode {
        self.mode
    }

    pub fn upsert_status(&self, store_id: &str, item_key: &str, read: bool) -> Result<UpsertOutcome> {
        match self.mode {
            UpsertMode::Unserialized => self.upsert_unlocked(store_id, item_key, read),
            UpsertMode::PerKeyLock => {
                let key_lock = self.key_locks.for_key(item_key);
                let _guard = lock(&*key_lock);
                self.upsert_unlocked(store_id, item_key, read)
            }
        }
    }

    fn upsert_unlocked(&self, store_id: &str, item_key: &str, read: bool) -> Result<UpsertOutcome> {
        let headers = status_headers();
        let table = self
            .registry
            .get_or_create_table(store_id, &self.status_table, Some(headers.as_slice()))?;
        let client = self.registry.authenticator().client()?;

        let grid = self
            .retry
            .execute("read status table", || client.read_all_values(&table))?;
        // A read through the cache may have created the table bare; the key
        // index treats row 1 as the header, so it has to exist before appending.
        if grid.is_empty() {
            let header_row = [headers];
            self.retry.execute("write status header", || {
                client.write_range(&table, "A1", &header_row)
            })?;
            log::info!("wrote missing header to {store_id}/{}", self.status_table);
        }
        let existing_row = index_item_keys(&grid).get(item_key).copied();
        let flag = flag_text(read);

        let outcome = match existing_row {
            Some(row) => {
                self.retry.execute("update read flag", || {
                    client.write_cell(&table, row, FLAG_COLUMN, flag)
                })?;
                UpsertOutcome::Updated { row }
            }
            None => {
                let new_row = [item_key.to_string(), flag.to_string()];
                self.retry
                    .execute("append read flag", || client.append_row(&table, &new_row))?;
                UpsertOutcome::Appended
            }
        };
        log::debug!("read flag for {item_key} set to {flag} ({outcome:?})");

        self.cache.invalidate_all();
        Ok(outcome)
    }
}
