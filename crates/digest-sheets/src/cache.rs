use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::Result;
use crate::registry::TableRegistry;
use crate::remote::Grid;
use crate::retry::RetryExecutor;

/// How long a fetched table is served from memory (default: 60s).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// A whole table as fetched at one point in time.
///
/// Row 0 of the grid is the header, whatever it holds; everything after it
/// is data.
/// An empty table has neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    #[serde(skip)]
    fetched_at: Instant,
}

impl TableSnapshot {
    pub fn from_grid(mut grid: Grid, fetched_at: Instant) -> Self {
        if grid.is_empty() {
            return Self {
                header: Vec::new(),
                rows: Vec::new(),
                fetched_at,
            };
        }
        let header = grid.remove(0);
        Self {
            header,
            rows: grid,
            fetched_at,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// True when the table has no data rows (it may still have a header).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Position of the first column named `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Cell of `row` under column `name`. Short rows read as empty.
    pub fn cell<'a>(&'a self, row: &'a [String], name: &str) -> Option<&'a str> {
        let idx = self.column(name)?;
        Some(row.get(idx).map(String::as_str).unwrap_or(""))
    }

    /// Names from `required` that the header lacks, in the order given.
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column(name).is_none())
            .cloned()
            .collect()
    }
}

type CacheKey = (String, String);

/// Time-bounded cache of whole-table snapshots keyed by (store, table).
///
/// A snapshot younger than the TTL is returned without touching the store;
/// anything older is refetched in one call and replaces the old entry
/// wholesale. The window is shared by every caller holding this cache.
/// Writers invalidate everything with [`ReadCache::invalidate_all`].
pub struct ReadCache {
    registry: Arc<TableRegistry>,
    retry: RetryExecutor,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Arc<TableSnapshot>>>,
}

impl std::fmt::Debug for ReadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ReadCache {
    pub fn new(
        registry: Arc<TableRegistry>,
        retry: RetryExecutor,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            registry,
            retry,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<TableSnapshot>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot for the table, or a fresh fetch if missing or expired.
    pub fn read_table(&self, store_id: &str, table: &str) -> Result<Arc<TableSnapshot>> {
        if let Some(snapshot) = self.fresh(store_id, table) {
            log::debug!("cache hit for {store_id}/{table}");
            return Ok(snapshot);
        }
        log::debug!("cache miss for {store_id}/{table}");

        let handle = self.registry.get_or_create_table(store_id, table, None)?;
        let client = self.registry.authenticator().client()?;
        let grid = self
            .retry
            .execute("read table", || client.read_all_values(&handle))?;
        let snapshot = Arc::new(TableSnapshot::from_grid(grid, self.clock.now()));

        self.entries().insert(
            (store_id.to_string(), table.to_string()),
            Arc::clone(&snapshot),
        );
        Ok(snapshot)
    }

    /// The cached snapshot if it is still inside the TTL window.
    pub fn fresh(&self, store_id: &str, table: &str) -> Option<Arc<TableSnapshot>> {
        let now = self.clock.now();
        let entries = self.entries();
        let snapshot = entries.get(&(store_id.to_string(), table.to_string()))?;
        if now.saturating_duration_since(snapshot.fetched_at) < self.ttl {
            Some(Arc::clone(snapshot))
        } else {
            None
        }
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries();
        if !entries.is_empty() {
            log::debug!("invalidating {} cached table(s)", entries.len());
        }
        entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
