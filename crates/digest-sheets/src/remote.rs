//! The remote tabular store, seen as a small capability set.
//!
//! [`SheetsApi`] is everything the data layer needs from the store once a
//! client has been authorized; [`Connector`] performs the authorization. The
//! Google implementation lives in [`crate::google`], the in-memory one in
//! [`crate::memory`].

use std::fmt;
use std::sync::Arc;

use crate::config::ServiceAccountKey;
use crate::error::{ApiError, DataError};

/// A full table as returned by the store: rows of string cells.
pub type Grid = Vec<Vec<String>>;

/// Row capacity of tables created on demand.
pub const DEFAULT_ROW_CAPACITY: u32 = 2000;
/// Column capacity of tables created on demand.
pub const DEFAULT_COL_CAPACITY: u32 = 26;

/// An opened remote workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    pub id: String,
    pub title: String,
}

/// One named table (worksheet) inside a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    pub store_id: String,
    /// Numeric sheet id assigned by the store.
    pub sheet_id: i64,
    pub title: String,
}

/// Remote operations consumed by the data layer.
///
/// Rows and columns are 1-based. Implementations must not retry on their own;
/// retry policy is applied by [`crate::RetryExecutor`] around every call.
pub trait SheetsApi: fmt::Debug + Send + Sync {
    fn open_store(&self, store_id: &str) -> Result<StoreHandle, ApiError>;

    /// Metadata listing of every table in the store.
    fn list_tables(&self, store: &StoreHandle) -> Result<Vec<TableHandle>, ApiError>;

    fn create_table(
        &self,
        store: &StoreHandle,
        title: &str,
        rows: u32,
        cols: u32,
    ) -> Result<TableHandle, ApiError>;

    /// Write a block of rows whose top-left corner is `range` (e.g. `A1`).
    fn write_range(&self, table: &TableHandle, range: &str, values: &[Vec<String>]) -> Result<(), ApiError>;

    fn write_cell(&self, table: &TableHandle, row: u32, col: u32, value: &str) -> Result<(), ApiError>;

    /// Append one row after the last non-empty row.
    fn append_row(&self, table: &TableHandle, values: &[String]) -> Result<(), ApiError>;

    /// Every value in the table, padded to a rectangle. An empty table yields an empty grid.
    fn read_all_values(&self, table: &TableHandle) -> Result<Grid, ApiError>;

    fn clear_table(&self, table: &TableHandle) -> Result<(), ApiError>;
}

/// Turns a credential into an authorized [`SheetsApi`] client.
pub trait Connector: Send + Sync {
    fn authorize(&self, credential: &ServiceAccountKey) -> Result<Arc<dyn SheetsApi>, DataError>;
}

/// Pad ragged rows with empty strings so every row has the same width.
///
/// The Sheets API omits trailing empty cells in each row.
pub fn pad_grid(mut grid: Grid) -> Grid {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize(width, String::new());
    }
    grid
}
