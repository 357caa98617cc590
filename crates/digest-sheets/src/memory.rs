//! In-memory remote store.
//!
//! Behaves like a single spreadsheet service holding any number of
//! workbooks, counts every call it receives and can be told to fail the next
//! call of a given kind. The test suites run the whole data layer against it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::a1;
use crate::config::ServiceAccountKey;
use crate::error::{ApiError, DataError};
use crate::remote::{pad_grid, Connector, Grid, SheetsApi, StoreHandle, TableHandle};

/// Kinds of remote call, used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    OpenStore,
    ListTables,
    CreateTable,
    WriteRange,
    WriteCell,
    AppendRow,
    ReadAllValues,
    ClearTable,
}

/// Number of calls received per operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub authorize: u32,
    pub open_store: u32,
    pub list_tables: u32,
    pub create_table: u32,
    pub write_range: u32,
    pub write_cell: u32,
    pub append_row: u32,
    pub read_all_values: u32,
    pub clear_table: u32,
}

impl CallCounts {
    /// Every remote call except authorization.
    pub fn remote_total(&self) -> u32 {
        self.open_store
            + self.list_tables
            + self.create_table
            + self.write_range
            + self.write_cell
            + self.append_row
            + self.read_all_values
            + self.clear_table
    }

    fn bump(&mut self, op: Operation) {
        let counter = match op {
            Operation::OpenStore => &mut self.open_store,
            Operation::ListTables => &mut self.list_tables,
            Operation::CreateTable => &mut self.create_table,
            Operation::WriteRange => &mut self.write_range,
            Operation::WriteCell => &mut self.write_cell,
            Operation::AppendRow => &mut self.append_row,
            Operation::ReadAllValues => &mut self.read_all_values,
            Operation::ClearTable => &mut self.clear_table,
        };
        *counter += 1;
    }
}

#[derive(Debug)]
struct MemoryTable {
    handle: TableHandle,
    grid: Grid,
}

#[derive(Debug)]
struct Workbook {
    title: String,
    tables: Vec<MemoryTable>,
}

#[derive(Debug, Default)]
struct Inner {
    workbooks: HashMap<String, Workbook>,
    next_sheet_id: i64,
    calls: CallCounts,
    faults: HashMap<Operation, VecDeque<ApiError>>,
    last_credential: Option<ServiceAccountKey>,
}

impl Inner {
    /// Count the call and pop an injected failure, if any.
    fn begin(&mut self, op: Operation) -> Result<(), ApiError> {
        self.calls.bump(op);
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn workbook(&self, store_id: &str) -> Result<&Workbook, ApiError> {
        self.workbooks.get(store_id).ok_or_else(not_found)
    }

    fn table_mut(&mut self, table: &TableHandle) -> Result<&mut MemoryTable, ApiError> {
        self.workbooks
            .get_mut(&table.store_id)
            .and_then(|wb| wb.tables.iter_mut().find(|t| t.handle.sheet_id == table.sheet_id))
            .ok_or_else(not_found)
    }

    fn ensure_workbook(&mut self, store_id: &str) -> &mut Workbook {
        self.workbooks
            .entry(store_id.to_string())
            .or_insert_with(|| Workbook {
                title: store_id.to_string(),
                tables: Vec::new(),
            })
    }

    fn insert_table(&mut self, store_id: &str, title: &str, grid: Grid) -> TableHandle {
        self.next_sheet_id += 1;
        let handle = TableHandle {
            store_id: store_id.to_string(),
            sheet_id: self.next_sheet_id,
            title: title.to_string(),
        };
        self.ensure_workbook(store_id).tables.push(MemoryTable {
            handle: handle.clone(),
            grid,
        });
        handle
    }
}

fn not_found() -> ApiError {
    ApiError::http(404, "Requested entity was not found.")
}

/// Trim trailing blanks the way the Sheets API does, then pad to a rectangle.
fn visible_values(grid: &Grid) -> Grid {
    let mut rows: Grid = grid
        .iter()
        .map(|row| {
            let len = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
            row[..len].to_vec()
        })
        .collect();
    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }
    pad_grid(rows)
}

fn set_cell(grid: &mut Grid, row: u32, col: u32, value: &str) {
    let (r, c) = (row as usize - 1, col as usize - 1);
    if grid.len() <= r {
        grid.resize_with(r + 1, Vec::new);
    }
    let cells = &mut grid[r];
    if cells.len() <= c {
        cells.resize(c + 1, String::new());
    }
    cells[c] = value.to_string();
}

/// Shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySheets {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create an empty workbook. Existing workbooks are left untouched.
    pub fn add_store(&self, store_id: &str) {
        self.lock().ensure_workbook(store_id);
    }

    /// Create a table holding `grid`, creating the workbook if needed.
    pub fn add_table(&self, store_id: &str, title: &str, grid: Grid) -> TableHandle {
        self.lock().insert_table(store_id, title, grid)
    }

    /// Current values of a table as the store would return them.
    pub fn values(&self, store_id: &str, title: &str) -> Option<Grid> {
        let inner = self.lock();
        let workbook = inner.workbooks.get(store_id)?;
        let table = workbook.tables.iter().find(|t| t.handle.title == title)?;
        Some(visible_values(&table.grid))
    }

    /// Replace a table's contents behind the data layer's back (another writer).
    pub fn set_values(&self, store_id: &str, title: &str, grid: Grid) {
        let mut inner = self.lock();
        if let Some(table) = inner
            .workbooks
            .get_mut(store_id)
            .and_then(|wb| wb.tables.iter_mut().find(|t| t.handle.title == title))
        {
            table.grid = grid;
            return;
        }
        inner.insert_table(store_id, title, grid);
    }

    /// Fail the next call of `op` with `err`. Repeated calls queue failures.
    pub fn fail_next(&self, op: Operation, err: ApiError) {
        self.lock().faults.entry(op).or_default().push_back(err);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    /// The credential passed to the most recent authorization.
    pub fn last_credential(&self) -> Option<ServiceAccountKey> {
        self.lock().last_credential.clone()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            sheets: self.clone(),
        })
    }
}

impl SheetsApi for MemorySheets {
    fn open_store(&self, store_id: &str) -> Result<StoreHandle, ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::OpenStore)?;
        let workbook = inner.workbook(store_id)?;
        Ok(StoreHandle {
            id: store_id.to_string(),
            title: workbook.title.clone(),
        })
    }

    fn list_tables(&self, store: &StoreHandle) -> Result<Vec<TableHandle>, ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::ListTables)?;
        let workbook = inner.workbook(&store.id)?;
        Ok(workbook.tables.iter().map(|t| t.handle.clone()).collect())
    }

    fn create_table(
        &self,
        store: &StoreHandle,
        title: &str,
        _rows: u32,
        _cols: u32,
    ) -> Result<TableHandle, ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::CreateTable)?;
        let workbook = inner.workbook(&store.id)?;
        if workbook.tables.iter().any(|t| t.handle.title == title) {
            return Err(ApiError::http(
                400,
                format!("A sheet with the name \"{title}\" already exists."),
            ));
        }
        Ok(inner.insert_table(&store.id, title, Vec::new()))
    }

    fn write_range(&self, table: &TableHandle, range: &str, values: &[Vec<String>]) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::WriteRange)?;
        let (row, col) = a1::parse_cell_ref(range)
            .map_err(|e| ApiError::http(400, format!("Unable to parse range: {range} ({e})")))?;
        let target = inner.table_mut(table)?;
        for (dr, values_row) in values.iter().enumerate() {
            for (dc, value) in values_row.iter().enumerate() {
                set_cell(&mut target.grid, row + dr as u32, col + dc as u32, value);
            }
        }
        Ok(())
    }

    fn write_cell(&self, table: &TableHandle, row: u32, col: u32, value: &str) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::WriteCell)?;
        if row == 0 || col == 0 {
            return Err(ApiError::http(400, "Invalid cell coordinates"));
        }
        let target = inner.table_mut(table)?;
        set_cell(&mut target.grid, row, col, value);
        Ok(())
    }

    fn append_row(&self, table: &TableHandle, values: &[String]) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::AppendRow)?;
        let target = inner.table_mut(table)?;
        let used = visible_values(&target.grid).len();
        target.grid.truncate(used);
        target.grid.push(values.to_vec());
        Ok(())
    }

    fn read_all_values(&self, table: &TableHandle) -> Result<Grid, ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::ReadAllValues)?;
        let target = inner.table_mut(table)?;
        Ok(visible_values(&target.grid))
    }

    fn clear_table(&self, table: &TableHandle) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.begin(Operation::ClearTable)?;
        let target = inner.table_mut(table)?;
        target.grid.clear();
        Ok(())
    }
}

/// Hands out the shared [`MemorySheets`] as an authorized client.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    sheets: MemorySheets,
}

impl Connector for MemoryConnector {
    fn authorize(&self, credential: &ServiceAccountKey) -> Result<Arc<dyn SheetsApi>, DataError> {
        let mut inner = self.sheets.lock();
        inner.calls.authorize += 1;
        inner.last_credential = Some(credential.clone());
        drop(inner);
        Ok(Arc::new(self.sheets.clone()))
    }
}
