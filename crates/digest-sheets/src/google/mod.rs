//! Google Sheets v4 implementation of [`SheetsApi`].

mod token;

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::a1;
use crate::config::{ConfigError, ServiceAccountKey};
use crate::error::{ApiError, DataError};
use crate::remote::{pad_grid, Connector, Grid, SheetsApi, StoreHandle, TableHandle};

pub use token::{TokenProvider, SHEETS_SCOPE};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Path-segment encoding: everything except RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

pub(crate) fn transport_error(err: reqwest::Error) -> ApiError {
    match err.status() {
        Some(status) => ApiError::http(status.as_u16(), err.to_string()),
        None => ApiError::transport(err.to_string()),
    }
}

/// Turn a non-2xx response into an [`ApiError`] carrying the raw body, which is
/// where Google puts `rateLimitExceeded` and friends.
pub(crate) fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ApiError::http(status.as_u16(), body))
}

fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json()
        .map_err(|e| ApiError::transport(format!("invalid response body: {e}")))
}

/// Render a cell value the way it is displayed. Unformatted numbers and
/// booleans only show up if the API is asked for them, but stay readable.
fn cell_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => (if b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMeta {
    #[serde(default)]
    spreadsheet_id: Option<String>,
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<BatchReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchReply {
    #[serde(default)]
    add_sheet: Option<SheetEntry>,
}

/// Authorizes service accounts against the Sheets API.
#[derive(Debug, Clone)]
pub struct GoogleConnector {
    base_url: String,
    timeout: Duration,
}

impl Default for GoogleConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl GoogleConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self, credential: &ServiceAccountKey) -> Result<GoogleSheetsClient, DataError> {
        let tokens = TokenProvider::new(credential)?;
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(GoogleSheetsClient {
            http,
            tokens,
            base_url: self.base_url.clone(),
        })
    }
}

impl Connector for GoogleConnector {
    fn authorize(&self, credential: &ServiceAccountKey) -> Result<Arc<dyn SheetsApi>, DataError> {
        Ok(Arc::new(self.client(credential)?))
    }
}

/// Blocking Sheets v4 client. Every call fetches or reuses a bearer token.
#[derive(Debug)]
pub struct GoogleSheetsClient {
    http: Client,
    tokens: TokenProvider,
    base_url: String,
}

impl GoogleSheetsClient {
    fn spreadsheet_url(&self, store_id: &str) -> String {
        format!("{}/spreadsheets/{}", self.base_url, encode_segment(store_id))
    }

    fn values_url(&self, table: &TableHandle, range: &str, action: &str) -> String {
        let range = a1::sheet_range(&table.title, range);
        format!(
            "{}/spreadsheets/{}/values/{}{action}",
            self.base_url,
            encode_segment(&table.store_id),
            encode_segment(&range)
        )
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let token = self.tokens.bearer(&self.http)?;
        let response = request.bearer_auth(token).send().map_err(transport_error)?;
        check_status(response)
    }

    fn put_values(&self, table: &TableHandle, range: &str, values: &[Vec<String>]) -> Result<(), ApiError> {
        let body = json!({
            "range": a1::sheet_range(&table.title, range),
            "majorDimension": "ROWS",
            "values": values,
        });
        let request = self
            .http
            .put(self.values_url(table, range, ""))
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        self.send(request)?;
        Ok(())
    }
}

impl SheetsApi for GoogleSheetsClient {
    fn open_store(&self, store_id: &str) -> Result<StoreHandle, ApiError> {
        let request = self
            .http
            .get(self.spreadsheet_url(store_id))
            .query(&[("fields", "spreadsheetId,properties.title")]);
        let meta: SpreadsheetMeta = read_json(self.send(request)?)?;
        Ok(StoreHandle {
            id: meta.spreadsheet_id.unwrap_or_else(|| store_id.to_string()),
            title: meta.properties.map(|p| p.title).unwrap_or_default(),
        })
    }

    fn list_tables(&self, store: &StoreHandle) -> Result<Vec<TableHandle>, ApiError> {
        let request = self
            .http
            .get(self.spreadsheet_url(&store.id))
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let meta: SpreadsheetMeta = read_json(self.send(request)?)?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| TableHandle {
                store_id: store.id.clone(),
                sheet_id: sheet.properties.sheet_id,
                title: sheet.properties.title,
            })
            .collect())
    }

    fn create_table(
        &self,
        store: &StoreHandle,
        title: &str,
        rows: u32,
        cols: u32,
    ) -> Result<TableHandle, ApiError> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols },
                    }
                }
            }]
        });
        let url = format!("{}:batchUpdate", self.spreadsheet_url(&store.id));
        let reply: BatchUpdateResponse = read_json(self.send(self.http.post(url).json(&body))?)?;
        let properties = reply
            .replies
            .into_iter()
            .find_map(|r| r.add_sheet)
            .map(|sheet| sheet.properties)
            .ok_or_else(|| ApiError::transport("addSheet reply is missing sheet properties"))?;
        Ok(TableHandle {
            store_id: store.id.clone(),
            sheet_id: properties.sheet_id,
            title: properties.title,
        })
    }

    fn write_range(&self, table: &TableHandle, range: &str, values: &[Vec<String>]) -> Result<(), ApiError> {
        self.put_values(table, range, values)
    }

    fn write_cell(&self, table: &TableHandle, row: u32, col: u32, value: &str) -> Result<(), ApiError> {
        self.put_values(table, &a1::cell_ref(row, col), &[vec![value.to_string()]])
    }

    fn append_row(&self, table: &TableHandle, values: &[String]) -> Result<(), ApiError> {
        let body = json!({ "majorDimension": "ROWS", "values": [values] });
        let request = self
            .http
            .post(self.values_url(table, "A1", ":append"))
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body);
        self.send(request)?;
        Ok(())
    }

    fn read_all_values(&self, table: &TableHandle) -> Result<Grid, ApiError> {
        let request = self
            .http
            .get(self.values_url(table, "", ""))
            .query(&[("majorDimension", "ROWS")]);
        let range: ValueRange = read_json(self.send(request)?)?;
        Ok(pad_grid(
            range
                .values
                .into_iter()
                .map(|row| row.into_iter().map(cell_text).collect())
                .collect(),
        ))
    }

    fn clear_table(&self, table: &TableHandle) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.values_url(table, "", ":clear"))
            .json(&json!({}));
        self.send(request)?;
        Ok(())
    }
}
