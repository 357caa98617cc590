//! The article listing: item rows joined with their read flags.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::cache::TableSnapshot;
use crate::config::StoreConfig;
use crate::error::{DataError, Result};
use crate::store::DigestStore;
use crate::upsert::{STATUS_FLAG_COLUMN, STATUS_KEY_COLUMN};

const DATE_COLUMN: &str = "Date";
const AUTHOR_COLUMN: &str = "Author";
const TITLE_COLUMN: &str = "Title";
const SUBTITLE_COLUMN: &str = "Subtitle";
const URL_COLUMN: &str = "URL";
const CATEGORY_COLUMN: &str = "Category (20-class)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    /// The `Date` cell as written in the table.
    pub date_raw: String,
    pub date: Option<NaiveDate>,
    pub author: String,
    pub title: String,
    pub subtitle: String,
    pub url: String,
    pub category: String,
    /// Key into the status table; the article URL.
    pub item_key: String,
    pub read: bool,
}

/// `true`, `1` and `yes` (any case, surrounding whitespace ignored) are read.
pub fn parse_read_flag(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Lenient date parsing for hand-edited cells. Time of day is dropped.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

/// Item key -> read flag, from a status table snapshot.
///
/// A table without data rows yields an empty index. Otherwise both status
/// columns must be present. Blank keys are ignored and the last row for a key
/// wins.
pub fn read_status_index(table: &str, snapshot: &TableSnapshot) -> Result<HashMap<String, bool>> {
    if snapshot.is_empty() {
        return Ok(HashMap::new());
    }
    let missing = snapshot.missing_columns(&[
        STATUS_KEY_COLUMN.to_string(),
        STATUS_FLAG_COLUMN.to_string(),
    ]);
    if !missing.is_empty() {
        return Err(DataError::MissingColumns {
            table: table.to_string(),
            columns: missing,
        });
    }

    let mut index = HashMap::new();
    for row in snapshot.rows() {
        let key = snapshot.cell(row, STATUS_KEY_COLUMN).unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        let read = snapshot
            .cell(row, STATUS_FLAG_COLUMN)
            .is_some_and(parse_read_flag);
        index.insert(key.to_string(), read);
    }
    Ok(index)
}

fn to_article(snapshot: &TableSnapshot, row: &[String], status: &HashMap<String, bool>) -> Article {
    let text = |column: &str| snapshot.cell(row, column).unwrap_or("").to_string();
    let date_raw = text(DATE_COLUMN);
    let url = text(URL_COLUMN);
    Article {
        date: parse_date(&date_raw),
        date_raw,
        author: text(AUTHOR_COLUMN),
        title: text(TITLE_COLUMN),
        subtitle: text(SUBTITLE_COLUMN),
        category: text(CATEGORY_COLUMN),
        read: status.get(url.trim()).copied().unwrap_or(false),
        item_key: url.clone(),
        url,
    }
}

/// Every article in the item table with its read flag, in table order.
///
/// Returns `Ok(None)` when the item table holds no articles yet. A missing or
/// blank item table gets `config.required_columns` as its header so it can be
/// filled in by hand.
pub fn load_articles(store: &DigestStore, config: &StoreConfig) -> Result<Option<Vec<Article>>> {
    let store_id = config.spreadsheet_id.as_str();
    let items = store.load_table(store_id, &config.item_table)?;
    if items.is_empty() {
        // Reading already created the table if it was missing; give a blank
        // one its header row.
        if items.header().is_empty() {
            store.write_full_table(store_id, &config.item_table, &config.required_columns, &[])?;
        }
        log::warn!(
            "table {} has no articles yet; expected columns: {}",
            config.item_table,
            config.required_columns.join(", ")
        );
        return Ok(None);
    }

    let missing = items.missing_columns(&config.required_columns);
    if !missing.is_empty() {
        return Err(DataError::MissingColumns {
            table: config.item_table.clone(),
            columns: missing,
        });
    }

    let status = store.load_table(store_id, &config.status_table)?;
    let index = read_status_index(&config.status_table, &status)?;
    let articles: Vec<Article> = items
        .rows()
        .iter()
        .map(|row| to_article(&items, row, &index))
        .collect();
    log::debug!(
        "loaded {} article(s), {} marked read",
        articles.len(),
        articles.iter().filter(|a| a.read).count()
    );
    Ok(Some(articles))
}
