//! A1-notation helpers for addressing cells in the remote store.
//!
//! Rows and columns are 1-based here, matching the Sheets API.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A1ParseError {
    Empty,
    InvalidColumn,
    InvalidRow,
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            A1ParseError::Empty => "empty cell reference",
            A1ParseError::InvalidColumn => "invalid column letters",
            A1ParseError::InvalidRow => "invalid row number",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for A1ParseError {}

/// `1 -> "A"`, `26 -> "Z"`, `27 -> "AA"`.
pub fn col_to_name(col: u32) -> String {
    let mut n = col.max(1);
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

fn name_to_col(s: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        let v = (b.to_ascii_uppercase() - b'A') as u32 + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(v))
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    if col == 0 {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col)
}

/// `(5, 2) -> "B5"`.
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", col_to_name(col), row.max(1))
}

/// Parse a single cell reference such as `B5` (or `$B$5`) into `(row, col)`.
pub fn parse_cell_ref(s: &str) -> Result<(u32, u32), A1ParseError> {
    let s: String = s.trim().chars().filter(|c| *c != '$').collect();
    if s.is_empty() {
        return Err(A1ParseError::Empty);
    }
    let split = s
        .find(|c: char| c.is_ascii_digit())
        .ok_or(A1ParseError::InvalidRow)?;
    let (letters, digits) = s.split_at(split);
    let col = name_to_col(letters)?;
    let row: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
    if row == 0 {
        return Err(A1ParseError::InvalidRow);
    }
    Ok((row, col))
}

/// Quote a sheet title for use in a range: `Read Status` -> `'Read Status'`.
pub fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Prefix a range with its sheet: `('ReadStatus', "B5") -> "'ReadStatus'!B5"`.
/// An empty range addresses the whole sheet.
pub fn sheet_range(title: &str, range: &str) -> String {
    if range.is_empty() {
        quote_sheet_title(title)
    } else {
        format!("{}!{range}", quote_sheet_title(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_wrap_after_z() {
        assert_eq!(col_to_name(1), "A");
        assert_eq!(col_to_name(2), "B");
        assert_eq!(col_to_name(26), "Z");
        assert_eq!(col_to_name(27), "AA");
        assert_eq!(col_to_name(702), "ZZ");
        assert_eq!(col_to_name(703), "AAA");
    }

    #[test]
    fn cell_refs_parse_with_and_without_anchors() {
        assert_eq!(cell_ref(5, 2), "B5");
        assert_eq!(parse_cell_ref("B5"), Ok((5, 2)));
        assert_eq!(parse_cell_ref("$AA$10"), Ok((10, 27)));
        assert_eq!(parse_cell_ref("a1"), Ok((1, 1)));
    }

    #[test]
    fn malformed_refs_are_rejected() {
        assert_eq!(parse_cell_ref(""), Err(A1ParseError::Empty));
        assert_eq!(parse_cell_ref("B"), Err(A1ParseError::InvalidRow));
        assert_eq!(parse_cell_ref("B0"), Err(A1ParseError::InvalidRow));
        assert_eq!(parse_cell_ref("5"), Err(A1ParseError::InvalidColumn));
        assert_eq!(parse_cell_ref("B1x"), Err(A1ParseError::InvalidRow));
    }

    #[test]
    fn sheet_titles_are_quoted() {
        assert_eq!(sheet_range("ReadStatus", "A1"), "'ReadStatus'!A1");
        assert_eq!(sheet_range("Bob's list", ""), "'Bob''s list'");
    }
}
