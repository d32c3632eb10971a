//! Roster loading: staff spreadsheet → ordered [`RosterEntry`] list.
//!
//! Workbooks (`.xlsx`, `.xlsm`, `.xls`, `.ods`) are read with calamine, CSV
//! files with the csv crate. Both are flattened to rows of strings first so
//! header resolution and row handling are shared.
//!
//! Row order is preserved: it is the tie-break order for identifier matching.

use crate::error::BatchError;
use calamine::{open_workbook_auto, Data, Reader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Name used when the roster has no name column or the cell is blank.
pub const DEFAULT_NAME: &str = "N/A";

const IDENTIFIER_ALIASES: &[&str] = &[
    "ippis number",
    "ippis no",
    "ippis",
    "staff id",
    "staff number",
    "identifier",
    "id",
];
const NAME_ALIASES: &[&str] = &["name", "full name", "staff name", "employee name"];
const EMAIL_ALIASES: &[&str] = &["email", "e mail", "email address", "mail"];

/// One staff member from the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Trimmed identifier, compared against page text.
    pub identifier: String,
    pub name: String,
    /// Destination address as written in the roster; validated at dispatch.
    pub email: String,
}

/// Which roster to read and how.
#[derive(Debug, Clone, Default)]
pub struct RosterOptions<'a> {
    /// Explicit identifier header; overrides the built-in aliases.
    pub identifier_column: Option<&'a str>,
    /// Worksheet name for workbooks; defaults to the first sheet.
    pub sheet: Option<&'a str>,
}

/// Load a roster file, choosing the parser from the file extension.
pub fn load_roster(path: &Path, options: &RosterOptions<'_>) -> Result<Vec<RosterEntry>, BatchError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "csv" | "txt" => read_csv_rows(path)?,
        _ => read_workbook_rows(path, options.sheet)?,
    };

    let entries = entries_from_rows(path, rows, options.identifier_column)?;
    info!(
        "Roster loaded: {} entries from {}",
        entries.len(),
        path.display()
    );
    Ok(entries)
}

/// Turn raw rows (header first) into roster entries.
///
/// Rows with a blank identifier are skipped: an empty identifier would match
/// every page that carries the label.
pub fn entries_from_rows(
    path: &Path,
    rows: Vec<Vec<String>>,
    identifier_column: Option<&str>,
) -> Result<Vec<RosterEntry>, BatchError> {
    let mut rows = rows
        .into_iter()
        .skip_while(|r| r.iter().all(|c| c.trim().is_empty()));

    let header = rows.next().ok_or_else(|| BatchError::RosterParse {
        path: path.to_path_buf(),
        detail: "roster is empty".into(),
    })?;

    let id_col = match identifier_column {
        Some(name) => find_column(&header, &[name]),
        None => find_column(&header, IDENTIFIER_ALIASES),
    }
    .ok_or_else(|| BatchError::MissingIdentifierColumn {
        path: path.to_path_buf(),
        expected: identifier_column
            .map(|c| c.to_string())
            .unwrap_or_else(|| IDENTIFIER_ALIASES.join(", ")),
    })?;
    let name_col = find_column(&header, NAME_ALIASES);
    let email_col = find_column(&header, EMAIL_ALIASES);
    debug!(
        "Roster columns: identifier={}, name={:?}, email={:?}",
        id_col, name_col, email_col
    );

    let cell = |row: &[String], col: Option<usize>| -> String {
        col.and_then(|c| row.get(c))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut entries = Vec::new();
    for (line, row) in rows.enumerate() {
        let identifier = cell(&row, Some(id_col));
        if identifier.is_empty() {
            debug!("Skipping roster row {}: no identifier", line + 2);
            continue;
        }
        let name = cell(&row, name_col);
        entries.push(RosterEntry {
            identifier,
            name: if name.is_empty() {
                DEFAULT_NAME.to_string()
            } else {
                name
            },
            email: cell(&row, email_col),
        });
    }
    Ok(entries)
}

/// Lower-case and collapse `_`, `-` and runs of whitespace to one space.
fn normalize_header(h: &str) -> String {
    h.to_lowercase()
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First alias (in alias order) present in the header row.
fn find_column(header: &[String], aliases: &[&str]) -> Option<usize> {
    let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
    aliases.iter().find_map(|alias| {
        let alias = normalize_header(alias);
        normalized.iter().position(|h| *h == alias)
    })
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| roster_error(path, e))?;

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| roster_error(path, e))
        })
        .collect()
}

fn read_workbook_rows(path: &Path, sheet: Option<&str>) -> Result<Vec<Vec<String>>, BatchError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| roster_error(path, e))?;

    let sheet_name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| BatchError::RosterParse {
                path: path.to_path_buf(),
                detail: "workbook has no worksheets".into(),
            })?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| roster_error(path, e))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Render a cell as the identifier text a payslip would print.
///
/// Staff numbers typed into a spreadsheet come back as floats; `12345.0`
/// must compare equal to the `12345` printed on the page.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn roster_error(path: &Path, e: impl std::fmt::Display) -> BatchError {
    BatchError::RosterParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
