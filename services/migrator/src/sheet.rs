//! Spreadsheet access: source resolution, fingerprinting and sheet loading.
//!
//! Workbooks (xlsx, xls, xlsb, ods) are read with calamine, CSV exports with
//! the csv crate. Either way the result is a [`Sheet`]: a lowercase header
//! plus loosely-typed rows.

use calamine::{open_workbook_auto, Data, Range, Reader};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::MigrateError;

/// Workbook name used by the fallback candidate locations
pub const DEFAULT_WORKBOOK: &str = "rappi_data.xlsx";

/// Loosely-typed cell as it comes out of the source file
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            // Excel error cells (#N/A, #DIV/0!) carry no value
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Text(b.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// One sheet of the source: normalized column names and raw rows
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Borrowed view of a single row
#[derive(Debug, Clone, Copy)]
pub struct RawRow<'a> {
    cells: &'a [CellValue],
}

impl<'a> RawRow<'a> {
    /// Cell at column index `idx`; short rows read as empty
    pub fn cell(&self, idx: usize) -> &'a CellValue {
        self.cells.get(idx).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| match c {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        })
    }
}

impl Sheet {
    /// Build a sheet, lowercasing and trimming the header names
    pub fn new(name: impl Into<String>, header: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            columns: header.iter().map(|h| h.trim().to_lowercase()).collect(),
            rows,
        }
    }

    pub fn raw_rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.rows.iter().map(|cells| RawRow { cells })
    }
}

/// Locations searched for the spreadsheet, in order
pub fn candidate_paths(file: &Path, base: &Path) -> Vec<PathBuf> {
    vec![
        file.to_path_buf(),
        base.join(file),
        base.join("..").join(file),
        base.join("..").join("..").join(file),
        base.join("..").join("..").join(DEFAULT_WORKBOOK),
        base.join("..")
            .join("..")
            .join("data")
            .join("raw")
            .join(DEFAULT_WORKBOOK),
    ]
}

/// First candidate that exists as a file
pub fn resolve_source(file: &Path, base: &Path) -> Result<PathBuf, MigrateError> {
    let tried = candidate_paths(file, base);
    match tried.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(MigrateError::SourceNotFound { tried }),
    }
}

/// SHA-256 of the file contents, recorded for provenance
pub fn fingerprint(path: &Path) -> Result<String, MigrateError> {
    let bytes = std::fs::read(path)?;
    Ok(format!("sha256:{:x}", Sha256::digest(&bytes)))
}

pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Load a sheet by name.
///
/// CSV files hold exactly one sheet, returned regardless of `sheet`. For
/// workbooks, a missing sheet yields `None`, unless `fallback_to_first` is set,
/// in which case the first sheet is used instead.
pub fn load_sheet(
    path: &Path,
    sheet: &str,
    fallback_to_first: bool,
) -> Result<Option<Sheet>, MigrateError> {
    if is_csv(path) {
        return read_csv(path).map(Some);
    }

    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_vec();
    if names.is_empty() {
        return Err(MigrateError::NoSheets(path.to_path_buf()));
    }

    let Some(chosen) = choose_sheet(&names, sheet, fallback_to_first) else {
        return Ok(None);
    };
    if chosen != sheet {
        warn!(
            "sheet '{}' not found in {}, using first sheet '{}'",
            sheet,
            path.display(),
            chosen
        );
    }

    let range = workbook.worksheet_range(&chosen)?;
    let (rows, cols) = range.get_size();
    info!("Read sheet '{}': {} rows x {} columns", chosen, rows, cols);
    Ok(Some(sheet_from_range(&chosen, &range)))
}

/// Exact name match, else the first sheet when `fallback_to_first` is set
fn choose_sheet(names: &[String], sheet: &str, fallback_to_first: bool) -> Option<String> {
    names
        .iter()
        .find(|n| n.as_str() == sheet)
        .or_else(|| names.first().filter(|_| fallback_to_first))
        .cloned()
}

fn sheet_from_range(name: &str, range: &Range<Data>) -> Sheet {
    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(cells) => cells
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.clone(),
                Data::Empty => String::new(),
                other => other.to_string(),
            })
            .collect(),
        None => {
            warn!("sheet '{}' is empty", name);
            return Sheet::new(name, Vec::new(), Vec::new());
        }
    };

    let data = rows
        .map(|cells| cells.iter().map(CellValue::from).collect())
        .collect();
    Sheet::new(name, header, data)
}

/// Read a CSV export as a single sheet named after the file
pub fn read_csv(path: &Path) -> Result<Sheet, MigrateError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("csv")
        .to_string();
    parse_csv(&name, &bytes)
}

/// Parse CSV bytes. Non UTF-8 exports are decoded as Windows-1252.
pub fn parse_csv(name: &str, bytes: &[u8]) -> Result<Sheet, MigrateError> {
    let content = decode(bytes);
    let content = content.strip_prefix('\u{feff}').unwrap_or(content.as_ref());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Sheet::new(name, header, rows))
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text
        }
    }
}
