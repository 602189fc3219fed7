//! Column mapping, record building and last-write-wins deduplication.
//!
//! This module is DETERMINISTIC: the same sheet always yields the same
//! records in the same order. Callers must still treat the order of
//! deduplicated records as unspecified.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use tracing::info;

use crate::cleaners::{clean_integer, clean_numeric, clean_string};
use crate::schema::{ColumnRole, Schema};
use crate::sheet::{RawRow, Sheet};

/// A cleaned value. The variant fixes the column type, `None` means absent.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Field {
    Text(Option<String>),
    Number(Option<f64>),
    Integer(Option<i64>),
}

impl Field {
    fn key_part(&self) -> Option<String> {
        match self {
            Field::Text(v) => v.clone(),
            Field::Number(v) => v.map(|n| n.to_string()),
            Field::Integer(v) => v.map(|n| n.to_string()),
        }
    }
}

/// One cleaned row: exactly the selected canonical columns, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(&'static str, Field)>,
}

impl Record {
    pub fn new(fields: Vec<(&'static str, Field)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, field)| field)
    }

    pub fn fields(&self) -> &[(&'static str, Field)] {
        &self.fields
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    /// Identity key. A key column missing from the record counts as absent.
    pub fn key(&self, schema: &Schema) -> RecordKey {
        RecordKey(
            schema
                .key
                .iter()
                .map(|column| self.get(column).and_then(Field::key_part))
                .collect(),
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in &self.fields {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(pub Vec<Option<String>>);

/// A canonical column and the source column index feeding it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedColumn {
    pub name: &'static str,
    pub source: usize,
}

/// Rename legacy columns, then keep the schema columns present in the source.
///
/// Output follows schema order. If two source columns map to the same
/// canonical name, the leftmost one wins.
pub fn select_columns(schema: &Schema, source_columns: &[String]) -> Vec<SelectedColumn> {
    schema
        .columns
        .iter()
        .filter_map(|&name| {
            source_columns
                .iter()
                .position(|column| schema.canonical(column) == name)
                .map(|source| SelectedColumn { name, source })
        })
        .collect()
}

pub fn build_record(schema: &Schema, selection: &[SelectedColumn], row: RawRow<'_>) -> Record {
    let fields = selection
        .iter()
        .map(|column| {
            let cell = row.cell(column.source);
            let field = match schema.role_of(column.name) {
                ColumnRole::Text => Field::Text(clean_string(cell)),
                ColumnRole::Float => Field::Number(clean_numeric(cell)),
                ColumnRole::Integer => Field::Integer(clean_integer(cell)),
            };
            (column.name, field)
        })
        .collect();
    Record::new(fields)
}

/// Deduplicated records plus the counts reported to the operator
#[derive(Debug, Clone)]
pub struct Dedup {
    pub records: Vec<Record>,
    pub input: usize,
    pub removed: usize,
}

/// Keep the last record seen for each identity key.
///
/// Assumes source row order reflects recency. Survivors come out in the order
/// of their last occurrence, but that order is not part of the contract.
pub fn dedup_last_wins(schema: &Schema, records: Vec<Record>) -> Dedup {
    let input = records.len();
    let keys: Vec<RecordKey> = records.iter().map(|r| r.key(schema)).collect();

    let mut last: HashMap<&RecordKey, usize> = HashMap::with_capacity(input);
    for (idx, key) in keys.iter().enumerate() {
        last.insert(key, idx);
    }

    let records: Vec<Record> = records
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| last.get(&keys[*idx]) == Some(idx))
        .map(|(_, record)| record)
        .collect();

    let removed = input - records.len();
    Dedup {
        records,
        input,
        removed,
    }
}

/// Records for one table, ready for upload
#[derive(Debug, Clone)]
pub struct Prepared {
    pub table: &'static str,
    pub sheet: String,
    pub columns: Vec<&'static str>,
    pub rows: usize,
    pub blank_rows: usize,
    pub dedup: Dedup,
}

/// Full pipeline for one sheet: select, build, deduplicate.
///
/// Rows with every cell empty are skipped and counted in `blank_rows`; they
/// never become all-absent records.
pub fn prepare(schema: &Schema, sheet: &Sheet) -> Prepared {
    let selection = select_columns(schema, &sheet.columns);
    let columns: Vec<&'static str> = selection.iter().map(|c| c.name).collect();
    info!("[{}] available columns: {:?}", schema.table, columns);

    let mut blank_rows = 0;
    let mut records = Vec::with_capacity(sheet.rows.len());
    for row in sheet.raw_rows() {
        if row.is_blank() {
            blank_rows += 1;
            continue;
        }
        records.push(build_record(schema, &selection, row));
    }

    info!(
        "[{}] {} records before deduplication ({} blank rows skipped)",
        schema.table,
        records.len(),
        blank_rows
    );
    let dedup = dedup_last_wins(schema, records);
    info!(
        "[{}] {} records after deduplication, removed {} duplicates",
        schema.table,
        dedup.records.len(),
        dedup.removed
    );

    Prepared {
        table: schema.table,
        sheet: sheet.name.clone(),
        columns,
        rows: sheet.rows.len(),
        blank_rows,
        dedup,
    }
}
