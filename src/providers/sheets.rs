//! Spreadsheet sources.
//!
//! Rows come from records embedded in the project (`rows`), from a workbook
//! (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`) or from a JSON records file in
//! the project's excel directory.
//!
//! A workbook sheet's first row holds the column headers. A records file is
//! either an array of row objects or an object keyed by sheet name whose
//! values are such arrays. `sheet_name` selects the sheet; workbooks default
//! to their first sheet.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto};
use serde_json::{Number, Value};
use tracing::{debug, info};

use super::SheetProvider;
use crate::config::{ExcelSource, ResourceId, Row};

#[derive(Debug, Clone, Default)]
pub struct SheetStore {
    sources: Vec<ExcelSource>,
    excel_dir: PathBuf,
}

impl SheetStore {
    pub fn new(sources: Vec<ExcelSource>, excel_dir: impl Into<PathBuf>) -> Self {
        Self {
            sources,
            excel_dir: excel_dir.into(),
        }
    }

    pub fn source(&self, id: ResourceId) -> Option<&ExcelSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    fn read_file_rows(&self, source: &ExcelSource) -> Result<Vec<Row>> {
        let path = self.excel_dir.join(&source.filepath);
        if !path.is_file() {
            bail!("spreadsheet file not found: {}", path.display());
        }
        match extension(&path).as_deref() {
            Some("json") => read_json_rows(&path, source.sheet_name.as_deref()),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => {
                read_workbook_rows(&path, source.sheet_name.as_deref())
            }
            other => bail!(
                "unsupported spreadsheet format {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ),
        }
    }
}

fn read_json_rows(path: &Path, sheet_name: Option<&str>) -> Result<Vec<Row>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let records = match (doc, sheet_name) {
        (Value::Array(items), _) => Value::Array(items),
        (Value::Object(mut sheets), Some(sheet)) => sheets
            .remove(sheet)
            .ok_or_else(|| anyhow!("sheet '{sheet}' not found in {}", path.display()))?,
        (Value::Object(_), None) => {
            bail!("{} holds several sheets but no sheet_name is set", path.display())
        }
        _ => bail!("{} is not a list of records", path.display()),
    };
    serde_json::from_value(records)
        .with_context(|| format!("Rows in {} must be JSON objects", path.display()))
}

fn read_workbook_rows(path: &Path, sheet_name: Option<&str>) -> Result<Vec<Row>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("{} has no sheets", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("sheet '{sheet}' not found in {}", path.display()))?;

    let mut lines = range.rows();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("Unnamed: {i}"),
            other => other.to_string(),
        })
        .collect();
    debug!(target: "macroflow::providers", sheet = %sheet, columns = headers.len(), "Workbook sheet opened");

    Ok(lines
        .filter(|cells| cells.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .map(|(name, cell)| (name.clone(), cell_value(cell)))
                .collect()
        })
        .collect())
}

/// Workbook cell as a JSON value. Whole floats become integers, as spreadsheets store every number as a float.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(*f as i64),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        other => Value::String(other.to_string()),
    }
}

impl SheetProvider for SheetStore {
    fn source_ids(&self) -> Vec<ResourceId> {
        self.sources.iter().map(|s| s.id).collect()
    }

    fn load_rows(&self, source_id: ResourceId) -> Result<Vec<Row>> {
        let source = self
            .source(source_id)
            .ok_or_else(|| anyhow!("spreadsheet source {source_id} not found"))?;
        info!(target: "macroflow::providers", id = source_id, name = %source.name, "Loading spreadsheet rows");

        let rows = match &source.rows {
            Some(rows) => rows.clone(),
            None => self.read_file_rows(source)?,
        };
        let rows = project_columns(rows, &source.columns)?;
        debug!(target: "macroflow::providers", id = source_id, rows = rows.len(), "Spreadsheet rows loaded");
        Ok(rows)
    }

    fn row_count(&self, source_id: ResourceId) -> Option<usize> {
        let source = self.source(source_id)?;
        source
            .row_count
            .or_else(|| source.rows.as_ref().map(Vec::len))
    }
}

/// Keep only the selected columns. A selected column absent from every row is an error.
fn project_columns(rows: Vec<Row>, columns: &[String]) -> Result<Vec<Row>> {
    if columns.is_empty() || rows.is_empty() {
        return Ok(rows);
    }
    let present: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();
    let missing: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !present.contains(c))
        .collect();
    if !missing.is_empty() {
        bail!("columns not present in sheet: {missing:?}");
    }
    Ok(rows
        .into_iter()
        .map(|mut row| {
            row.retain(|k, _| columns.iter().any(|c| c == k));
            row
        })
        .collect())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
