//! Loosely typed tabular data
//!
//! Raw customer exports have no schema, so every cell is parsed on its own:
//! empty fields are missing, anything that parses as a float is a number and
//! the rest is text. Column types are decided later by the preprocessor.

use crate::error::{PipelineError, PipelineResult};
use crate::store::ArtifactStore;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

const CSV_EXTENSION: &str = ".csv";

/// Single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    fn parse(field: &str) -> Self {
        let field = field.trim();
        if field.is_empty() {
            return Cell::Missing;
        }
        match field.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            _ => Cell::Text(field.to_string()),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Missing,
            Value::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => n.as_f64().map_or(Cell::Missing, Cell::Number),
            Value::String(s) => Cell::parse(s),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Text form used for category encoding and CSV output
    pub fn render(&self) -> String {
        match self {
            Cell::Number(value) => value.to_string(),
            Cell::Text(text) => text.clone(),
            Cell::Missing => String::new(),
        }
    }

    /// Hashable identity, used to find duplicate rows
    fn key(&self) -> CellKey {
        match self {
            Cell::Number(value) => CellKey::Number(value.to_bits()),
            Cell::Text(text) => CellKey::Text(text.clone()),
            Cell::Missing => CellKey::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Number(u64),
    Text(String),
    Missing,
}

/// Named columns over rows of cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Build a dataset; every row must have one cell per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> PipelineResult<Self> {
        if let Some(row) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(PipelineError::InvalidData(format!(
                "row {row} has {} cells, expected {}",
                rows[row].len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parse CSV bytes with a header row
    pub fn from_csv(artifact: &str, bytes: &[u8]) -> PipelineResult<Self> {
        let csv_error = |source| PipelineError::Csv {
            artifact: artifact.to_string(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(Cell::parse).collect());
        }
        Self::new(columns, rows)
    }

    /// Build from JSON objects; keys become columns in first-seen order
    pub fn from_records(records: &[Map<String, Value>]) -> PipelineResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map_or(Cell::Missing, Cell::from_json))
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    /// Stack datasets; columns are the union in first-seen order and absent
    /// columns are filled with missing cells
    pub fn concat(datasets: Vec<Dataset>) -> Dataset {
        let mut columns: Vec<String> = Vec::new();
        for dataset in &datasets {
            for column in &dataset.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for dataset in datasets {
            let positions: Vec<Option<usize>> = columns
                .iter()
                .map(|c| dataset.column_index(c))
                .collect();
            for row in dataset.rows {
                rows.push(
                    positions
                        .iter()
                        .map(|pos| pos.map_or(Cell::Missing, |i| row[i].clone()))
                        .collect(),
                );
            }
        }
        Dataset { columns, rows }
    }

    /// Serialize with a header row
    pub fn to_csv(&self) -> PipelineResult<Vec<u8>> {
        let csv_error = |source| PipelineError::Csv {
            artifact: "processed data".to_string(),
            source,
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns).map_err(csv_error)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(Cell::render))
                .map_err(csv_error)?;
        }
        writer.into_inner().map_err(|e| PipelineError::Csv {
            artifact: "processed data".to_string(),
            source: e.into_error().into(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub(crate) fn require_column(&self, name: &str) -> PipelineResult<usize> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Numeric matrix over `columns`, one row per record
    pub fn numeric_matrix(&self, columns: &[String]) -> PipelineResult<Vec<Vec<f64>>> {
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<PipelineResult<Vec<_>>>()?;
        self.rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| {
                        row[i].as_number().ok_or_else(|| {
                            PipelineError::InvalidData(format!(
                                "column {:?} is not numeric",
                                self.columns[i]
                            ))
                        })
                    })
                    .collect::<PipelineResult<Vec<f64>>>()
            })
            .collect()
    }

    /// Keep rows without missing cells
    pub fn drop_missing(&mut self) {
        self.rows.retain(|row| !row.iter().any(Cell::is_missing));
    }

    /// Keep the first occurrence of every distinct row
    pub fn drop_duplicates(&mut self) {
        let mut seen = HashSet::new();
        self.rows
            .retain(|row| seen.insert(row.iter().map(Cell::key).collect::<Vec<_>>()));
    }

    /// Remove a column, returning whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        true
    }

    /// Append a column; `cells` holds one cell per row
    pub fn push_column(&mut self, name: &str, cells: Vec<Cell>) -> PipelineResult<()> {
        if cells.len() != self.rows.len() {
            return Err(PipelineError::InvalidData(format!(
                "column {name} has {} cells for {} rows",
                cells.len(),
                self.rows.len()
            )));
        }
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
        self.columns.push(name.to_string());
        Ok(())
    }

    /// Replace every cell of one column
    pub(crate) fn map_column<F>(&mut self, index: usize, mut map: F) -> PipelineResult<()>
    where
        F: FnMut(&Cell) -> PipelineResult<Cell>,
    {
        for row in &mut self.rows {
            row[index] = map(&row[index])?;
        }
        Ok(())
    }
}

/// Load and stack every CSV file under `prefix`
///
/// Files are read in name order.
pub async fn load_raw_data(store: &dyn ArtifactStore, prefix: &str) -> PipelineResult<Dataset> {
    let mut handles: Vec<_> = store
        .list(prefix)
        .await?
        .into_iter()
        .filter(|h| h.name.ends_with(CSV_EXTENSION))
        .collect();
    if handles.is_empty() {
        return Err(PipelineError::NoRawData(prefix.to_string()));
    }
    handles.sort_by(|a, b| a.name.cmp(&b.name));

    let mut datasets = Vec::with_capacity(handles.len());
    for handle in &handles {
        let bytes = store.read(&handle.name).await?;
        let dataset = Dataset::from_csv(&handle.name, &bytes)?;
        debug!(file = %handle.name, records = dataset.len(), "Loaded raw data file");
        datasets.push(dataset);
    }

    let dataset = Dataset::concat(datasets);
    info!(
        prefix = %prefix,
        files = handles.len(),
        records = dataset.len(),
        "Loaded raw customer data"
    );
    Ok(dataset)
}
