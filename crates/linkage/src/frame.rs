use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::LinkageError;
use crate::spatial::Geometry;

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A single cell. CSV input only ever produces `Null` and `Text`; `Number`
/// comes out of aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the cell. Text is parsed after trimming; NaN and
    /// infinities are treated as absent.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            Self::Null => return None,
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }

    /// Join-key view of the cell. Null never takes part in a join.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// ---------------------------------------------------------------------------
// CSV options
// ---------------------------------------------------------------------------

/// Columns holding projected x/y coordinates of a point geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PointColumns {
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub points: Option<PointColumns>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            points: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// An in-memory table: named columns, rows of values, and optional
/// per-row geometry.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    geometry: Option<Vec<Option<Geometry>>>,
    geometry_columns: Vec<String>,
}

impl Frame {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Result<Self, LinkageError> {
        let name = name.into();
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(LinkageError::ConfigValidation(format!(
                    "dataset '{name}': duplicate column '{col}'"
                )));
            }
        }
        Ok(Self {
            name,
            columns,
            rows: Vec::new(),
            geometry: None,
            geometry_columns: Vec::new(),
        })
    }

    /// Build a frame from string rows. Empty strings become `Null`.
    pub fn from_rows(name: &str, columns: &[&str], rows: &[&[&str]]) -> Result<Self, LinkageError> {
        let mut frame = Self::new(name, columns.iter().map(|c| c.to_string()).collect())?;
        for row in rows {
            frame.push_row(row.iter().map(|v| text_or_null(v)).collect())?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), LinkageError> {
        if self.geometry.is_some() {
            return self.push_row_with_geometry(row, None);
        }
        self.check_arity(&row)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn push_row_with_geometry(
        &mut self,
        row: Vec<Value>,
        geometry: Option<Geometry>,
    ) -> Result<(), LinkageError> {
        self.check_arity(&row)?;
        let rows_so_far = self.rows.len();
        self.geometry
            .get_or_insert_with(|| vec![None; rows_so_far])
            .push(geometry);
        self.rows.push(row);
        Ok(())
    }

    fn check_arity(&self, row: &[Value]) -> Result<(), LinkageError> {
        if row.len() != self.columns.len() {
            return Err(LinkageError::ConfigValidation(format!(
                "dataset '{}': row has {} values, expected {}",
                self.name,
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// Mark columns that encode geometry; they are skipped by buffer aggregation.
    pub fn set_geometry_columns(&mut self, columns: Vec<String>) {
        self.geometry_columns = columns;
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn geometry_columns(&self) -> &[String] {
        &self.geometry_columns
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn geometry(&self, row: usize) -> Option<&Geometry> {
        self.geometry.as_ref()?.get(row)?.as_ref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, name: &str) -> Result<usize, LinkageError> {
        self.column_index(name).ok_or_else(|| LinkageError::MissingColumn {
            dataset: self.name.clone(),
            column: name.into(),
        })
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    // -----------------------------------------------------------------------
    // CSV
    // -----------------------------------------------------------------------

    /// Parse CSV text (with headers). When `options.points` is set, rows get
    /// a point geometry from the two coordinate columns; rows whose
    /// coordinates do not parse get none.
    pub fn from_csv(name: &str, data: &str, options: &CsvOptions) -> Result<Self, LinkageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter)
            .from_reader(data.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut frame = Self::new(name, headers)?;

        let point_idx = match &options.points {
            Some(p) => Some((frame.require_column(&p.x)?, frame.require_column(&p.y)?)),
            None => None,
        };

        for record in reader.records() {
            let record = record?;
            let row: Vec<Value> = (0..frame.columns.len())
                .map(|i| text_or_null(record.get(i).unwrap_or("")))
                .collect();

            match point_idx {
                Some((xi, yi)) => {
                    let geom = match (row[xi].as_f64(), row[yi].as_f64()) {
                        (Some(x), Some(y)) => Some(Geometry::point(x, y)),
                        _ => None,
                    };
                    frame.push_row_with_geometry(row, geom)?;
                }
                None => frame.push_row(row)?,
            }
        }

        if let Some(p) = &options.points {
            frame.set_geometry_columns(vec![p.x.clone(), p.y.clone()]);
            if frame.geometry.is_none() {
                frame.geometry = Some(Vec::new());
            }
        }

        log::debug!("loaded '{}': {} rows, {} columns", frame.name, frame.len(), frame.columns.len());
        Ok(frame)
    }

    /// Render as CSV text with a header row. Geometry is not written; point
    /// coordinates survive as ordinary columns.
    pub fn to_csv(&self) -> Result<String, LinkageError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LinkageError::Csv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| LinkageError::Csv(e.to_string()))
    }
}

fn text_or_null(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}
