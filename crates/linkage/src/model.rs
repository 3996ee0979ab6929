use std::collections::HashSet;

use serde::{Serialize, Serializer};

use crate::config::DatasetSchema;
use crate::error::LinkageError;
use crate::spatial::Geometry;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One row of a dataset, reduced to the columns its schema names.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub postcode: Option<String>,
    /// Raw value per schema address column, in schema order.
    pub addresses: Vec<Option<String>>,
    pub geometry: Option<Geometry>,
}

impl Record {
    pub fn new(id: &str, postcode: Option<&str>, addresses: &[Option<&str>]) -> Self {
        Self {
            id: id.into(),
            postcode: postcode.map(Into::into),
            addresses: addresses.iter().map(|a| a.map(Into::into)).collect(),
            geometry: None,
        }
    }
}

/// Records of one dataset with unique ids.
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: DatasetSchema,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(schema: DatasetSchema, records: Vec<Record>) -> Result<Self, LinkageError> {
        schema.validate()?;
        let mut ids = HashSet::with_capacity(records.len());
        for record in &records {
            if record.addresses.len() != schema.addresses.len() {
                return Err(LinkageError::ConfigValidation(format!(
                    "dataset '{}', record '{}': {} address values, expected {}",
                    schema.name,
                    record.id,
                    record.addresses.len(),
                    schema.addresses.len()
                )));
            }
            if !ids.insert(record.id.as_str()) {
                return Err(LinkageError::DuplicateKey {
                    dataset: schema.name.clone(),
                    key: record.id.clone(),
                });
            }
        }
        Ok(Self { schema, records })
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Comparable form of a record, derived without touching its raw fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
    /// Cleaned value per address column; `None` where the raw value is missing.
    pub addresses: Vec<Option<String>>,
    /// Sorted numeric-token string per numbers column.
    pub numbers: Vec<Option<String>>,
    /// Cleaned postcode, `""` when missing.
    pub postcode: String,
}

// ---------------------------------------------------------------------------
// Candidate table
// ---------------------------------------------------------------------------

/// A similarity feature value. `Sentinel` stands for "no information" and
/// reads as 1.0; only the row's [`MatchPath`] tells it apart from a real
/// perfect score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureScore {
    Scored(f64),
    Sentinel,
}

impl FeatureScore {
    pub fn value(&self) -> f64 {
        match self {
            Self::Scored(v) => *v,
            Self::Sentinel => 1.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

impl Serialize for FeatureScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// Which stage produced a candidate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPath {
    Exact,
    Blocked,
}

impl std::fmt::Display for MatchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub ref_id: String,
    pub add_id: String,
    pub path: MatchPath,
    /// Cleaned reference address values, for audit.
    pub ref_values: Vec<Option<String>>,
    /// Cleaned additional address values, for audit.
    pub add_values: Vec<Option<String>>,
    /// One score per [`CandidateTable::feature_names`] entry.
    pub features: Vec<FeatureScore>,
}

/// Column naming of one side of the candidate table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSide {
    pub dataset: String,
    pub id: String,
    pub fields: Vec<String>,
}

/// One row per (reference id, additional id) pair.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateTable {
    pub reference: TableSide,
    pub additional: TableSide,
    pub feature_names: Vec<String>,
    pub rows: Vec<CandidateRow>,
}

impl CandidateTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Output header: ids, reference fields, additional fields, features,
    /// then `path`. A column name used on both sides gets a `_{dataset}`
    /// suffix.
    pub fn headers(&self) -> Vec<String> {
        let ref_names: Vec<&String> =
            std::iter::once(&self.reference.id).chain(&self.reference.fields).collect();
        let add_names: Vec<&String> =
            std::iter::once(&self.additional.id).chain(&self.additional.fields).collect();

        let label = |name: &String, dataset: &str, other: &[&String]| {
            if other.contains(&name) {
                format!("{name}_{dataset}")
            } else {
                name.clone()
            }
        };
        let ref_labels: Vec<String> = ref_names
            .iter()
            .map(|n| label(n, &self.reference.dataset, &add_names))
            .collect();
        let add_labels: Vec<String> = add_names
            .iter()
            .map(|n| label(n, &self.additional.dataset, &ref_names))
            .collect();

        let mut headers = vec![ref_labels[0].clone(), add_labels[0].clone()];
        headers.extend_from_slice(&ref_labels[1..]);
        headers.extend_from_slice(&add_labels[1..]);
        headers.extend(self.feature_names.iter().cloned());
        headers.push("path".into());
        headers
    }

    pub fn get(&self, ref_id: &str, add_id: &str) -> Option<&CandidateRow> {
        self.rows
            .iter()
            .find(|r| r.ref_id == ref_id && r.add_id == add_id)
    }

    pub fn feature(&self, row: &CandidateRow, name: &str) -> Option<FeatureScore> {
        let idx = self.feature_names.iter().position(|f| f == name)?;
        row.features.get(idx).copied()
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkWarning {
    /// No shared postcode and no exact match: the table is empty.
    EmptyCandidates,
    /// The empty-postcode block produced more pairs than the configured limit.
    LargeEmptyBlock { pairs: usize, limit: usize },
}

impl std::fmt::Display for LinkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCandidates => write!(f, "no candidate pairs generated"),
            Self::LargeEmptyBlock { pairs, limit } => write!(
                f,
                "empty-postcode block produced {pairs} pairs (limit {limit})"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub ref_records: usize,
    pub add_records: usize,
    pub exact_pairs: usize,
    pub blocked_pairs: usize,
    pub blocks: usize,
    pub residual_ref: usize,
    pub residual_add: usize,
    pub empty_block_pairs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub meta: LinkMeta,
    pub summary: LinkSummary,
    pub warnings: Vec<LinkWarning>,
    pub table: CandidateTable,
}
