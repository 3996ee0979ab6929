use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::LinkageError;
use crate::frame::{Frame, Value};

/// Reference-geography columns a geography merge may join on: output area,
/// lower/middle super output area, local authority district and ward, each
/// as code (`cd`) and name (`nm`).
pub const GEOGRAPHY_COLUMNS: [&str; 10] = [
    "oacd", "oanm", "lsoacd", "lsoanm", "msoacd", "msoanm", "ladcd", "ladnm", "wardcd", "wardnm",
];

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Whether a reference row found a partner in the additional dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Both,
    LeftOnly,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "both",
            Self::LeftOnly => "left_only",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference frame with the additional columns appended. One output row per
/// reference row, in reference order.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub frame: Frame,
    pub provenance: Vec<Provenance>,
}

impl MergeResult {
    pub fn matched(&self) -> usize {
        self.provenance.iter().filter(|p| **p == Provenance::Both).count()
    }
}

/// A reference row and its join partner, if any.
enum JoinedRow<'a> {
    Matched {
        reference: &'a [Value],
        additional: &'a [Value],
    },
    Unmatched {
        reference: &'a [Value],
    },
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Left-join `additional` onto `reference` by a shared identifier column.
/// Every other column of `additional` is appended as `{col}_{name}`, and an
/// indicator column `merge_{name}` records `both` / `left_only`.
pub fn by_key(
    reference: &Frame,
    additional: &Frame,
    key: &str,
    name: &str,
) -> Result<MergeResult, LinkageError> {
    reference.require_column(key)?;
    additional.require_column(key)?;

    let appended: Vec<(usize, String)> = additional
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() != key)
        .map(|(i, c)| (i, format!("{c}_{name}")))
        .collect();

    left_join(reference, additional, &[key.to_string()], &appended, name)
}

/// Left-join `additional` onto `reference` by every reference-geography
/// column the two frames share. Non-geography columns of `additional` are
/// suffixed with `_{name}`; its geography columns keep their names.
pub fn by_geography(
    reference: &Frame,
    additional: &Frame,
    name: &str,
) -> Result<MergeResult, LinkageError> {
    let keys: Vec<String> = GEOGRAPHY_COLUMNS
        .iter()
        .filter(|g| reference.has_column(g) && additional.has_column(g))
        .map(|g| g.to_string())
        .collect();
    if keys.is_empty() {
        return Err(LinkageError::AmbiguousKey { name: name.into() });
    }

    let appended: Vec<(usize, String)> = additional
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !keys.contains(c))
        .map(|(i, c)| {
            if GEOGRAPHY_COLUMNS.contains(&c.as_str()) {
                (i, c.clone())
            } else {
                (i, format!("{c}_{name}"))
            }
        })
        .collect();

    log::debug!("merge '{name}': joining on {}", keys.join(", "));
    left_join(reference, additional, &keys, &appended, name)
}

// ---------------------------------------------------------------------------
// Shared join
// ---------------------------------------------------------------------------

fn left_join(
    reference: &Frame,
    additional: &Frame,
    keys: &[String],
    appended: &[(usize, String)],
    name: &str,
) -> Result<MergeResult, LinkageError> {
    let ref_keys: Vec<usize> = keys
        .iter()
        .map(|k| reference.require_column(k))
        .collect::<Result<_, _>>()?;
    let add_keys: Vec<usize> = keys
        .iter()
        .map(|k| additional.require_column(k))
        .collect::<Result<_, _>>()?;

    let mut columns: Vec<String> = reference.columns().to_vec();
    columns.extend(appended.iter().map(|(_, c)| c.clone()));
    columns.push(format!("merge_{name}"));
    check_output_columns(reference, &columns)?;

    let mut index: HashMap<Vec<String>, usize> = HashMap::with_capacity(additional.len());
    for (row_idx, row) in additional.rows().iter().enumerate() {
        let Some(key) = row_key(row, &add_keys) else {
            continue;
        };
        if index.insert(key.clone(), row_idx).is_some() {
            return Err(LinkageError::DuplicateKey {
                dataset: additional.name.clone(),
                key: key.join("|"),
            });
        }
    }

    let joined = reference.rows().iter().map(|row| {
        match row_key(row, &ref_keys).and_then(|k| index.get(&k)) {
            Some(&add_idx) => JoinedRow::Matched {
                reference: row,
                additional: &additional.rows()[add_idx],
            },
            None => JoinedRow::Unmatched { reference: row },
        }
    });

    let mut out = Frame::new(reference.name.clone(), columns)?;
    out.set_geometry_columns(reference.geometry_columns().to_vec());
    let mut provenance = Vec::with_capacity(reference.len());

    for (row_idx, joined_row) in joined.enumerate() {
        let (mut values, status) = match joined_row {
            JoinedRow::Matched { reference, additional } => {
                let mut values = reference.to_vec();
                values.extend(appended.iter().map(|(i, _)| additional[*i].clone()));
                (values, Provenance::Both)
            }
            JoinedRow::Unmatched { reference } => {
                let mut values = reference.to_vec();
                values.extend(appended.iter().map(|_| Value::Null));
                (values, Provenance::LeftOnly)
            }
        };
        values.push(Value::Text(status.as_str().into()));
        provenance.push(status);

        if reference.has_geometry() {
            out.push_row_with_geometry(values, reference.geometry(row_idx).cloned())?;
        } else {
            out.push_row(values)?;
        }
    }

    let result = MergeResult { frame: out, provenance };
    log::info!(
        "merge '{name}': {} of {} reference rows matched",
        result.matched(),
        reference.len()
    );
    Ok(result)
}

fn row_key(row: &[Value], idx: &[usize]) -> Option<Vec<String>> {
    idx.iter().map(|i| row[*i].as_key()).collect()
}

/// Reject an output layout whose appended names clash with each other or
/// with the reference columns.
pub(crate) fn check_output_columns(reference: &Frame, columns: &[String]) -> Result<(), LinkageError> {
    let mut seen = HashSet::with_capacity(columns.len());
    for col in columns {
        if !seen.insert(col.as_str()) {
            return Err(LinkageError::ConfigValidation(format!(
                "dataset '{}': merged column '{col}' already exists",
                reference.name
            )));
        }
    }
    Ok(())
}
