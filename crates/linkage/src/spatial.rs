use geo::{BoundingRect, EuclideanDistance, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::error::LinkageError;
use crate::frame::{Frame, Value};
use crate::merge::{check_output_columns, MergeResult, Provenance};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Point or area geometry in a projected coordinate system. Distances are
/// in that system's linear units.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self::Point(Point::new(x, y))
    }

    /// Euclidean distance; zero when the geometries touch or overlap.
    pub fn distance(&self, other: &Geometry) -> f64 {
        match (self, other) {
            (Self::Point(a), Self::Point(b)) => a.euclidean_distance(b),
            (Self::Point(a), Self::Polygon(b)) => a.euclidean_distance(b),
            (Self::Polygon(a), Self::Point(b)) => a.euclidean_distance(b),
            (Self::Polygon(a), Self::Polygon(b)) => a.euclidean_distance(b),
        }
    }

    pub fn envelope(&self) -> Option<Rect<f64>> {
        match self {
            Self::Point(p) => Some(p.bounding_rect()),
            Self::Polygon(p) => p.bounding_rect(),
        }
    }

    /// Whether a buffer of `distance` around `self` intersects `other`.
    pub fn within_buffer(&self, other: &Geometry, distance: f64) -> bool {
        match (self.envelope(), other.envelope()) {
            (Some(a), Some(b)) if !envelopes_near(&a, &b, distance) => false,
            (None, _) | (_, None) => false,
            _ => self.distance(other) <= distance,
        }
    }
}

fn envelopes_near(a: &Rect<f64>, b: &Rect<f64>, distance: f64) -> bool {
    a.min().x - distance <= b.max().x
        && b.min().x <= a.max().x + distance
        && a.min().y - distance <= b.max().y
        && b.min().y <= a.max().y + distance
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Median,
    Mean,
    Max,
    Min,
    Sum,
}

impl Statistic {
    pub const DEFAULT: [Statistic; 5] = [
        Statistic::Median,
        Statistic::Mean,
        Statistic::Max,
        Statistic::Min,
        Statistic::Sum,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
        }
    }

    /// `None` for an empty sample.
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let v = match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        Some(v)
    }
}

impl std::fmt::Display for Statistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which statistics to compute per aggregated field.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferStats {
    /// One column per statistic: `{field}_{stat}_{name}`.
    Each(Vec<Statistic>),
    /// A single statistic under the bare field name: `{field}_{name}`.
    Single(Statistic),
}

impl Default for BufferStats {
    fn default() -> Self {
        Self::Each(Statistic::DEFAULT.to_vec())
    }
}

impl BufferStats {
    fn columns(&self) -> Vec<(Statistic, Option<&'static str>)> {
        match self {
            Self::Each(stats) => stats.iter().map(|s| (*s, Some(s.label()))).collect(),
            Self::Single(stat) => vec![(*stat, None)],
        }
    }
}

// ---------------------------------------------------------------------------
// Buffer merge
// ---------------------------------------------------------------------------

/// Summarise the features of `additional` that fall within `distance` of
/// each reference geometry and append the summaries to `reference`.
///
/// Every non-geometry column of `additional` (other than a column named
/// like the reference identifier) is aggregated; cells that are not
/// numeric are ignored. Reference rows with no feature in range get null
/// for every aggregate. No indicator column is added; per-row provenance is
/// returned alongside the frame.
pub fn by_buffer(
    reference: &Frame,
    additional: &Frame,
    id: &str,
    name: &str,
    distance: f64,
    stats: &BufferStats,
) -> Result<MergeResult, LinkageError> {
    if !distance.is_finite() || distance < 0.0 {
        return Err(LinkageError::ConfigValidation(format!(
            "merge '{name}': buffer distance must be a non-negative number, got {distance}"
        )));
    }
    if matches!(stats, BufferStats::Each(s) if s.is_empty()) {
        return Err(LinkageError::ConfigValidation(format!(
            "merge '{name}': at least one statistic is required"
        )));
    }

    let id_idx = reference.require_column(id)?;
    let mut ref_geoms = Vec::with_capacity(reference.len());
    for (row_idx, row) in reference.rows().iter().enumerate() {
        let geom = reference.geometry(row_idx).ok_or_else(|| LinkageError::MissingGeometry {
            dataset: reference.name.clone(),
            id: row[id_idx].to_string(),
        })?;
        ref_geoms.push(geom);
    }

    let fields: Vec<(usize, &String)> = additional
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.as_str() != id && !additional.geometry_columns().contains(c))
        .collect();
    let stat_columns = stats.columns();

    let mut columns: Vec<String> = reference.columns().to_vec();
    for (_, field) in &fields {
        for (_, label) in &stat_columns {
            columns.push(match label {
                Some(label) => format!("{field}_{label}_{name}"),
                None => format!("{field}_{name}"),
            });
        }
    }
    check_output_columns(reference, &columns)?;

    let features: Vec<(usize, &Geometry)> = (0..additional.len())
        .filter_map(|i| additional.geometry(i).map(|g| (i, g)))
        .collect();
    if features.len() < additional.len() {
        log::debug!(
            "merge '{name}': {} of {} features have no geometry and are ignored",
            additional.len() - features.len(),
            additional.len()
        );
    }

    let mut out = Frame::new(reference.name.clone(), columns)?;
    out.set_geometry_columns(reference.geometry_columns().to_vec());
    let mut provenance = Vec::with_capacity(reference.len());
    let mut sample: Vec<f64> = Vec::new();

    for (row_idx, row) in reference.rows().iter().enumerate() {
        let ref_geom = ref_geoms[row_idx];
        let inside: Vec<usize> = features
            .iter()
            .filter(|(_, g)| ref_geom.within_buffer(g, distance))
            .map(|(i, _)| *i)
            .collect();

        let mut values = row.clone();
        for (col_idx, _) in &fields {
            sample.clear();
            sample.extend(inside.iter().filter_map(|i| additional.rows()[*i][*col_idx].as_f64()));
            for (stat, _) in &stat_columns {
                values.push(stat.compute(&sample).map(Value::Number).unwrap_or(Value::Null));
            }
        }

        provenance.push(if inside.is_empty() {
            Provenance::LeftOnly
        } else {
            Provenance::Both
        });
        out.push_row_with_geometry(values, Some(ref_geom.clone()))?;
    }

    let hits = provenance.iter().filter(|p| **p == Provenance::Both).count();
    log::info!(
        "merge '{name}': buffer {distance} - {hits} of {} reference rows have features in range",
        reference.len()
    );

    Ok(MergeResult { frame: out, provenance })
}
