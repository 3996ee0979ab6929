use std::collections::HashSet;

use serde::Deserialize;

use crate::error::LinkageError;
use crate::frame::PointColumns;
use crate::spatial::{BufferStats, Statistic};

// ---------------------------------------------------------------------------
// Dataset schema
// ---------------------------------------------------------------------------

/// Logical-to-physical column mapping for one side of a link.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSchema {
    /// Dataset label used in errors and logs. Filled from the config
    /// section name when left empty.
    #[serde(default)]
    pub name: String,
    /// CSV file, resolved by the caller relative to the config file.
    #[serde(default)]
    pub file: String,
    pub id: String,
    #[serde(default = "default_postcode")]
    pub postcode: String,
    /// Address-fragment columns, compared pairwise with the other side.
    pub addresses: Vec<String>,
    /// Address columns a numeric-token field is derived from. Defaults to
    /// all of `addresses`.
    #[serde(default)]
    pub numbers: Option<Vec<String>>,
    /// Take a missing postcode from the first address column's text.
    #[serde(default)]
    pub infer_postcode: bool,
    #[serde(default)]
    pub geometry: Option<PointColumns>,
}

fn default_postcode() -> String {
    "postcode".into()
}

impl DatasetSchema {
    pub fn new(name: &str, id: &str, addresses: &[&str]) -> Self {
        Self {
            name: name.into(),
            file: String::new(),
            id: id.into(),
            postcode: default_postcode(),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            numbers: None,
            infer_postcode: false,
            geometry: None,
        }
    }

    pub fn number_columns(&self) -> &[String] {
        self.numbers.as_deref().unwrap_or(&self.addresses)
    }

    /// Positions in `addresses` of the numeric-token source columns.
    pub fn number_indices(&self) -> Vec<usize> {
        self.number_columns()
            .iter()
            .filter_map(|n| self.addresses.iter().position(|a| a == n))
            .collect()
    }

    /// Name of the numeric-token field derived from each number column.
    pub fn number_fields(&self) -> Vec<String> {
        self.number_columns()
            .iter()
            .map(|n| format!("{n}_numbers"))
            .collect()
    }

    pub fn validate(&self) -> Result<(), LinkageError> {
        let name = &self.name;
        if self.id.is_empty() || self.postcode.is_empty() {
            return Err(LinkageError::ConfigValidation(format!(
                "dataset '{name}': id and postcode columns must be named"
            )));
        }
        if self.addresses.is_empty() {
            return Err(LinkageError::ConfigValidation(format!(
                "dataset '{name}': at least one address column is required"
            )));
        }
        let mut seen = HashSet::new();
        for a in &self.addresses {
            if !seen.insert(a.as_str()) {
                return Err(LinkageError::ConfigValidation(format!(
                    "dataset '{name}': address column '{a}' listed twice"
                )));
            }
        }
        for n in self.number_columns() {
            if !self.addresses.contains(n) {
                return Err(LinkageError::ConfigValidation(format!(
                    "dataset '{name}': numbers column '{n}' is not an address column"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// What to do with records whose cleaned postcode is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPostcode {
    /// All empty-postcode records form one block.
    #[default]
    Block,
    /// Empty-postcode records produce no blocked candidates.
    Skip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockingConfig {
    #[serde(default)]
    pub empty_postcode: EmptyPostcode,
    /// Warn when the empty-postcode block yields more pairs than this.
    #[serde(default = "default_empty_block_warn_pairs")]
    pub empty_block_warn_pairs: usize,
}

fn default_empty_block_warn_pairs() -> usize {
    10_000
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            empty_postcode: EmptyPostcode::default(),
            empty_block_warn_pairs: default_empty_block_warn_pairs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Link config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    pub reference: DatasetSchema,
    pub additional: DatasetSchema,
    #[serde(default)]
    pub blocking: BlockingConfig,
}

impl LinkConfig {
    pub fn from_toml(input: &str) -> Result<Self, LinkageError> {
        let mut config: LinkConfig =
            toml::from_str(input).map_err(|e| LinkageError::ConfigParse(e.to_string()))?;
        if config.reference.name.is_empty() {
            config.reference.name = "reference".into();
        }
        if config.additional.name.is_empty() {
            config.additional.name = "additional".into();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkageError> {
        if self.name.trim().is_empty() {
            return Err(LinkageError::ConfigValidation("name must not be empty".into()));
        }
        self.reference.validate()?;
        self.additional.validate()?;
        if self.reference.name == self.additional.name {
            return Err(LinkageError::ConfigValidation(format!(
                "reference and additional datasets share the name '{}'",
                self.reference.name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merge config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Key,
    Geography,
    Buffer,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Geography => write!(f, "geography"),
            Self::Buffer => write!(f, "buffer"),
        }
    }
}

/// The frame every merge step attaches onto.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceFrameConfig {
    pub file: String,
    #[serde(default = "default_reference_id")]
    pub id: String,
    #[serde(default)]
    pub geometry: Option<PointColumns>,
}

fn default_reference_id() -> String {
    "uprn".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeStep {
    pub strategy: MergeStrategy,
    pub file: String,
    /// Suffix for the appended columns.
    pub name: String,
    /// Join column for `key` steps; defaults to the reference id.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub stats: Option<Vec<Statistic>>,
    /// One statistic under the bare field name, instead of `stats`.
    #[serde(default)]
    pub stat: Option<Statistic>,
    #[serde(default)]
    pub geometry: Option<PointColumns>,
}

impl MergeStep {
    pub fn buffer_stats(&self) -> BufferStats {
        match (&self.stat, &self.stats) {
            (Some(stat), _) => BufferStats::Single(*stat),
            (None, Some(stats)) => BufferStats::Each(stats.clone()),
            (None, None) => BufferStats::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    pub name: String,
    pub reference: ReferenceFrameConfig,
    pub steps: Vec<MergeStep>,
}

impl MergeConfig {
    pub fn from_toml(input: &str) -> Result<Self, LinkageError> {
        let config: MergeConfig =
            toml::from_str(input).map_err(|e| LinkageError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkageError> {
        if self.name.trim().is_empty() {
            return Err(LinkageError::ConfigValidation("name must not be empty".into()));
        }
        if self.steps.is_empty() {
            return Err(LinkageError::ConfigValidation(
                "at least one merge step is required".into(),
            ));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(LinkageError::ConfigValidation(format!(
                    "{} step for '{}': name must not be empty",
                    step.strategy, step.file
                )));
            }
            if !names.insert(step.name.as_str()) {
                return Err(LinkageError::ConfigValidation(format!(
                    "step name '{}' used twice",
                    step.name
                )));
            }
            if step.strategy == MergeStrategy::Buffer {
                if self.reference.geometry.is_none() {
                    return Err(LinkageError::ConfigValidation(format!(
                        "step '{}': buffer merge needs reference geometry columns",
                        step.name
                    )));
                }
                if step.geometry.is_none() {
                    return Err(LinkageError::ConfigValidation(format!(
                        "step '{}': buffer merge needs geometry columns",
                        step.name
                    )));
                }
                match step.distance {
                    Some(d) if d.is_finite() && d >= 0.0 => {}
                    Some(d) => {
                        return Err(LinkageError::ConfigValidation(format!(
                            "step '{}': distance must be a non-negative number, got {d}",
                            step.name
                        )))
                    }
                    None => {
                        return Err(LinkageError::ConfigValidation(format!(
                            "step '{}': buffer merge needs a distance",
                            step.name
                        )))
                    }
                }
                if matches!(&step.stats, Some(s) if s.is_empty()) {
                    return Err(LinkageError::ConfigValidation(format!(
                        "step '{}': stats must not be empty",
                        step.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_LINK: &str = r#"
name = "HMO register to gazetteer"

[reference]
file = "gazetteer.csv"
id = "uprn"
addresses = ["address"]

[additional]
file = "hmo.csv"
id = "licence"
postcode = "post_code"
addresses = ["address_1", "address_2"]
numbers = ["address_1"]
infer_postcode = true
"#;

    #[test]
    fn parse_valid_link() {
        let config = LinkConfig::from_toml(VALID_LINK).unwrap();
        assert_eq!(config.name, "HMO register to gazetteer");
        assert_eq!(config.reference.name, "reference");
        assert_eq!(config.reference.postcode, "postcode");
        assert_eq!(config.reference.number_fields(), vec!["address_numbers"]);
        assert_eq!(config.additional.postcode, "post_code");
        assert_eq!(config.additional.number_indices(), vec![0]);
        assert!(config.additional.infer_postcode);
        assert_eq!(config.blocking.empty_postcode, EmptyPostcode::Block);
        assert_eq!(config.blocking.empty_block_warn_pairs, 10_000);
    }

    #[test]
    fn parse_blocking_skip() {
        let input = format!("{VALID_LINK}\n[blocking]\nempty_postcode = \"skip\"\n");
        let config = LinkConfig::from_toml(&input).unwrap();
        assert_eq!(config.blocking.empty_postcode, EmptyPostcode::Skip);
    }

    #[test]
    fn reject_unknown_blocking_mode() {
        let input = format!("{VALID_LINK}\n[blocking]\nempty_postcode = \"explode\"\n");
        assert!(matches!(
            LinkConfig::from_toml(&input),
            Err(LinkageError::ConfigParse(_))
        ));
    }

    #[test]
    fn reject_numbers_outside_addresses() {
        let input = VALID_LINK.replace(r#"numbers = ["address_1"]"#, r#"numbers = ["flat"]"#);
        let err = LinkConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("numbers column 'flat'"));
    }

    #[test]
    fn reject_empty_addresses() {
        let input = VALID_LINK.replace(r#"addresses = ["address"]"#, "addresses = []");
        let err = LinkConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("at least one address column"));
    }

    const VALID_MERGE: &str = r#"
name = "enrich"

[reference]
file = "gazetteer.csv"
geometry = { x = "easting", y = "northing" }

[[steps]]
strategy = "key"
file = "matches.csv"
name = "hmo"

[[steps]]
strategy = "geography"
file = "imd.csv"
name = "imd"

[[steps]]
strategy = "buffer"
file = "crime.csv"
name = "crime"
distance = 100.0
stats = ["median", "max"]
geometry = { x = "easting", y = "northing" }

[[steps]]
strategy = "buffer"
file = "buildings.csv"
name = "bld"
distance = 0.0
stat = "sum"
geometry = { x = "x", y = "y" }
"#;

    #[test]
    fn parse_valid_merge() {
        let config = MergeConfig::from_toml(VALID_MERGE).unwrap();
        assert_eq!(config.reference.id, "uprn");
        assert_eq!(config.steps.len(), 4);
        assert_eq!(config.steps[0].strategy, MergeStrategy::Key);
        assert_eq!(config.steps[0].buffer_stats(), BufferStats::default());
        assert_eq!(
            config.steps[2].buffer_stats(),
            BufferStats::Each(vec![Statistic::Median, Statistic::Max])
        );
        assert_eq!(config.steps[3].buffer_stats(), BufferStats::Single(Statistic::Sum));
    }

    #[test]
    fn reject_buffer_without_distance() {
        let input = VALID_MERGE.replace("distance = 100.0\n", "");
        let err = MergeConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("needs a distance"));
    }

    #[test]
    fn reject_duplicate_step_names() {
        let input = VALID_MERGE.replace(r#"name = "imd""#, r#"name = "hmo""#);
        let err = MergeConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("'hmo' used twice"));
    }

    #[test]
    fn reject_unknown_statistic() {
        let input = VALID_MERGE.replace(r#"stat = "sum""#, r#"stat = "mode""#);
        assert!(matches!(
            MergeConfig::from_toml(&input),
            Err(LinkageError::ConfigParse(_))
        ));
    }
}
