use crate::assemble::{assemble, Side};
use crate::candidates::generate;
use crate::config::{DatasetSchema, LinkConfig, MergeStep, MergeStrategy};
use crate::error::LinkageError;
use crate::frame::{CsvOptions, Frame};
use crate::merge::{by_geography, by_key, MergeResult};
use crate::model::{LinkMeta, LinkResult, LinkSummary, LinkWarning, NormalizedAddress, Record, RecordSet};
use crate::normalize::{extract_postcode, normalize_address, normalize_postcode, numeric_tokens};
use crate::similarity::FeaturePlan;
use crate::spatial::by_buffer;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Pre-loaded link inputs.
pub struct LinkInput {
    pub reference: Frame,
    pub additional: Frame,
}

impl LinkInput {
    /// Parse both datasets from CSV text, with point geometry where the
    /// schema names coordinate columns.
    pub fn from_csv(config: &LinkConfig, reference: &str, additional: &str) -> Result<Self, LinkageError> {
        Ok(Self {
            reference: load_frame(&config.reference, reference)?,
            additional: load_frame(&config.additional, additional)?,
        })
    }
}

fn load_frame(schema: &DatasetSchema, data: &str) -> Result<Frame, LinkageError> {
    let options = CsvOptions {
        points: schema.geometry.clone(),
        ..CsvOptions::default()
    };
    Frame::from_csv(&schema.name, data, &options)
}

/// Read the schema's columns out of `frame`. Every named column must be
/// present and every row must carry an id.
pub fn records_from_frame(frame: &Frame, schema: &DatasetSchema) -> Result<RecordSet, LinkageError> {
    let id_idx = frame.require_column(&schema.id)?;
    let postcode_idx = frame.require_column(&schema.postcode)?;
    let address_idx: Vec<usize> = schema
        .addresses
        .iter()
        .map(|a| frame.require_column(a))
        .collect::<Result<_, _>>()?;

    let mut records = Vec::with_capacity(frame.len());
    for (row_idx, row) in frame.rows().iter().enumerate() {
        let id = row[id_idx].as_key().ok_or_else(|| {
            LinkageError::ConfigValidation(format!(
                "dataset '{}': row {} has no '{}' value",
                schema.name,
                row_idx + 1,
                schema.id
            ))
        })?;
        let addresses: Vec<Option<String>> = address_idx.iter().map(|i| row[*i].as_key()).collect();

        let mut postcode = row[postcode_idx].as_key().filter(|p| !p.trim().is_empty());
        if postcode.is_none() && schema.infer_postcode {
            postcode = addresses
                .first()
                .and_then(|a| a.as_deref())
                .and_then(extract_postcode);
        }

        records.push(Record {
            id,
            postcode,
            addresses,
            geometry: frame.geometry(row_idx).cloned(),
        });
    }

    RecordSet::new(schema.clone(), records)
}

/// Derive the comparable form of a record.
pub fn normalize_record(record: &Record, schema: &DatasetSchema) -> NormalizedAddress {
    let addresses: Vec<Option<String>> = record
        .addresses
        .iter()
        .map(|a| a.as_deref().map(normalize_address))
        .collect();
    let numbers = schema
        .number_indices()
        .into_iter()
        .map(|i| addresses[i].as_deref().map(numeric_tokens))
        .collect();
    NormalizedAddress {
        addresses,
        numbers,
        postcode: record.postcode.as_deref().map(normalize_postcode).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// Load records from the input frames and link them per config.
pub fn run(config: &LinkConfig, input: &LinkInput) -> Result<LinkResult, LinkageError> {
    let reference = records_from_frame(&input.reference, &config.reference)?;
    let additional = records_from_frame(&input.additional, &config.additional)?;
    link(config, &reference, &additional)
}

/// Normalize, generate candidates, score and assemble the candidate table.
pub fn link(config: &LinkConfig, reference: &RecordSet, additional: &RecordSet) -> Result<LinkResult, LinkageError> {
    let ref_norm: Vec<NormalizedAddress> = reference
        .iter()
        .map(|r| normalize_record(r, reference.schema()))
        .collect();
    let add_norm: Vec<NormalizedAddress> = additional
        .iter()
        .map(|r| normalize_record(r, additional.schema()))
        .collect();

    let candidates = generate(&ref_norm, &add_norm, &config.blocking);
    let plan = FeaturePlan::new(reference.schema(), additional.schema());
    let table = assemble(
        Side { records: reference, normalized: &ref_norm },
        Side { records: additional, normalized: &add_norm },
        &candidates,
        &plan,
    );

    let mut warnings = Vec::new();
    if candidates.empty_block_pairs > config.blocking.empty_block_warn_pairs {
        let warning = LinkWarning::LargeEmptyBlock {
            pairs: candidates.empty_block_pairs,
            limit: config.blocking.empty_block_warn_pairs,
        };
        log::warn!("{}: {warning}", config.name);
        warnings.push(warning);
    }
    if table.is_empty() {
        log::warn!("{}: {}", config.name, LinkWarning::EmptyCandidates);
        warnings.push(LinkWarning::EmptyCandidates);
    }

    let summary = LinkSummary {
        ref_records: reference.len(),
        add_records: additional.len(),
        exact_pairs: candidates.exact.len(),
        blocked_pairs: candidates.blocked.len(),
        blocks: candidates.blocks,
        residual_ref: candidates.residual_ref,
        residual_add: candidates.residual_add,
        empty_block_pairs: candidates.empty_block_pairs,
    };
    log::info!(
        "{}: {} exact + {} blocked candidate pairs from {} x {} records",
        config.name,
        summary.exact_pairs,
        summary.blocked_pairs,
        summary.ref_records,
        summary.add_records
    );

    Ok(LinkResult {
        meta: LinkMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        warnings,
        table,
    })
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Apply one configured merge step. Key steps join on `step.key`, falling
/// back to the reference id column.
pub fn apply_step(
    reference: &Frame,
    additional: &Frame,
    step: &MergeStep,
    reference_id: &str,
) -> Result<MergeResult, LinkageError> {
    match step.strategy {
        MergeStrategy::Key => {
            let key = step.key.as_deref().unwrap_or(reference_id);
            by_key(reference, additional, key, &step.name)
        }
        MergeStrategy::Geography => by_geography(reference, additional, &step.name),
        MergeStrategy::Buffer => {
            let distance = step.distance.ok_or_else(|| {
                LinkageError::ConfigValidation(format!("step '{}': buffer merge needs a distance", step.name))
            })?;
            by_buffer(reference, additional, reference_id, &step.name, distance, &step.buffer_stats())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAZETTEER: &str = "\
uprn,address,postcode
1,12 Oak Street,AB1 2CD
2,Flat 4 12 Oak Street,AB1 2CD
3,9 Elm Road,EF3 4GH
";

    const REGISTER: &str = "\
licence,address,postcode
a,12 Oak St,AB1 2CD
b,9 Elm Road,ef3  4gh
c,\"4 Birch Close, London ZZ9 9ZZ\",
";

    fn config() -> LinkConfig {
        LinkConfig::from_toml(
            r#"
name = "test"
[reference]
id = "uprn"
addresses = ["address"]
[additional]
id = "licence"
addresses = ["address"]
infer_postcode = true
"#,
        )
        .unwrap()
    }

    #[test]
    fn run_links_exact_and_blocked() {
        let config = config();
        let input = LinkInput::from_csv(&config, GAZETTEER, REGISTER).unwrap();
        let result = run(&config, &input).unwrap();

        assert_eq!(result.summary.exact_pairs, 1);
        assert_eq!(result.summary.blocked_pairs, 2);
        assert!(result.warnings.is_empty());

        let exact = result.table.get("3", "b").unwrap();
        assert_eq!(exact.path, crate::model::MatchPath::Exact);

        let fuzzy = result.table.get("1", "a").unwrap();
        let score = result.table.feature(fuzzy, "address_address_match").unwrap();
        assert!(score.value() > 0.8);
        assert!(result.table.get("3", "a").is_none());
    }

    #[test]
    fn infer_postcode_from_address() {
        let config = config();
        let frame = Frame::from_csv("additional", REGISTER, &CsvOptions::default()).unwrap();
        let records = records_from_frame(&frame, &config.additional).unwrap();
        assert_eq!(records.records()[2].postcode.as_deref(), Some("ZZ9 9ZZ"));
        assert_eq!(records.records()[0].postcode.as_deref(), Some("AB1 2CD"));
    }

    #[test]
    fn missing_postcode_column() {
        let config = config();
        let frame = Frame::from_rows("reference", &["uprn", "address"], &[&["1", "x"]]).unwrap();
        let err = records_from_frame(&frame, &config.reference).unwrap_err();
        assert!(matches!(err, LinkageError::MissingColumn { ref column, .. } if column == "postcode"));
    }

    #[test]
    fn missing_id_value() {
        let config = config();
        let frame = Frame::from_rows("reference", &["uprn", "address", "postcode"], &[&["", "x", ""]]).unwrap();
        let err = records_from_frame(&frame, &config.reference).unwrap_err();
        assert!(err.to_string().contains("row 1 has no 'uprn' value"));
    }

    #[test]
    fn normalize_record_keeps_missing_values() {
        let schema = DatasetSchema::new("r", "id", &["a", "b"]);
        let record = Record::new("1", None, &[Some("Flat 04, 12 Oak St"), None]);
        let norm = normalize_record(&record, &schema);
        assert_eq!(norm.addresses, vec![Some("flat 4 12 oak st".to_string()), None]);
        assert_eq!(norm.numbers, vec![Some("12 4".to_string()), None]);
        assert_eq!(norm.postcode, "");
    }

    #[test]
    fn no_shared_postcode_warns() {
        let config = config();
        let reference = RecordSet::new(
            config.reference.clone(),
            vec![Record::new("1", Some("AB1 2CD"), &[Some("1 Oak St")])],
        )
        .unwrap();
        let additional = RecordSet::new(
            config.additional.clone(),
            vec![Record::new("a", Some("ZZ9 9ZZ"), &[Some("1 Oak St")])],
        )
        .unwrap();
        let result = link(&config, &reference, &additional).unwrap();
        assert!(result.table.is_empty());
        assert_eq!(result.table.feature_names, vec!["address_address_match", "address_numbers_address_numbers_match"]);
        assert_eq!(result.warnings, vec![LinkWarning::EmptyCandidates]);
    }

    #[test]
    fn apply_key_step_defaults_to_reference_id() {
        let reference = Frame::from_rows("gazetteer", &["uprn", "address"], &[&["1", "x"]]).unwrap();
        let additional = Frame::from_rows("hmo", &["uprn", "licence"], &[&["1", "L1"]]).unwrap();
        let step: MergeStep = toml::from_str(
            r#"
strategy = "key"
file = "hmo.csv"
name = "hmo"
"#,
        )
        .unwrap();
        let out = apply_step(&reference, &additional, &step, "uprn").unwrap();
        assert_eq!(out.frame.columns(), &["uprn", "address", "licence_hmo", "merge_hmo"]);
        assert_eq!(out.matched(), 1);
    }
}
