use crate::candidates::CandidateSet;
use crate::error::LinkageError;
use crate::model::{CandidateRow, CandidateTable, MatchPath, NormalizedAddress, RecordSet, TableSide};
use crate::similarity::FeaturePlan;

/// Normalized inputs of one side, aligned with its record set.
pub struct Side<'a> {
    pub records: &'a RecordSet,
    pub normalized: &'a [NormalizedAddress],
}

/// Build the candidate table: exact rows (unscored) first, then each
/// blocked pair scored by `plan`. The candidate set holds each pair once,
/// so the table does too.
pub fn assemble(
    reference: Side<'_>,
    additional: Side<'_>,
    candidates: &CandidateSet,
    plan: &FeaturePlan,
) -> CandidateTable {
    let row = |r: usize, a: usize, path: MatchPath| {
        let features = match path {
            MatchPath::Exact => plan.unscored(),
            MatchPath::Blocked => plan.score(&reference.normalized[r], &additional.normalized[a]),
        };
        CandidateRow {
            ref_id: reference.records.records()[r].id.clone(),
            add_id: additional.records.records()[a].id.clone(),
            path,
            ref_values: reference.normalized[r].addresses.clone(),
            add_values: additional.normalized[a].addresses.clone(),
            features,
        }
    };

    let mut rows = Vec::with_capacity(candidates.len());
    rows.extend(candidates.exact.iter().map(|&(r, a)| row(r, a, MatchPath::Exact)));
    rows.extend(candidates.blocked.iter().map(|&(r, a)| row(r, a, MatchPath::Blocked)));

    CandidateTable {
        reference: table_side(reference.records),
        additional: table_side(additional.records),
        feature_names: plan.names().to_vec(),
        rows,
    }
}

fn table_side(records: &RecordSet) -> TableSide {
    let schema = records.schema();
    TableSide {
        dataset: schema.name.clone(),
        id: schema.id.clone(),
        fields: schema.addresses.clone(),
    }
}

impl CandidateTable {
    /// CSV rendering in [`CandidateTable::headers`] order. Missing address
    /// values are written empty, sentinel features as 1. The trailing
    /// `path` column is the only way to tell a sentinel from a real 1.
    pub fn to_csv(&self) -> Result<String, LinkageError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.headers())?;
        for row in &self.rows {
            let mut record: Vec<String> = Vec::with_capacity(
                3 + row.ref_values.len() + row.add_values.len() + row.features.len(),
            );
            record.push(row.ref_id.clone());
            record.push(row.add_id.clone());
            record.extend(row.ref_values.iter().map(|v| v.clone().unwrap_or_default()));
            record.extend(row.add_values.iter().map(|v| v.clone().unwrap_or_default()));
            record.extend(row.features.iter().map(|f| f.value().to_string()));
            record.push(row.path.to_string());
            writer.write_record(&record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LinkageError::Csv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| LinkageError::Csv(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSchema;
    use crate::model::{FeatureScore, Record};

    fn side(name: &str, ids: &[&str]) -> (RecordSet, Vec<NormalizedAddress>) {
        let records = ids
            .iter()
            .map(|id| Record::new(id, Some("AB1 2CD"), &[Some("x")]))
            .collect();
        let set = RecordSet::new(DatasetSchema::new(name, "id", &["address"]), records).unwrap();
        let normalized = ids
            .iter()
            .enumerate()
            .map(|(i, _)| NormalizedAddress {
                addresses: vec![Some(format!("{} oak st", i + 1))],
                numbers: vec![Some((i + 1).to_string())],
                postcode: "ab1 2cd".into(),
            })
            .collect();
        (set, normalized)
    }

    #[test]
    fn exact_rows_first_with_sentinels() {
        let (ref_set, ref_norm) = side("gazetteer", &["1", "2"]);
        let (add_set, add_norm) = side("hmo", &["a", "b"]);
        let plan = FeaturePlan::new(ref_set.schema(), add_set.schema());
        let candidates = CandidateSet {
            exact: vec![(1, 1)],
            blocked: vec![(0, 0)],
            blocks: 1,
            residual_ref: 1,
            residual_add: 1,
            empty_block_pairs: 0,
        };

        let table = assemble(
            Side { records: &ref_set, normalized: &ref_norm },
            Side { records: &add_set, normalized: &add_norm },
            &candidates,
            &plan,
        );

        assert_eq!(table.len(), 2);
        assert_eq!((table.rows[0].ref_id.as_str(), table.rows[0].add_id.as_str()), ("2", "b"));
        assert_eq!(table.rows[0].path, MatchPath::Exact);
        assert!(table.rows[0].features.iter().all(FeatureScore::is_sentinel));
        assert_eq!(table.rows[1].path, MatchPath::Blocked);
        assert_eq!(
            table.feature(&table.rows[1], "address_address_match"),
            Some(FeatureScore::Scored(1.0))
        );
    }

    #[test]
    fn csv_layout() {
        let (ref_set, ref_norm) = side("gazetteer", &["1"]);
        let (add_set, add_norm) = side("hmo", &["a"]);
        let plan = FeaturePlan::new(ref_set.schema(), add_set.schema());
        let candidates = CandidateSet {
            exact: vec![(0, 0)],
            ..CandidateSet::default()
        };
        let table = assemble(
            Side { records: &ref_set, normalized: &ref_norm },
            Side { records: &add_set, normalized: &add_norm },
            &candidates,
            &plan,
        );
        let csv = table.to_csv().unwrap();
        assert_eq!(
            csv,
            "id_gazetteer,id_hmo,address_gazetteer,address_hmo,address_address_match,address_numbers_address_numbers_match,path\n\
             1,a,1 oak st,1 oak st,1,1,exact\n"
        );
    }

    #[test]
    fn csv_path_separates_sentinel_from_perfect_score() {
        let (ref_set, ref_norm) = side("gazetteer", &["1", "2"]);
        let (add_set, add_norm) = side("hmo", &["a", "b"]);
        let plan = FeaturePlan::new(ref_set.schema(), add_set.schema());
        let candidates = CandidateSet {
            exact: vec![(1, 1)],
            blocked: vec![(0, 0)],
            ..CandidateSet::default()
        };
        let table = assemble(
            Side { records: &ref_set, normalized: &ref_norm },
            Side { records: &add_set, normalized: &add_norm },
            &candidates,
            &plan,
        );
        let csv = table.to_csv().unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows, vec!["2,b,2 oak st,2 oak st,1,1,exact", "1,a,1 oak st,1 oak st,1,1,blocked"]);
    }

    #[test]
    fn empty_table_keeps_header() {
        let (ref_set, ref_norm) = side("gazetteer", &[]);
        let (add_set, add_norm) = side("hmo", &[]);
        let plan = FeaturePlan::new(ref_set.schema(), add_set.schema());
        let table = assemble(
            Side { records: &ref_set, normalized: &ref_norm },
            Side { records: &add_set, normalized: &add_norm },
            &CandidateSet::default(),
            &plan,
        );
        assert!(table.is_empty());
        assert_eq!(table.to_csv().unwrap().lines().count(), 1);
    }
}
