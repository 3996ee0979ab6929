use crate::config::DatasetSchema;
use crate::model::{FeatureScore, NormalizedAddress};
use crate::normalize::fold_abbreviations;

/// What a similarity feature compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSpec {
    /// Cleaned address columns, by position in each schema's `addresses`.
    Address { reference: usize, additional: usize },
    /// Numeric-token fields, by position in each schema's `numbers`.
    Numbers { reference: usize, additional: usize },
}

/// The ordered feature columns for a pair of schemas: every address
/// permutation, then every numeric-token permutation, reference-major.
#[derive(Debug, Clone)]
pub struct FeaturePlan {
    names: Vec<String>,
    specs: Vec<FeatureSpec>,
}

impl FeaturePlan {
    pub fn new(reference: &DatasetSchema, additional: &DatasetSchema) -> Self {
        let mut names = Vec::new();
        let mut specs = Vec::new();

        for (r, rf) in reference.addresses.iter().enumerate() {
            for (a, af) in additional.addresses.iter().enumerate() {
                names.push(feature_name(rf, af));
                specs.push(FeatureSpec::Address { reference: r, additional: a });
            }
        }
        let ref_numbers = reference.number_fields();
        let add_numbers = additional.number_fields();
        for (r, rf) in ref_numbers.iter().enumerate() {
            for (a, af) in add_numbers.iter().enumerate() {
                names.push(feature_name(rf, af));
                specs.push(FeatureSpec::Numbers { reference: r, additional: a });
            }
        }

        Self { names, specs }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Score one blocked pair, one value per feature.
    pub fn score(&self, reference: &NormalizedAddress, additional: &NormalizedAddress) -> Vec<FeatureScore> {
        self.specs
            .iter()
            .map(|spec| match *spec {
                FeatureSpec::Address { reference: r, additional: a } => compare_addresses(
                    reference.addresses[r].as_deref(),
                    additional.addresses[a].as_deref(),
                ),
                FeatureSpec::Numbers { reference: r, additional: a } => compare(
                    reference.numbers[r].as_deref(),
                    additional.numbers[a].as_deref(),
                ),
            })
            .collect()
    }

    /// Feature values for an exact-path row, which is never scored.
    pub fn unscored(&self) -> Vec<FeatureScore> {
        vec![FeatureScore::Sentinel; self.specs.len()]
    }
}

pub fn feature_name(reference_field: &str, additional_field: &str) -> String {
    format!("{reference_field}_{additional_field}_match")
}

/// Normalized Levenshtein similarity in [0, 1]. Two empty strings are
/// identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
}

/// Missing on one side scores 0; missing on both is left to the sentinel.
pub fn compare(a: Option<&str>, b: Option<&str>) -> FeatureScore {
    match (a, b) {
        (None, None) => FeatureScore::Sentinel,
        (Some(_), None) | (None, Some(_)) => FeatureScore::Scored(0.0),
        (Some(a), Some(b)) => FeatureScore::Scored(similarity(a, b)),
    }
}

/// [`compare`] after folding street-type words on both sides. A score of
/// 1.0 here means equal after folding, not identical strings: "12 oak
/// street" and "12 oak st" score 1.0.
pub fn compare_addresses(a: Option<&str>, b: Option<&str>) -> FeatureScore {
    let a = a.map(fold_abbreviations);
    let b = b.map(fold_abbreviations);
    compare(a.as_deref(), b.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(name: &str, addresses: &[&str]) -> DatasetSchema {
        DatasetSchema::new(name, "id", addresses)
    }

    #[test]
    fn plan_orders_address_then_numbers() {
        let mut reference = schema("ref", &["addr1", "addr2"]);
        reference.numbers = Some(vec!["addr1".into()]);
        let additional = schema("add", &["address"]);
        let plan = FeaturePlan::new(&reference, &additional);
        assert_eq!(
            plan.names(),
            &[
                "addr1_address_match",
                "addr2_address_match",
                "addr1_numbers_address_numbers_match",
            ]
        );
        assert_eq!(plan.specs()[2], FeatureSpec::Numbers { reference: 0, additional: 0 });
    }

    #[test]
    fn missing_value_rules() {
        assert_eq!(compare(None, None), FeatureScore::Sentinel);
        assert_eq!(compare(Some("a"), None), FeatureScore::Scored(0.0));
        assert_eq!(compare(None, Some("")), FeatureScore::Scored(0.0));
        assert_eq!(compare(Some(""), Some("")), FeatureScore::Scored(1.0));
    }

    #[test]
    fn abbreviations_fold_before_scoring() {
        assert_eq!(
            compare_addresses(Some("12 oak street"), Some("12 oak st")),
            FeatureScore::Scored(1.0)
        );
        let raw = compare(Some("12 oak street"), Some("12 oak st")).value();
        assert!(raw > 0.6 && raw < 1.0);
    }

    #[test]
    fn scores_are_bounded() {
        for (a, b) in [("", "abc"), ("abc", "xyz"), ("flat 1", "flat 10")] {
            let s = similarity(a, b);
            assert!((0.0..=1.0).contains(&s), "{a:?} vs {b:?} gave {s}");
        }
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn score_pair() {
        let reference = schema("ref", &["address"]);
        let additional = schema("add", &["address"]);
        let plan = FeaturePlan::new(&reference, &additional);
        let r = NormalizedAddress {
            addresses: vec![Some("flat 4 12 oak road".into())],
            numbers: vec![Some("12 4".into())],
            postcode: "ab1 2cd".into(),
        };
        let a = NormalizedAddress {
            addresses: vec![Some("12 flat 4 oak rd".into())],
            numbers: vec![Some("12 4".into())],
            postcode: "ab1 2cd".into(),
        };
        let scores = plan.score(&r, &a);
        assert_eq!(scores.len(), 2);
        assert!(scores[0].value() < 1.0);
        assert_eq!(scores[1], FeatureScore::Scored(1.0));
        assert_eq!(plan.unscored(), vec![FeatureScore::Sentinel; 2]);
    }
}
