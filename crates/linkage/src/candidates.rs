use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::{BlockingConfig, EmptyPostcode};
use crate::model::NormalizedAddress;

/// Pairs to put in the candidate table, as (reference index, additional
/// index) into the normalized inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    /// Exact matches, ordered by reference then additional index.
    pub exact: Vec<(usize, usize)>,
    /// Blocked pairs, ordered by postcode, then reference, then additional.
    pub blocked: Vec<(usize, usize)>,
    /// Postcode blocks that produced at least one pair.
    pub blocks: usize,
    pub residual_ref: usize,
    pub residual_add: usize,
    /// Blocked pairs whose shared postcode is empty.
    pub empty_block_pairs: usize,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.exact.len() + self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.blocked.is_empty()
    }
}

/// Split two normalized datasets into exact matches and postcode-blocked
/// candidates. A record taking part in any exact match is left out of
/// blocking on both sides.
pub fn generate(
    reference: &[NormalizedAddress],
    additional: &[NormalizedAddress],
    blocking: &BlockingConfig,
) -> CandidateSet {
    let exact = exact_matches(reference, additional);

    let mut ref_matched = vec![false; reference.len()];
    let mut add_matched = vec![false; additional.len()];
    for &(r, a) in &exact {
        ref_matched[r] = true;
        add_matched[a] = true;
    }

    let mut blocks: BTreeMap<&str, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, rec) in reference.iter().enumerate().filter(|(i, _)| !ref_matched[*i]) {
        blocks.entry(rec.postcode.as_str()).or_default().0.push(i);
    }
    for (i, rec) in additional.iter().enumerate().filter(|(i, _)| !add_matched[*i]) {
        blocks.entry(rec.postcode.as_str()).or_default().1.push(i);
    }

    let mut set = CandidateSet {
        exact: exact.into_iter().collect(),
        residual_ref: ref_matched.iter().filter(|m| !**m).count(),
        residual_add: add_matched.iter().filter(|m| !**m).count(),
        ..CandidateSet::default()
    };

    for (postcode, (refs, adds)) in &blocks {
        if refs.is_empty() || adds.is_empty() {
            continue;
        }
        if postcode.is_empty() {
            if blocking.empty_postcode == EmptyPostcode::Skip {
                log::debug!(
                    "skipping empty-postcode block ({} x {} records)",
                    refs.len(),
                    adds.len()
                );
                continue;
            }
            set.empty_block_pairs = refs.len() * adds.len();
        }
        set.blocks += 1;
        for &r in refs {
            set.blocked.extend(adds.iter().map(|&a| (r, a)));
        }
    }

    log::debug!(
        "candidates: {} exact, {} blocked in {} blocks (residual {} ref / {} add)",
        set.exact.len(),
        set.blocked.len(),
        set.blocks,
        set.residual_ref,
        set.residual_add
    );
    set
}

/// Union over every (reference field, additional field) combination of the
/// join on (cleaned address, cleaned postcode). Empty addresses never match.
fn exact_matches(
    reference: &[NormalizedAddress],
    additional: &[NormalizedAddress],
) -> BTreeSet<(usize, usize)> {
    let ref_fields = reference.first().map_or(0, |r| r.addresses.len());
    let add_fields = additional.first().map_or(0, |a| a.addresses.len());
    let mut pairs = BTreeSet::new();

    for af in 0..add_fields {
        let mut index: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (i, rec) in additional.iter().enumerate() {
            if let Some(addr) = rec.addresses[af].as_deref().filter(|a| !a.is_empty()) {
                index.entry((addr, rec.postcode.as_str())).or_default().push(i);
            }
        }
        if index.is_empty() {
            continue;
        }
        for rf in 0..ref_fields {
            for (r, rec) in reference.iter().enumerate() {
                let Some(addr) = rec.addresses[rf].as_deref().filter(|a| !a.is_empty()) else {
                    continue;
                };
                if let Some(hits) = index.get(&(addr, rec.postcode.as_str())) {
                    pairs.extend(hits.iter().map(|&a| (r, a)));
                }
            }
        }
    }
    pairs
}
