//! Address, postcode and estate-name canonicalization.
//!
//! Every function here is pure and never fails on malformed text: the
//! worst case is an empty string.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::LinkageError;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex"))
        }
    };
}

/// Words stripped from estate and building names.
pub const ESTATE_STOPWORDS: [&str; 15] = [
    "estate",
    "road",
    "street",
    "crescent",
    "close",
    "place",
    "st",
    "rd",
    "unknown",
    "lane",
    "way",
    "est",
    "end",
    "apartments",
    "square",
];

/// Register noise words ("odd numbers only", "flats", "cons.") stripped last.
const ESTATE_NOISE: [&str; 3] = ["odd", "flats", "cons"];

/// Street-type folding applied before fuzzy comparison, in order.
pub const ABBREVIATIONS: [(&str, &str); 14] = [
    (r"\bstreet\b", "st"),
    (r"\broad\b", "rd"),
    (r"\bavenue\b", "ave"),
    (r"\bcrescent\b", "cres"),
    (r"\bclose\b", "cl"),
    (r"\bplace\b", "pl"),
    (r"\blane\b", "ln"),
    (r"\bsquare\b", "sq"),
    (r"\bgardens\b", "gdns"),
    (r"\bterrace\b", "ter"),
    (r"\bcourt\b", "ct"),
    (r"\bdrive\b", "dr"),
    (r"\bgrove\b", "gr"),
    (r"\bmansions\b", "mans"),
];

static_regex!(re_brackets, r"\([^)]*\)");
static_regex!(re_not_allowed, r"[^ \-a-z0-9]+");
static_regex!(re_spaces, r"\s+");
static_regex!(re_inner_zeros, r"([^0-9])0+([0-9])");
static_regex!(re_leading_zeros, r"^0+");
static_regex!(re_letter_runs, r"[a-z]{2,}");

static_regex!(re_estate_punct, r"[.,()']");
static_regex!(re_spaced_hyphen, r" ?- ?");
static_regex!(re_and, r"\band\b|&");
static_regex!(re_number_range, r"[0-9]+-[0-9]+");
static_regex!(re_letter_range, r"\b[a-z]-[a-z]\b");
static_regex!(re_digits, r"[0-9]+");
static_regex!(re_estate_residual, r"[^a-z0-9 ]+");

static_regex!(
    re_postcode,
    r"(?i)\b[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}\b"
);
static_regex!(
    re_postcode_exact,
    r"(?i)^[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}$"
);

fn re_estate_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words = ESTATE_STOPWORDS.join("|");
        Regex::new(&format!(r"\b(?:{words})\b")).expect("static regex")
    })
}

fn re_estate_noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words = ESTATE_NOISE.join("|");
        Regex::new(&format!(r"\b(?:{words})\b")).expect("static regex")
    })
}

fn abbreviation_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        ABBREVIATIONS
            .iter()
            .map(|(pattern, replacement)| (Regex::new(pattern).expect("static regex"), *replacement))
            .collect()
    })
}

fn collapse_spaces(s: &str) -> String {
    re_spaces().replace_all(s, " ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Shared cleaning
// ---------------------------------------------------------------------------

/// Shared cleaning routine for addresses and postcodes: lowercase, drop
/// bracketed text, underscores to spaces, drop anything outside
/// `[ a-z0-9-]`, collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let no_brackets = re_brackets().replace_all(&lower, "");
    let spaced: String = no_brackets
        .chars()
        .map(|c| if c == '_' || c.is_whitespace() { ' ' } else { c })
        .collect();
    let allowed = re_not_allowed().replace_all(&spaced, "");
    collapse_spaces(&allowed)
}

/// Full postal-address normalization. Also strips leading zeros from
/// numbers ("flat 04" -> "flat 4").
pub fn normalize_address(raw: &str) -> String {
    let cleaned = clean_text(raw);
    let unpadded = re_inner_zeros().replace_all(&cleaned, "${1}${2}");
    let unpadded = re_leading_zeros().replace(&unpadded, "");
    collapse_spaces(&unpadded)
}

pub fn normalize_postcode(raw: &str) -> String {
    clean_text(raw)
}

/// Sorted numeric-token string of a normalized address. Runs of two or
/// more letters are dropped, so "flat a 12" keeps "a" and "12".
/// "flat 4 12 oak st" and "12 flat 4 oak st" both give "12 4".
pub fn numeric_tokens(normalized: &str) -> String {
    let stripped = re_letter_runs().replace_all(normalized, " ");
    let mut tokens: Vec<&str> = stripped.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Normalize a column of raw addresses. Returns the normalized values and
/// their numeric-token strings, index-aligned with the input. Missing
/// values normalize to "".
pub fn normalize_addresses<'a, I>(raws: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    raws.into_iter()
        .map(|raw| {
            let normalized = normalize_address(raw.unwrap_or(""));
            let numbers = numeric_tokens(&normalized);
            (normalized, numbers)
        })
        .unzip()
}

/// Fold street-type words to abbreviations. Input should already be
/// normalized.
pub fn fold_abbreviations(normalized: &str) -> String {
    let mut out = normalized.to_string();
    for (re, replacement) in abbreviation_rules() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

// ---------------------------------------------------------------------------
// Estate names
// ---------------------------------------------------------------------------

/// Clean a free-text estate or building name for matching: drops
/// punctuation, structural words, numbers, number/letter ranges and
/// single-letter tokens. "123 Oak Road, Flat B" -> "oak flat".
/// Punctuation left over after the word rules becomes a space.
pub fn clean_estate_name(raw: &str) -> String {
    let s = raw.to_lowercase();
    let s = re_estate_punct().replace_all(&s, "");
    let s = re_spaced_hyphen().replace_all(&s, "-");
    let s = re_estate_words().replace_all(&s, "");
    let s = re_and().replace_all(&s, " ");
    let s = re_number_range().replace_all(&s, "");
    let s = re_letter_range().replace_all(&s, "");
    let s = s.replace(['(', ')', '-'], "");
    let s = re_estate_noise().replace_all(&s, "");
    let s = re_digits().replace_all(&s, "");
    let s = re_estate_residual().replace_all(&s, " ");

    s.split_whitespace()
        .filter(|tok| !(tok.chars().count() == 1 && tok.chars().all(|c| c.is_ascii_alphabetic())))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Postcodes
// ---------------------------------------------------------------------------

/// Whether the whole value is a UK postcode, e.g. "NW1 2DB".
pub fn is_uk_postcode(value: &str) -> bool {
    re_postcode_exact().is_match(value.trim())
}

/// First UK postcode found in free text, uppercased.
pub fn extract_postcode(text: &str) -> Option<String> {
    re_postcode()
        .find(text)
        .map(|m| m.as_str().to_uppercase())
}

// ---------------------------------------------------------------------------
// Area names
// ---------------------------------------------------------------------------

/// Canonical form of a local-authority name: "Kingston upon Thames" and
/// "kingston" compare equal, as do "Hammersmith & Fulham" and
/// "Hammersmith and Fulham".
pub fn clean_area_name(name: &str) -> String {
    let lower = format!(" {} ", name.to_lowercase());
    let s = lower
        .replace(" and ", " ")
        .replace(" of ", " ")
        .replace(" upon thames", "")
        .replace(" & ", " ");
    collapse_spaces(&s)
}

/// Resolve `name` against a list of official area names.
pub fn match_area_name<'a>(name: &str, candidates: &'a [String]) -> Result<&'a str, LinkageError> {
    let wanted = clean_area_name(name);
    candidates
        .iter()
        .find(|c| clean_area_name(c) == wanted)
        .map(String::as_str)
        .ok_or_else(|| LinkageError::UnknownArea(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estate_name_strips_road_and_numbers() {
        assert_eq!(clean_estate_name("123 Oak Road, Flat B"), "oak flat");
    }

    #[test]
    fn estate_name_stopwords_case_insensitive() {
        assert_eq!(clean_estate_name("REGENT'S PARK ESTATE"), "regents park");
        assert_eq!(clean_estate_name("Somers Town Est."), "somers town");
    }

    #[test]
    fn estate_name_ranges_and_conjunctions() {
        assert_eq!(clean_estate_name("1-24 Maiden Lane & Agar Grove"), "maiden agar grove");
        assert_eq!(clean_estate_name("Blocks A-F Ampthill Square"), "blocks ampthill");
        assert_eq!(clean_estate_name("Church Street (odd) Flats"), "church");
    }

    #[test]
    fn estate_name_keeps_words_containing_stopwords() {
        assert_eq!(clean_estate_name("Eastway Stonehenge"), "eastway stonehenge");
    }

    #[test]
    fn estate_name_strips_residual_punctuation() {
        assert_eq!(clean_estate_name("St. Mary's Estate #2!"), "marys");
        assert_eq!(clean_estate_name("Oak; Court: Estate"), "oak court");
        assert_eq!(clean_estate_name("\"Regent\" Park"), "regent park");
        assert_eq!(clean_estate_name("Agar/Maiden Grove"), "agar maiden grove");
    }

    #[test]
    fn estate_name_empty() {
        assert_eq!(clean_estate_name(""), "");
        assert_eq!(clean_estate_name("   "), "");
        assert_eq!(clean_estate_name("Unknown"), "");
    }

    #[test]
    fn address_cleaning() {
        assert_eq!(normalize_address("  12 Oak Street,  LONDON "), "12 oak street london");
        assert_eq!(normalize_address("Flat_3 (rear) 14 High St"), "flat 3 14 high st");
        assert_eq!(normalize_address("Flat 04, 100 Kings Rd"), "flat 4 100 kings rd");
        assert_eq!(normalize_address("007 Bond Street"), "7 bond street");
        assert_eq!(normalize_address("12-14 Oak St"), "12-14 oak st");
        assert_eq!(normalize_address(""), "");
        assert_eq!(normalize_address("!!!"), "");
    }

    #[test]
    fn numeric_tokens_are_sorted() {
        let a = numeric_tokens(&normalize_address("Flat 4 12 Oak St"));
        let b = numeric_tokens(&normalize_address("12 Flat 4 Oak St"));
        assert_eq!(a, b);
        assert_eq!(a, "12 4");
    }

    #[test]
    fn numeric_tokens_keep_single_letters() {
        assert_eq!(numeric_tokens("flat a 12"), "12 a");
        assert_eq!(numeric_tokens("oak street"), "");
    }

    #[test]
    fn parallel_normalization() {
        let (normalized, numbers) = normalize_addresses(vec![Some("Flat 2, 10 Elm Rd"), None]);
        assert_eq!(normalized, vec!["flat 2 10 elm rd".to_string(), String::new()]);
        assert_eq!(numbers, vec!["10 2".to_string(), String::new()]);
    }

    #[test]
    fn postcode_cleaning() {
        assert_eq!(normalize_postcode(" NW1  2DB "), "nw1 2db");
        assert_eq!(normalize_postcode("NW1_2DB"), "nw1 2db");
        assert_eq!(normalize_postcode(""), "");
    }

    #[test]
    fn abbreviation_folding() {
        assert_eq!(fold_abbreviations("12 oak street"), "12 oak st");
        assert_eq!(fold_abbreviations("1 abbey road"), "1 abbey rd");
        assert_eq!(fold_abbreviations("1 streetly close"), "1 streetly cl");
    }

    #[test]
    fn postcode_detection() {
        assert!(is_uk_postcode("NW1 2DB"));
        assert!(is_uk_postcode("ec1a1bb"));
        assert!(!is_uk_postcode("NW1 2D"));
        assert_eq!(
            extract_postcode("Flat 3, 14 High Street, London NW1 2DB").as_deref(),
            Some("NW1 2DB")
        );
        assert_eq!(extract_postcode("no postcode here"), None);
    }

    #[test]
    fn area_names() {
        let boroughs = vec![
            "Camden".to_string(),
            "Kingston upon Thames".to_string(),
            "Hammersmith and Fulham".to_string(),
            "City of London".to_string(),
        ];
        assert_eq!(match_area_name("kingston", &boroughs).unwrap(), "Kingston upon Thames");
        assert_eq!(
            match_area_name("Hammersmith & Fulham", &boroughs).unwrap(),
            "Hammersmith and Fulham"
        );
        assert_eq!(match_area_name("city london", &boroughs).unwrap(), "City of London");
        assert!(matches!(
            match_area_name("Atlantis", &boroughs),
            Err(LinkageError::UnknownArea(_))
        ));
    }
}
