//! Entity extraction by layered pattern matching over letter text.
//!
//! Each field is resolved by an ordered list of pure matchers. The first
//! matcher that returns `Some` wins; later matchers are never consulted.
//! Extraction is total: text that matches nothing yields the sentinels.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::{CorrespondenceType, EntitySet, NAME_UNKNOWN, UNDATED};

/// A pure matcher over raw text.
pub type Matcher = fn(&str) -> Option<String>;

static TITLED_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Mr|Mrs|Ms|Miss|Mx|Dr|Sir|Dame|Lady|Lord)\.?[ \t]+[A-Z][a-z]+[ \t]+[A-Z][a-z]+\b")
        .unwrap()
});

static TITLED_CAPS_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:MR|MRS|MS|MISS|MX|DR|SIR|DAME|LADY|LORD)\.?[ \t]+[A-Z]{2,}[ \t]+[A-Z]{2,}\b")
        .unwrap()
});

static ADJACENT_CAPITALS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+[ \t]+[A-Z][a-z]+\b").unwrap());

static NUMERIC_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}\b").unwrap());

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap());

/// Title token followed by two capitalised words ("Mrs Jane Doe").
pub fn titled_full_name(text: &str) -> Option<String> {
    TITLED_NAME_RE.find(text).map(|m| m.as_str().to_string())
}

/// Upper-case address block ("MRS JANE DOE").
pub fn titled_caps_name(text: &str) -> Option<String> {
    TITLED_CAPS_NAME_RE.find(text).map(|m| m.as_str().to_string())
}

/// Any two adjacent capitalised words.
pub fn adjacent_capitalised_words(text: &str) -> Option<String> {
    ADJACENT_CAPITALS_RE.find(text).map(|m| m.as_str().to_string())
}

/// Numeric dates such as `12/03/2024`, `1-2-24`, `05.11.2023`.
pub fn numeric_date(text: &str) -> Option<String> {
    NUMERIC_DATE_RE.find(text).map(|m| m.as_str().to_string())
}

/// ISO dates such as `2024-03-12`.
pub fn iso_date(text: &str) -> Option<String> {
    ISO_DATE_RE.find(text).map(|m| m.as_str().to_string())
}

/// Name matchers in precedence order.
pub const NAME_MATCHERS: &[Matcher] =
    &[titled_full_name, titled_caps_name, adjacent_capitalised_words];

/// Date matchers in precedence order.
pub const DATE_MATCHERS: &[Matcher] = &[numeric_date, iso_date];

/// Compile a keyword list into one case-insensitive whole-word pattern.
///
/// Each keyword may take a trailing plural `s`; spaces inside a keyword match
/// any run of whitespace. An empty list yields `None`.
pub fn keyword_pattern<S: AsRef<str>>(keywords: &[S]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| {
            k.as_ref()
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})s?\b", alternatives.join("|"))).ok()
}

/// Keyword sets that define each correspondence type, highest priority first.
pub const TYPE_KEYWORDS: &[(CorrespondenceType, &[&str])] = &[
    (
        CorrespondenceType::CouncilTax,
        &["council tax", "liability order", "billing authority", "ctax"],
    ),
    (
        CorrespondenceType::DebtCollection,
        &[
            "debt collection",
            "debt collector",
            "debt recovery",
            "collection agency",
            "recovery agent",
            "outstanding balance",
            "debt purchaser",
        ],
    ),
    (
        CorrespondenceType::Energy,
        &[
            "electricity",
            "energy supplier",
            "energy account",
            "gas supply",
            "gas account",
            "meter reading",
            "prepayment meter",
        ],
    ),
    (
        CorrespondenceType::Water,
        &["water", "sewerage", "wastewater"],
    ),
    (
        CorrespondenceType::Solicitor,
        &[
            "solicitor",
            "law firm",
            "letter before action",
            "letter before claim",
            "on behalf of our client",
        ],
    ),
    (
        CorrespondenceType::BankFinance,
        &[
            "bank account",
            "bank statement",
            "bank loan",
            "banking",
            "building society",
            "overdraft",
            "credit card",
            "loan agreement",
            "mortgage",
            "finance agreement",
        ],
    ),
    (
        CorrespondenceType::LocalAuthority,
        &[
            "council",
            "local authority",
            "borough",
            "penalty charge notice",
            "housing benefit",
        ],
    ),
];

static TYPE_PATTERNS: LazyLock<Vec<(CorrespondenceType, Regex)>> = LazyLock::new(|| {
    TYPE_KEYWORDS
        .iter()
        .filter_map(|(kind, keywords)| keyword_pattern(keywords).map(|re| (*kind, re)))
        .collect()
});

/// First correspondence type whose keyword set hits, else the default.
pub fn detect_correspondence_type(text: &str) -> CorrespondenceType {
    TYPE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
        .unwrap_or_default()
}

/// Run matchers in order and return the first hit.
pub fn first_match(matchers: &[Matcher], text: &str) -> Option<String> {
    matchers.iter().find_map(|m| m(text))
}

/// Extract entities from letter text. Never fails.
pub fn extract(text: &str) -> EntitySet {
    EntitySet {
        name: first_match(NAME_MATCHERS, text).unwrap_or_else(|| NAME_UNKNOWN.to_string()),
        date: first_match(DATE_MATCHERS, text).unwrap_or_else(|| UNDATED.to_string()),
        correspondence_type: detect_correspondence_type(text),
    }
}
