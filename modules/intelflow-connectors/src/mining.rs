//! Keyword mining helpers shared by the connectors.

use std::sync::LazyLock;

use regex::Regex;

/// Corporate suffixes common in Dominican registries. A name carrying one
/// of these is classified as a company, not a person.
const COMPANY_SUFFIXES: [&str; 10] = [
    "srl", "s.r.l", "sa", "s.a", "sas", "s.a.s", "eirl", "e.i.r.l", "inc", "ltd",
];

static PROPER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+(?:\s+(?:de|del|la|los)\s+)?(?:\s?[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+){1,3}\b")
        .expect("valid proper-name regex")
});

/// True when the string looks like an RNC (9 digits) or cédula (11 digits).
pub fn looks_like_contributor_id(s: &str) -> bool {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    let separators_only = s.chars().all(|c| c.is_ascii_digit() || c == '-' || c == ' ');
    separators_only && (digits.len() == 9 || digits.len() == 11)
}

/// True when the name reads as a natural person rather than an entity:
/// no corporate suffix, two to four words.
pub fn looks_like_person(name: &str) -> bool {
    let lowered = name.to_lowercase();
    let has_suffix = lowered
        .split(|c: char| c.is_whitespace() || c == ',')
        .any(|token| COMPANY_SUFFIXES.contains(&token.trim_matches('.')));
    if has_suffix {
        return false;
    }
    let words = name.split_whitespace().count();
    (2..=4).contains(&words)
}

/// Capitalized multi-word sequences in free text, in document order.
/// Used to mine person and company names out of bulletin prose.
pub fn proper_names(text: &str) -> Vec<String> {
    PROPER_NAME_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Best-effort date parse for registry responses (`YYYY-MM-DD` or
/// `DD/MM/YYYY`).
pub fn parse_registry_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let raw = raw.trim();
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()?;
    Some(
        date.and_hms_opt(0, 0, 0)?
            .and_utc(),
    )
}
