//! Keyword extraction over a result batch. Pure, no I/O.

use tracing::warn;

use intelflow_common::{normalize_keyword, DomainRecord, KeywordMap};
use intelflow_connectors::Connector;

/// Minimum keyword length after normalization. Shorter strings are noise
/// (initials, stray tokens) and never worth a search.
const MIN_KEYWORD_LEN: usize = 3;

/// Union the per-record extractions of a successful batch into one
/// categorized map, then normalize.
///
/// A record whose extraction fails contributes nothing; the batch and the
/// step stay successful. Output is not deduplicated here: admission
/// control belongs to the dedup set, per domain.
pub fn extract_keywords(connector: &dyn Connector, records: &[DomainRecord]) -> KeywordMap {
    let mut merged = KeywordMap::new();
    for record in records {
        match connector.extract(record) {
            Ok(map) => merged.merge(map),
            Err(e) => {
                warn!(tag = %connector.tag(), error = %e, "Record extraction failed, skipping record");
            }
        }
    }
    normalize(merged)
}

fn normalize(raw: KeywordMap) -> KeywordMap {
    let mut out = KeywordMap::new();
    for (category, keywords) in raw.iter() {
        for keyword in keywords {
            let cleaned = normalize_keyword(keyword);
            if cleaned.chars().count() < MIN_KEYWORD_LEN {
                continue;
            }
            out.push(category, cleaned);
        }
    }
    out
}
