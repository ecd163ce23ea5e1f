//! Per-domain admission memory for one pipeline run.
//!
//! State lives for the run and is discarded; it is derivable from the
//! persisted steps but never itself persisted.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use intelflow_common::{DomainTag, Step};

pub struct DedupSet {
    skip_duplicates: bool,
    seen: Mutex<HashMap<DomainTag, HashSet<String>>>,
}

impl DedupSet {
    pub fn new(skip_duplicates: bool) -> Self {
        Self {
            skip_duplicates,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Decide admissibility of `(domain, keyword)` and remember it.
    ///
    /// With `skip_duplicates` on, admission succeeds only for unseen
    /// pairs. With it off, every pair is admitted but still recorded, so
    /// the set stays a complete diagnostic of what was scheduled.
    pub fn admit(&self, domain: DomainTag, keyword: &str) -> bool {
        let mut seen = self.seen.lock().expect("dedup lock poisoned");
        let fresh = seen
            .entry(domain)
            .or_default()
            .insert(keyword.to_string());
        if self.skip_duplicates {
            fresh
        } else {
            true
        }
    }
}

/// Fixed rule, independent of `skip_duplicates`: a child must never repeat
/// its parent's exact `(domain, search_parameter)` pair. Cross-category
/// and cross-keyword hits against the same domain stay allowed.
pub fn is_self_cycle(parent: &Step, domain: DomainTag, keyword: &str) -> bool {
    parent.domain_tag == domain && parent.search_parameter == keyword
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelflow_common::Category;
    use uuid::Uuid;

    #[test]
    fn admit_rejects_repeats_when_skipping_duplicates() {
        let dedup = DedupSet::new(true);
        assert!(dedup.admit(DomainTag::Dgii, "Novasco"));
        assert!(!dedup.admit(DomainTag::Dgii, "Novasco"));
        // Same keyword, different domain: admissible.
        assert!(dedup.admit(DomainTag::Scj, "Novasco"));
    }

    #[test]
    fn admit_always_passes_when_not_skipping() {
        let dedup = DedupSet::new(false);
        assert!(dedup.admit(DomainTag::Dgii, "Novasco"));
        assert!(dedup.admit(DomainTag::Dgii, "Novasco"));
    }

    #[test]
    fn self_cycle_matches_exact_pair_only() {
        let parent = Step::seed(
            Uuid::new_v4(),
            DomainTag::Dgii,
            Category::CompanyName,
            "Novasco",
        );
        assert!(is_self_cycle(&parent, DomainTag::Dgii, "Novasco"));
        assert!(!is_self_cycle(&parent, DomainTag::Dgii, "Novasco Holdings"));
        assert!(!is_self_cycle(&parent, DomainTag::Scj, "Novasco"));
    }
}
