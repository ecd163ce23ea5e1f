//! Run ledger and aggregate stats.
//!
//! Workers append one outcome per terminal step; the finalizer computes
//! the header counters from the ledger in a single pass. This is the one
//! counter model for both the blocking and streaming entry points.

use std::sync::Mutex;

use intelflow_common::DomainTag;

/// One terminal step as observed by the executor.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub domain_tag: DomainTag,
    pub depth: u32,
    pub success: bool,
    pub keywords_extracted: u32,
    pub children_enqueued: u32,
    pub duplicates_skipped: u32,
}

#[derive(Default)]
pub struct RunLedger {
    entries: Mutex<Vec<StepOutcome>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: StepOutcome) {
        self.entries.lock().expect("ledger lock poisoned").push(outcome);
    }

    /// Aggregate the ledger. Called once, at finalization.
    pub fn finalize(&self) -> PipelineStats {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        let mut stats = PipelineStats::default();
        for outcome in entries.iter() {
            stats.steps_executed += 1;
            if outcome.success {
                stats.steps_succeeded += 1;
            } else {
                stats.steps_failed += 1;
            }
            stats.max_depth_reached = stats.max_depth_reached.max(outcome.depth);
            stats.keywords_extracted += outcome.keywords_extracted;
            stats.children_enqueued += outcome.children_enqueued;
            stats.duplicates_skipped += outcome.duplicates_skipped;
            if let Some(i) = DomainTag::ALL.iter().position(|t| *t == outcome.domain_tag) {
                stats.by_domain[i] += 1;
            }
        }
        stats
    }
}

/// Stats from one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    pub steps_executed: u32,
    pub steps_succeeded: u32,
    pub steps_failed: u32,
    pub max_depth_reached: u32,
    pub keywords_extracted: u32,
    pub children_enqueued: u32,
    pub duplicates_skipped: u32,
    /// Step counts in `DomainTag` declaration order.
    pub by_domain: [u32; 8],
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Pipeline Run Complete ===")?;
        writeln!(f, "Steps executed:     {}", self.steps_executed)?;
        writeln!(f, "Steps succeeded:    {}", self.steps_succeeded)?;
        writeln!(f, "Steps failed:       {}", self.steps_failed)?;
        writeln!(f, "Max depth reached:  {}", self.max_depth_reached)?;
        writeln!(f, "Keywords extracted: {}", self.keywords_extracted)?;
        writeln!(f, "Children enqueued:  {}", self.children_enqueued)?;
        writeln!(f, "Duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "\nBy domain:")?;
        for (i, tag) in DomainTag::ALL.iter().enumerate() {
            if self.by_domain[i] > 0 {
                writeln!(f, "  {:<16} {}", tag.to_string(), self.by_domain[i])?;
            }
        }
        Ok(())
    }
}
