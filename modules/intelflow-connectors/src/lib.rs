//! Per-domain connectors and the registry that routes work to them.
//!
//! A `Connector` is a capability bundle for one `DomainTag`: it fetches raw
//! domain-typed records for a query, advertises which keyword categories it
//! accepts as search input and which it emits when its results are mined,
//! and extracts categorized keywords from a single record. Connectors are
//! pure with respect to engine state: they never touch queues, counters, or
//! other connectors.

use async_trait::async_trait;

use intelflow_common::{Category, DomainRecord, DomainTag, IntelflowError, KeywordMap};

pub mod dgii;
pub mod mining;
pub mod onapi;
pub mod pgr;
pub mod registry;
pub mod scj;
pub mod web_search;

pub use registry::ConnectorRegistry;

/// Capability bundle for one domain.
#[async_trait]
pub trait Connector: Send + Sync {
    fn tag(&self) -> DomainTag;

    /// Fetch raw records for a query. Remote failures surface as
    /// `IntelflowError::Connector` and mark the step failed.
    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError>;

    /// Categories this connector accepts as search input. A step whose
    /// origin category is not listed here must not be scheduled against it.
    fn searchable_categories(&self) -> &[Category];

    /// Categories this connector emits when its results are mined.
    fn extracted_categories(&self) -> &[Category];

    /// Categorized keyword contributions of a single record. A record of
    /// the wrong shape is an extraction error, isolated to that record.
    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError>;

    /// Which payload table receives this connector's records. The
    /// web-search family shares one payload kind.
    fn payload_kind(&self) -> DomainTag {
        self.tag()
    }
}
