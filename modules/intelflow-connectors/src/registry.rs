//! Connector registry and seed-affinity map.
//!
//! Built once at startup, read-only during runs. A lookup miss for a
//! selected domain is a configuration error, surfaced before any pipeline
//! state is created.

use std::collections::HashMap;
use std::sync::Arc;

use intelflow_common::{AppConfig, Category, DomainTag, IntelflowError};

use crate::dgii::DgiiConnector;
use crate::onapi::OnapiConnector;
use crate::pgr::PgrConnector;
use crate::scj::ScjConnector;
use crate::web_search::{SearchClient, WebSearchConnector};
use crate::Connector;

/// Seed category per domain, used only to seed the work queue. Domains
/// missing here are never seeded but still receive derived work.
pub const SEED_AFFINITY: [(DomainTag, Category); 5] = [
    (DomainTag::Onapi, Category::CompanyName),
    (DomainTag::Scj, Category::ContributorId),
    (DomainTag::Dgii, Category::ContributorId),
    (DomainTag::Pgr, Category::PersonName),
    (DomainTag::WebSearch, Category::CompanyName),
];

pub struct ConnectorRegistry {
    connectors: HashMap<DomainTag, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Self {
        Self {
            connectors: connectors.into_iter().map(|c| (c.tag(), c)).collect(),
        }
    }

    /// Wire up the full production set from application config.
    pub fn from_config(config: &AppConfig) -> Self {
        let search = Arc::new(SearchClient::new(
            &config.search_api_url,
            &config.search_api_key,
        ));
        Self::new(vec![
            Arc::new(OnapiConnector::new(&config.onapi_base_url)),
            Arc::new(ScjConnector::new(&config.scj_base_url)),
            Arc::new(DgiiConnector::new(&config.dgii_base_url)),
            Arc::new(PgrConnector::new(&config.pgr_base_url)),
            Arc::new(WebSearchConnector::new(DomainTag::WebSearch, search.clone())),
            Arc::new(WebSearchConnector::new(DomainTag::SocialMedia, search.clone())),
            Arc::new(WebSearchConnector::new(DomainTag::FileType, search.clone())),
            Arc::new(WebSearchConnector::new(DomainTag::XSocialMedia, search)),
        ])
    }

    pub fn get(&self, tag: DomainTag) -> Result<&Arc<dyn Connector>, IntelflowError> {
        self.connectors
            .get(&tag)
            .ok_or_else(|| IntelflowError::Config(format!("no connector registered for {tag}")))
    }

    pub fn contains(&self, tag: DomainTag) -> bool {
        self.connectors.contains_key(&tag)
    }

    /// Registered domains that accept `category` as search input, in
    /// `DomainTag` declaration order.
    pub fn searchable_on(&self, category: Category) -> Vec<DomainTag> {
        DomainTag::ALL
            .iter()
            .copied()
            .filter(|tag| {
                self.connectors
                    .get(tag)
                    .is_some_and(|c| c.searchable_categories().contains(&category))
            })
            .collect()
    }

    /// Seed entries restricted to registered domains, in declaration order.
    pub fn seed_affinity(&self) -> Vec<(DomainTag, Category)> {
        SEED_AFFINITY
            .iter()
            .copied()
            .filter(|(tag, _)| self.contains(*tag))
            .collect()
    }
}
