//! Web-search family connectors.
//!
//! Four tags share one search client and one payload shape
//! (`WebLinkRecord`): the general web search plus three specialized
//! variants that shape the query with `site:` / `filetype:` operators.
//! Only the general connector mines keywords from its hits; the
//! specialized ones are leaf consumers of the categories the general one
//! emits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use intelflow_common::{
    Category, DomainRecord, DomainTag, IntelflowError, KeywordMap, WebLinkRecord,
};

use crate::Connector;

const MAX_RESULTS: usize = 10;

const SOCIAL_HOSTS: [&str; 3] = ["instagram.com", "facebook.com", "linkedin.com"];
const DOCUMENT_EXTENSIONS: [&str; 4] = [".pdf", ".doc", ".docx", ".xls"];

// --- Search client ---

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicHit>,
}

#[derive(Debug, serde::Deserialize)]
struct OrganicHit {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    source: String,
}

/// Thin client for the search API shared by the whole family.
pub struct SearchClient {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl SearchClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<WebLinkRecord>, IntelflowError> {
        let body = serde_json::json!({ "q": query, "num": MAX_RESULTS });

        let resp = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| IntelflowError::Connector(format!("search API request failed: {e}")))?;

        let data: SearchResponse = resp.json().await.map_err(|e| {
            IntelflowError::Connector(format!("search API response parse failed: {e}"))
        })?;

        Ok(data
            .organic
            .into_iter()
            .map(|hit| WebLinkRecord {
                title: hit.title,
                url: hit.link,
                snippet: hit.snippet,
                source: hit.source,
            })
            .collect())
    }
}

// --- Family connectors ---

/// One connector per family tag, differing only in query shaping and
/// category advertisement.
pub struct WebSearchConnector {
    tag: DomainTag,
    client: Arc<SearchClient>,
}

impl WebSearchConnector {
    pub fn new(tag: DomainTag, client: Arc<SearchClient>) -> Self {
        debug_assert!(matches!(
            tag,
            DomainTag::WebSearch
                | DomainTag::SocialMedia
                | DomainTag::FileType
                | DomainTag::XSocialMedia
        ));
        Self { tag, client }
    }

    fn shape_query(&self, query: &str) -> String {
        match self.tag {
            DomainTag::SocialMedia => format!(
                "{query} site:instagram.com OR site:facebook.com OR site:linkedin.com"
            ),
            DomainTag::FileType => format!("{query} filetype:pdf OR filetype:doc OR filetype:xls"),
            DomainTag::XSocialMedia => format!("{query} site:x.com"),
            _ => query.to_string(),
        }
    }
}

const WEB_SEARCHABLE: [Category; 3] = [
    Category::CompanyName,
    Category::PersonName,
    Category::Address,
];
const WEB_EXTRACTED: [Category; 3] = [
    Category::SocialMedia,
    Category::FileType,
    Category::XSocialMedia,
];
const SOCIAL_SEARCHABLE: [Category; 1] = [Category::SocialMedia];
const FILE_SEARCHABLE: [Category; 1] = [Category::FileType];
const X_SEARCHABLE: [Category; 1] = [Category::XSocialMedia];

#[async_trait]
impl Connector for WebSearchConnector {
    fn tag(&self) -> DomainTag {
        self.tag
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        let shaped = self.shape_query(query);
        info!(tag = %self.tag, query = shaped.as_str(), "Web search");

        let hits = self.client.search(&shaped).await?;
        info!(tag = %self.tag, count = hits.len(), "Web search complete");
        Ok(hits.into_iter().map(DomainRecord::WebLink).collect())
    }

    fn searchable_categories(&self) -> &[Category] {
        match self.tag {
            DomainTag::SocialMedia => &SOCIAL_SEARCHABLE,
            DomainTag::FileType => &FILE_SEARCHABLE,
            DomainTag::XSocialMedia => &X_SEARCHABLE,
            _ => &WEB_SEARCHABLE,
        }
    }

    fn extracted_categories(&self) -> &[Category] {
        match self.tag {
            DomainTag::WebSearch => &WEB_EXTRACTED,
            _ => &[],
        }
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::WebLink(r) = record else {
            return Err(IntelflowError::Extraction(format!(
                "expected web link record, got {record:?}"
            )));
        };

        let mut map = KeywordMap::new();
        if self.tag != DomainTag::WebSearch {
            return Ok(map);
        }

        let Ok(parsed) = url::Url::parse(&r.url) else {
            return Ok(map);
        };
        let host = parsed.host_str().unwrap_or_default().trim_start_matches("www.");
        let path = parsed.path().to_lowercase();

        if SOCIAL_HOSTS.iter().any(|h| host.ends_with(h)) {
            map.push(Category::SocialMedia, r.url.clone());
        } else if host == "x.com" || host == "twitter.com" {
            map.push(Category::XSocialMedia, r.url.clone());
        } else if DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            map.push(Category::FileType, r.url.clone());
        }
        Ok(map)
    }

    /// The whole family persists into the web link table.
    fn payload_kind(&self) -> DomainTag {
        DomainTag::WebSearch
    }
}
