//! Attorney-general bulletin connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use intelflow_common::{Category, DomainRecord, DomainTag, IntelflowError, KeywordMap, PgrRecord};

use crate::mining::{looks_like_person, parse_registry_date, proper_names};
use crate::Connector;

#[derive(Debug, serde::Deserialize)]
struct PgrResponse {
    #[serde(default)]
    noticias: Vec<PgrRow>,
}

#[derive(Debug, serde::Deserialize)]
struct PgrRow {
    #[serde(default)]
    titulo: String,
    #[serde(default)]
    enlace: String,
    #[serde(default)]
    resumen: String,
    #[serde(default)]
    fecha: String,
}

pub struct PgrConnector {
    base_url: String,
    client: reqwest::Client,
}

impl PgrConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

const SEARCHABLE: [Category; 2] = [Category::PersonName, Category::CompanyName];
const EXTRACTED: [Category; 2] = [Category::PersonName, Category::CompanyName];

#[async_trait]
impl Connector for PgrConnector {
    fn tag(&self) -> DomainTag {
        DomainTag::Pgr
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        info!(query, "PGR bulletin search");

        let resp = self
            .client
            .get(format!("{}/api/noticias", self.base_url))
            .query(&[("buscar", query)])
            .send()
            .await
            .map_err(|e| IntelflowError::Connector(format!("PGR request failed: {e}")))?;

        let data: PgrResponse = resp
            .json()
            .await
            .map_err(|e| IntelflowError::Connector(format!("PGR response parse failed: {e}")))?;

        let records: Vec<DomainRecord> = data
            .noticias
            .into_iter()
            .map(|r| {
                DomainRecord::Pgr(PgrRecord {
                    title: r.titulo,
                    url: r.enlace,
                    summary: r.resumen,
                    published_at: parse_registry_date(&r.fecha),
                })
            })
            .collect();

        info!(query, count = records.len(), "PGR search complete");
        Ok(records)
    }

    fn searchable_categories(&self) -> &[Category] {
        &SEARCHABLE
    }

    fn extracted_categories(&self) -> &[Category] {
        &EXTRACTED
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::Pgr(r) = record else {
            return Err(IntelflowError::Extraction(format!(
                "expected PGR record, got {record:?}"
            )));
        };

        let mut map = KeywordMap::new();
        let text = format!("{} {}", r.title, r.summary);
        for name in proper_names(&text) {
            if looks_like_person(&name) {
                map.push(Category::PersonName, name);
            } else {
                map.push(Category::CompanyName, name);
            }
        }
        Ok(map)
    }
}
