//! Industrial property registry (trademarks) connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use intelflow_common::{
    Category, DomainRecord, DomainTag, IntelflowError, KeywordMap, OnapiRecord,
};

use crate::mining::{looks_like_person, parse_registry_date};
use crate::Connector;

#[derive(Debug, serde::Deserialize)]
struct OnapiResponse {
    #[serde(default)]
    results: Vec<OnapiRow>,
}

#[derive(Debug, serde::Deserialize)]
struct OnapiRow {
    #[serde(default)]
    signo: String,
    #[serde(default)]
    titular: String,
    #[serde(default)]
    registro: String,
    #[serde(default)]
    estado: String,
    #[serde(default)]
    clase: String,
    #[serde(default)]
    fecha_solicitud: String,
}

pub struct OnapiConnector {
    base_url: String,
    client: reqwest::Client,
}

impl OnapiConnector {
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

const SEARCHABLE: [Category; 1] = [Category::CompanyName];
const EXTRACTED: [Category; 2] = [Category::CompanyName, Category::PersonName];

#[async_trait]
impl Connector for OnapiConnector {
    fn tag(&self) -> DomainTag {
        DomainTag::Onapi
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        info!(query, "ONAPI trademark search");

        let body = serde_json::json!({ "criterio": query, "tipo": "signos" });
        let resp = self
            .client
            .post(format!("{}/api/signos/buscar", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| IntelflowError::Connector(format!("ONAPI request failed: {e}")))?;

        let data: OnapiResponse = resp
            .json()
            .await
            .map_err(|e| IntelflowError::Connector(format!("ONAPI response parse failed: {e}")))?;

        let records: Vec<DomainRecord> = data
            .results
            .into_iter()
            .map(|r| {
                DomainRecord::Onapi(OnapiRecord {
                    trademark: r.signo,
                    owner: r.titular,
                    registration_number: r.registro,
                    status: r.estado,
                    class_code: r.clase,
                    filing_date: parse_registry_date(&r.fecha_solicitud),
                })
            })
            .collect();

        info!(query, count = records.len(), "ONAPI search complete");
        Ok(records)
    }

    fn searchable_categories(&self) -> &[Category] {
        &SEARCHABLE
    }

    fn extracted_categories(&self) -> &[Category] {
        &EXTRACTED
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::Onapi(r) = record else {
            return Err(IntelflowError::Extraction(format!(
                "expected ONAPI record, got {record:?}"
            )));
        };

        let mut map = KeywordMap::new();
        map.push(Category::CompanyName, r.trademark.clone());
        if looks_like_person(&r.owner) {
            map.push(Category::PersonName, r.owner.clone());
        } else {
            map.push(Category::CompanyName, r.owner.clone());
        }
        Ok(map)
    }
}
