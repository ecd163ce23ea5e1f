//! Supreme court decision index connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use intelflow_common::{Category, DomainRecord, DomainTag, IntelflowError, KeywordMap, ScjRecord};

use crate::mining::{looks_like_person, parse_registry_date};
use crate::Connector;

#[derive(Debug, serde::Deserialize)]
struct ScjResponse {
    #[serde(default)]
    sentencias: Vec<ScjRow>,
}

#[derive(Debug, serde::Deserialize)]
struct ScjRow {
    #[serde(default)]
    numero: String,
    #[serde(default)]
    partes: Vec<String>,
    #[serde(default)]
    tribunal: String,
    #[serde(default)]
    fecha: String,
    #[serde(default)]
    resumen: String,
}

pub struct ScjConnector {
    base_url: String,
    client: reqwest::Client,
}

impl ScjConnector {
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

const SEARCHABLE: [Category; 3] = [
    Category::CompanyName,
    Category::PersonName,
    Category::ContributorId,
];
const EXTRACTED: [Category; 2] = [Category::CompanyName, Category::PersonName];

#[async_trait]
impl Connector for ScjConnector {
    fn tag(&self) -> DomainTag {
        DomainTag::Scj
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        info!(query, "SCJ decision search");

        let resp = self
            .client
            .get(format!("{}/api/sentencias", self.base_url))
            .query(&[("texto", query)])
            .send()
            .await
            .map_err(|e| IntelflowError::Connector(format!("SCJ request failed: {e}")))?;

        let data: ScjResponse = resp
            .json()
            .await
            .map_err(|e| IntelflowError::Connector(format!("SCJ response parse failed: {e}")))?;

        let records: Vec<DomainRecord> = data
            .sentencias
            .into_iter()
            .map(|r| {
                DomainRecord::Scj(ScjRecord {
                    case_number: r.numero,
                    parties: r.partes,
                    court: r.tribunal,
                    decision_date: parse_registry_date(&r.fecha),
                    summary: r.resumen,
                })
            })
            .collect();

        info!(query, count = records.len(), "SCJ search complete");
        Ok(records)
    }

    fn searchable_categories(&self) -> &[Category] {
        &SEARCHABLE
    }

    fn extracted_categories(&self) -> &[Category] {
        &EXTRACTED
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::Scj(r) = record else {
            return Err(IntelflowError::Extraction(format!(
                "expected SCJ record, got {record:?}"
            )));
        };

        let mut map = KeywordMap::new();
        for party in &r.parties {
            if looks_like_person(party) {
                map.push(Category::PersonName, party.clone());
            } else {
                map.push(Category::CompanyName, party.clone());
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_classifies_parties() {
        let connector = ScjConnector::new("https://example.test");
        let record = DomainRecord::Scj(ScjRecord {
            case_number: "2023-00123".to_string(),
            parties: vec![
                "Ada Pérez".to_string(),
                "Novasco Holdings SRL".to_string(),
            ],
            court: "Primera Sala".to_string(),
            decision_date: None,
            summary: String::new(),
        });

        let map = connector.extract(&record).unwrap();
        assert_eq!(map.get(Category::PersonName), &["Ada Pérez"]);
        assert_eq!(map.get(Category::CompanyName), &["Novasco Holdings SRL"]);
    }
}
