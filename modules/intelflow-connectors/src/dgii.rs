//! National tax registry (RNC) connector.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use intelflow_common::{Category, DgiiRecord, DomainRecord, DomainTag, IntelflowError, KeywordMap};

use crate::Connector;

#[derive(Debug, serde::Deserialize)]
struct DgiiResponse {
    #[serde(default)]
    contribuyentes: Vec<DgiiRow>,
}

#[derive(Debug, serde::Deserialize)]
struct DgiiRow {
    #[serde(default)]
    rnc: String,
    #[serde(default)]
    razon_social: String,
    #[serde(default)]
    nombre_comercial: String,
    #[serde(default)]
    estado: String,
    #[serde(default)]
    actividad_economica: String,
    #[serde(default)]
    direccion: String,
}

pub struct DgiiConnector {
    base_url: String,
    client: reqwest::Client,
}

impl DgiiConnector {
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

const SEARCHABLE: [Category; 2] = [Category::CompanyName, Category::ContributorId];
const EXTRACTED: [Category; 3] = [
    Category::CompanyName,
    Category::ContributorId,
    Category::Address,
];

#[async_trait]
impl Connector for DgiiConnector {
    fn tag(&self) -> DomainTag {
        DomainTag::Dgii
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        info!(query, "DGII taxpayer search");

        let resp = self
            .client
            .get(format!("{}/consultas/rnc", self.base_url))
            .query(&[("busqueda", query)])
            .send()
            .await
            .map_err(|e| IntelflowError::Connector(format!("DGII request failed: {e}")))?;

        let data: DgiiResponse = resp
            .json()
            .await
            .map_err(|e| IntelflowError::Connector(format!("DGII response parse failed: {e}")))?;

        let records: Vec<DomainRecord> = data
            .contribuyentes
            .into_iter()
            .map(|r| {
                DomainRecord::Dgii(DgiiRecord {
                    rnc: r.rnc,
                    name: r.razon_social,
                    commercial_name: r.nombre_comercial,
                    status: r.estado,
                    economic_activity: r.actividad_economica,
                    address: r.direccion,
                })
            })
            .collect();

        info!(query, count = records.len(), "DGII search complete");
        Ok(records)
    }

    fn searchable_categories(&self) -> &[Category] {
        &SEARCHABLE
    }

    fn extracted_categories(&self) -> &[Category] {
        &EXTRACTED
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::Dgii(r) = record else {
            return Err(IntelflowError::Extraction(format!(
                "expected DGII record, got {record:?}"
            )));
        };

        let mut map = KeywordMap::new();
        map.push(Category::CompanyName, r.name.clone());
        if !r.commercial_name.is_empty() {
            map.push(Category::CompanyName, r.commercial_name.clone());
        }
        map.push(Category::ContributorId, r.rnc.clone());
        if !r.address.is_empty() {
            map.push(Category::Address, r.address.clone());
        }
        Ok(map)
    }
}
