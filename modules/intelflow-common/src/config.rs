use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Postgres
    pub database_url: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Web search provider
    pub search_api_key: String,
    pub search_api_url: String,

    // Registry source endpoints
    pub onapi_base_url: String,
    pub dgii_base_url: String,
    pub scj_base_url: String,
    pub pgr_base_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            search_api_key: env::var("SEARCH_API_KEY").unwrap_or_default(),
            search_api_url: env::var("SEARCH_API_URL")
                .unwrap_or_else(|_| "https://google.serper.dev/search".to_string()),
            onapi_base_url: env::var("ONAPI_BASE_URL")
                .unwrap_or_else(|_| "https://consultas.onapi.gob.do".to_string()),
            dgii_base_url: env::var("DGII_BASE_URL")
                .unwrap_or_else(|_| "https://dgii.gov.do/app/WebApps/ConsultasWeb".to_string()),
            scj_base_url: env::var("SCJ_BASE_URL")
                .unwrap_or_else(|_| "https://consultasentencias.poderjudicial.gob.do".to_string()),
            pgr_base_url: env::var("PGR_BASE_URL")
                .unwrap_or_else(|_| "https://pgr.gob.do".to_string()),
        }
    }

    /// Log the presence of each sensitive value without exposing it.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("SEARCH_API_KEY", &self.search_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
