pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::IntelflowError;
pub use types::*;

/// Normalize a keyword before it is routed or deduplicated: trim whitespace
/// and collapse internal runs of whitespace to single spaces.
///
/// ```
/// assert_eq!(intelflow_common::normalize_keyword("  Novasco   Holdings "), "Novasco Holdings");
/// assert_eq!(intelflow_common::normalize_keyword("\tAda Pérez\n"), "Ada Pérez");
/// ```
pub fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<&str>>().join(" ")
}
