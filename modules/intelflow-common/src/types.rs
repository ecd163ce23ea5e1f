use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IntelflowError;

// --- Domains ---

/// The external data sources the engine can dispatch to.
///
/// Declaration order is authoritative: seed steps are enqueued in this
/// order, and candidate connectors for a derived keyword are evaluated in
/// this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainTag {
    Onapi,
    Scj,
    Dgii,
    Pgr,
    WebSearch,
    SocialMedia,
    FileType,
    XSocialMedia,
}

impl DomainTag {
    pub const ALL: [DomainTag; 8] = [
        DomainTag::Onapi,
        DomainTag::Scj,
        DomainTag::Dgii,
        DomainTag::Pgr,
        DomainTag::WebSearch,
        DomainTag::SocialMedia,
        DomainTag::FileType,
        DomainTag::XSocialMedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainTag::Onapi => "onapi",
            DomainTag::Scj => "scj",
            DomainTag::Dgii => "dgii",
            DomainTag::Pgr => "pgr",
            DomainTag::WebSearch => "web_search",
            DomainTag::SocialMedia => "social_media",
            DomainTag::FileType => "file_type",
            DomainTag::XSocialMedia => "x_social_media",
        }
    }
}

impl std::fmt::Display for DomainTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DomainTag {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "onapi" => Ok(Self::Onapi),
            "scj" => Ok(Self::Scj),
            "dgii" => Ok(Self::Dgii),
            "pgr" => Ok(Self::Pgr),
            "web_search" => Ok(Self::WebSearch),
            "social_media" => Ok(Self::SocialMedia),
            "file_type" => Ok(Self::FileType),
            "x_social_media" => Ok(Self::XSocialMedia),
            other => Err(format!("unknown DomainTag: {other}")),
        }
    }
}

// --- Keyword categories ---

/// Typed label for an extracted keyword, used to route it to connectors
/// that declare the category searchable.
///
/// Declaration order is the iteration order during expansion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    CompanyName,
    PersonName,
    ContributorId,
    Address,
    SocialMedia,
    FileType,
    XSocialMedia,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::CompanyName,
        Category::PersonName,
        Category::ContributorId,
        Category::Address,
        Category::SocialMedia,
        Category::FileType,
        Category::XSocialMedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CompanyName => "company_name",
            Category::PersonName => "person_name",
            Category::ContributorId => "contributor_id",
            Category::Address => "address",
            Category::SocialMedia => "social_media",
            Category::FileType => "file_type",
            Category::XSocialMedia => "x_social_media",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "company_name" => Ok(Self::CompanyName),
            "person_name" => Ok(Self::PersonName),
            "contributor_id" => Ok(Self::ContributorId),
            "address" => Ok(Self::Address),
            "social_media" => Ok(Self::SocialMedia),
            "file_type" => Ok(Self::FileType),
            "x_social_media" => Ok(Self::XSocialMedia),
            other => Err(format!("unknown Category: {other}")),
        }
    }
}

// --- Keyword map ---

/// Categorized keywords extracted from a result batch.
///
/// Categories iterate in `Category` declaration order; keywords within a
/// category keep their first-observed order across the batch. Duplicates
/// are allowed here; admission control is the dedup set's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordMap {
    entries: BTreeMap<Category, Vec<String>>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keyword to a category, preserving insertion order.
    pub fn push(&mut self, category: Category, keyword: impl Into<String>) {
        self.entries.entry(category).or_default().push(keyword.into());
    }

    /// Merge another map into this one, appending in order.
    pub fn merge(&mut self, other: KeywordMap) {
        for (category, keywords) in other.entries {
            self.entries.entry(category).or_default().extend(keywords);
        }
    }

    pub fn get(&self, category: Category) -> &[String] {
        self.entries.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.entries.iter().map(|(c, ks)| (*c, ks.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Total keyword count across all categories.
    pub fn keyword_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

// --- Pipeline configuration ---

/// Options controlling one pipeline run. Persisted verbatim on the
/// pipeline header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seed keyword for all seed steps.
    pub query: String,

    /// Steps whose depth has reached this bound still execute but never
    /// expand.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Upper bound on concurrent step executions.
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,

    /// Global throttle between any two dispatches.
    #[serde(default = "default_delay_between_steps")]
    pub delay_between_steps_seconds: u64,

    /// Toggles dedup-set admission of repeat (domain, keyword) pairs.
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,

    /// Restricts which domains seed and receive derived work.
    #[serde(default = "default_available_domains")]
    pub available_domains: Vec<DomainTag>,
}

fn default_max_depth() -> u32 {
    5
}

fn default_max_concurrent_steps() -> usize {
    10
}

fn default_delay_between_steps() -> u64 {
    2
}

fn default_skip_duplicates() -> bool {
    true
}

fn default_available_domains() -> Vec<DomainTag> {
    DomainTag::ALL.to_vec()
}

impl PipelineConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_depth: default_max_depth(),
            max_concurrent_steps: default_max_concurrent_steps(),
            delay_between_steps_seconds: default_delay_between_steps(),
            skip_duplicates: default_skip_duplicates(),
            available_domains: default_available_domains(),
        }
    }

    /// Validate before any state is created.
    pub fn validate(&self) -> Result<(), IntelflowError> {
        if self.query.trim().is_empty() {
            return Err(IntelflowError::Validation("query must not be empty".into()));
        }
        if self.max_concurrent_steps == 0 {
            return Err(IntelflowError::Validation(
                "max_concurrent_steps must be at least 1".into(),
            ));
        }
        if self.available_domains.is_empty() {
            return Err(IntelflowError::Validation(
                "available_domains must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn allows_domain(&self, tag: DomainTag) -> bool {
        self.available_domains.contains(&tag)
    }
}

// --- Pipeline aggregate ---

/// Header row for one pipeline run. Counters are written once, at
/// finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub total_steps: u32,
    pub successful_steps: u32,
    pub failed_steps: u32,
    pub max_depth_reached: u32,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_id(Uuid::new_v4(), config)
    }

    /// Caller-supplied id, for surfaces that hand the id out before the
    /// run completes.
    pub fn with_id(id: Uuid, config: PipelineConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            config,
            total_steps: 0,
            successful_steps: 0,
            failed_steps: 0,
            max_depth_reached: 0,
        }
    }
}

// --- Steps ---

/// One search against one domain. Created pending, executed at most once,
/// terminal as succeeded or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub domain_tag: DomainTag,
    pub search_parameter: String,
    pub origin_category: Category,
    pub origin_keywords: Vec<String>,
    pub depth: u32,
    pub success: bool,
    /// Empty iff the step succeeded (or has not completed yet).
    pub error_text: String,
    pub enqueued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// A depth-0 step created at pipeline start from the seed query.
    pub fn seed(
        pipeline_id: Uuid,
        domain_tag: DomainTag,
        origin_category: Category,
        query: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            domain_tag,
            search_parameter: query.to_string(),
            origin_category,
            origin_keywords: vec![query.to_string()],
            depth: 0,
            success: false,
            error_text: String::new(),
            enqueued_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A step created by extraction from a parent step's results.
    pub fn derived(
        pipeline_id: Uuid,
        domain_tag: DomainTag,
        origin_category: Category,
        keyword: &str,
        depth: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            domain_tag,
            search_parameter: keyword.to_string(),
            origin_category,
            origin_keywords: vec![keyword.to_string()],
            depth,
            success: false,
            error_text: String::new(),
            enqueued_at: Utc::now(),
            completed_at: None,
        }
    }
}

// --- Search results ---

/// Outcome of one executed step, 1:1 with the step row. Payload records
/// are owned by the result and persisted to the table matching the
/// connector's payload kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: Uuid,
    pub step_id: Uuid,
    pub domain_tag: DomainTag,
    pub search_parameter: String,
    pub success: bool,
    pub error_text: String,
    pub keywords_per_category: KeywordMap,
    pub records: Vec<DomainRecord>,
    pub created_at: DateTime<Utc>,
}

impl SearchResult {
    pub fn success(
        step: &Step,
        keywords_per_category: KeywordMap,
        records: Vec<DomainRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id: step.id,
            domain_tag: step.domain_tag,
            search_parameter: step.search_parameter.clone(),
            success: true,
            error_text: String::new(),
            keywords_per_category,
            records,
            created_at: Utc::now(),
        }
    }

    pub fn failure(step: &Step, error_text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id: step.id,
            domain_tag: step.domain_tag,
            search_parameter: step.search_parameter.clone(),
            success: false,
            error_text,
            keywords_per_category: KeywordMap::new(),
            records: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

// --- Domain payload records ---

/// One record fetched from a domain. The engine treats these as opaque
/// beyond routing them to the matching payload table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainRecord {
    Onapi(OnapiRecord),
    Scj(ScjRecord),
    Dgii(DgiiRecord),
    Pgr(PgrRecord),
    WebLink(WebLinkRecord),
}

/// Trademark filing from the industrial property registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnapiRecord {
    pub trademark: String,
    pub owner: String,
    pub registration_number: String,
    pub status: String,
    pub class_code: String,
    pub filing_date: Option<DateTime<Utc>>,
}

/// Court decision from the supreme court search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScjRecord {
    pub case_number: String,
    pub parties: Vec<String>,
    pub court: String,
    pub decision_date: Option<DateTime<Utc>>,
    pub summary: String,
}

/// Taxpayer entry from the national tax registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DgiiRecord {
    pub rnc: String,
    pub name: String,
    pub commercial_name: String,
    pub status: String,
    pub economic_activity: String,
    pub address: String,
}

/// News item or case note from the attorney-general bulletin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgrRecord {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Search hit shared by the whole web-search family of domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebLinkRecord {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_map_preserves_insertion_order() {
        let mut map = KeywordMap::new();
        map.push(Category::PersonName, "Ada Pérez");
        map.push(Category::CompanyName, "Novasco Holdings");
        map.push(Category::CompanyName, "Acme SRL");

        let categories: Vec<Category> = map.iter().map(|(c, _)| c).collect();
        assert_eq!(categories, vec![Category::CompanyName, Category::PersonName]);
        assert_eq!(
            map.get(Category::CompanyName),
            &["Novasco Holdings".to_string(), "Acme SRL".to_string()]
        );
    }

    #[test]
    fn keyword_map_merge_appends() {
        let mut a = KeywordMap::new();
        a.push(Category::CompanyName, "First");
        let mut b = KeywordMap::new();
        b.push(Category::CompanyName, "Second");
        b.push(Category::Address, "Av. Winston Churchill 93");
        a.merge(b);

        assert_eq!(a.get(Category::CompanyName), &["First", "Second"]);
        assert_eq!(a.keyword_count(), 3);
    }

    #[test]
    fn config_validation_rejects_empty_query() {
        let config = PipelineConfig::new("   ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_validation_rejects_zero_concurrency() {
        let mut config = PipelineConfig::new("Novasco");
        config.max_concurrent_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::new("Novasco");
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_concurrent_steps, 10);
        assert_eq!(config.delay_between_steps_seconds, 2);
        assert!(config.skip_duplicates);
        assert_eq!(config.available_domains.len(), DomainTag::ALL.len());
    }

    #[test]
    fn domain_tag_round_trips_through_str() {
        for tag in DomainTag::ALL {
            assert_eq!(tag.as_str().parse::<DomainTag>().unwrap(), tag);
        }
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn seed_step_carries_query_as_origin() {
        let step = Step::seed(Uuid::new_v4(), DomainTag::Onapi, Category::CompanyName, "Novasco");
        assert_eq!(step.depth, 0);
        assert_eq!(step.origin_keywords, vec!["Novasco".to_string()]);
        assert_eq!(step.search_parameter, "Novasco");
    }
}
