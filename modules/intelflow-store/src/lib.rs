//! Postgres implementation of the engine's persistence port.
//!
//! Raw runtime-checked queries over a `PgPool`. Each port operation is
//! independently atomic: single statements, except the payload batch which
//! wraps its inserts in one transaction. Cascade deletes flow from
//! `pipeline` downward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use intelflow_common::{
    Category, DomainRecord, DomainTag, IntelflowError, Pipeline, SearchResult, Step,
};
use intelflow_engine::PipelineStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, IntelflowError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<(), IntelflowError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IntelflowError::Database(e.to_string()))?;
        info!("Migrations applied");
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> IntelflowError {
    IntelflowError::Database(e.to_string())
}

// --- Row types ---

#[derive(Debug, sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    config: serde_json::Value,
    total_steps: i32,
    successful_steps: i32,
    failed_steps: i32,
    max_depth_reached: i32,
}

impl PipelineRow {
    fn into_pipeline(self) -> Result<Pipeline, IntelflowError> {
        Ok(Pipeline {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            config: serde_json::from_value(self.config)
                .map_err(|e| IntelflowError::Database(format!("bad config json: {e}")))?,
            total_steps: self.total_steps as u32,
            successful_steps: self.successful_steps as u32,
            failed_steps: self.failed_steps as u32,
            max_depth_reached: self.max_depth_reached as u32,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StepRow {
    id: Uuid,
    pipeline_id: Uuid,
    domain_tag: String,
    search_parameter: String,
    category: String,
    keywords: serde_json::Value,
    success: bool,
    error_text: String,
    depth: i32,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl StepRow {
    fn into_step(self) -> Result<Step, IntelflowError> {
        Ok(Step {
            id: self.id,
            pipeline_id: self.pipeline_id,
            domain_tag: parse_tag(&self.domain_tag)?,
            search_parameter: self.search_parameter,
            origin_category: parse_category(&self.category)?,
            origin_keywords: serde_json::from_value(self.keywords)
                .map_err(|e| IntelflowError::Database(format!("bad keywords json: {e}")))?,
            depth: self.depth as u32,
            success: self.success,
            error_text: self.error_text,
            enqueued_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

fn parse_tag(raw: &str) -> Result<DomainTag, IntelflowError> {
    raw.parse()
        .map_err(|e: String| IntelflowError::Database(e))
}

fn parse_category(raw: &str) -> Result<Category, IntelflowError> {
    raw.parse()
        .map_err(|e: String| IntelflowError::Database(e))
}

// --- Port implementation ---

#[async_trait]
impl PipelineStore for PgStore {
    async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<(), IntelflowError> {
        let config = serde_json::to_value(&pipeline.config)
            .map_err(|e| IntelflowError::Database(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO pipeline
                (id, created_at, updated_at, config,
                 total_steps, successful_steps, failed_steps, max_depth_reached)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(pipeline.id)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .bind(&config)
        .bind(pipeline.total_steps as i32)
        .bind(pipeline.successful_steps as i32)
        .bind(pipeline.failed_steps as i32)
        .bind(pipeline.max_depth_reached as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_pipeline_counters(
        &self,
        id: Uuid,
        total_steps: u32,
        successful_steps: u32,
        failed_steps: u32,
        max_depth_reached: u32,
    ) -> Result<(), IntelflowError> {
        sqlx::query(
            r#"
            UPDATE pipeline
            SET total_steps = $2,
                successful_steps = $3,
                failed_steps = $4,
                max_depth_reached = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(total_steps as i32)
        .bind(successful_steps as i32)
        .bind(failed_steps as i32)
        .bind(max_depth_reached as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn create_step(&self, step: &Step) -> Result<(), IntelflowError> {
        let keywords = serde_json::to_value(&step.origin_keywords)
            .map_err(|e| IntelflowError::Database(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_step
                (id, pipeline_id, domain_tag, search_parameter, category,
                 keywords, success, error_text, depth, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(step.id)
        .bind(step.pipeline_id)
        .bind(step.domain_tag.as_str())
        .bind(&step.search_parameter)
        .bind(step.origin_category.as_str())
        .bind(&keywords)
        .bind(step.success)
        .bind(&step.error_text)
        .bind(step.depth as i32)
        .bind(step.enqueued_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_step_terminal(&self, step: &Step) -> Result<(), IntelflowError> {
        let updated = sqlx::query(
            r#"
            UPDATE pipeline_step
            SET success = $2,
                error_text = $3,
                completed_at = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(step.id)
        .bind(step.success)
        .bind(&step.error_text)
        .bind(step.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(IntelflowError::Database(format!(
                "no pipeline_step row for {}",
                step.id
            )));
        }
        Ok(())
    }

    async fn create_search_result(&self, result: &SearchResult) -> Result<(), IntelflowError> {
        let keywords = serde_json::to_value(&result.keywords_per_category)
            .map_err(|e| IntelflowError::Database(e.to_string()))?;
        let output = serde_json::to_value(&result.records)
            .map_err(|e| IntelflowError::Database(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO search_result
                (id, pipeline_step_id, domain_tag, search_parameter,
                 success, error_text, keywords_per_category, output,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            "#,
        )
        .bind(result.id)
        .bind(result.step_id)
        .bind(result.domain_tag.as_str())
        .bind(&result.search_parameter)
        .bind(result.success)
        .bind(&result.error_text)
        .bind(&keywords)
        .bind(&output)
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn create_payload_rows(
        &self,
        payload_kind: DomainTag,
        search_result_id: Uuid,
        records: &[DomainRecord],
    ) -> Result<(), IntelflowError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for record in records {
            match (payload_kind, record) {
                (DomainTag::Onapi, DomainRecord::Onapi(r)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO onapi_record
                            (id, search_result_id, trademark, owner,
                             registration_number, status, class_code, filing_date)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(search_result_id)
                    .bind(&r.trademark)
                    .bind(&r.owner)
                    .bind(&r.registration_number)
                    .bind(&r.status)
                    .bind(&r.class_code)
                    .bind(r.filing_date)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (DomainTag::Scj, DomainRecord::Scj(r)) => {
                    let parties = serde_json::to_value(&r.parties)
                        .map_err(|e| IntelflowError::Database(e.to_string()))?;
                    sqlx::query(
                        r#"
                        INSERT INTO scj_record
                            (id, search_result_id, case_number, parties,
                             court, decision_date, summary)
                        VALUES ($1, $2, $3, $4, $5, $6, $7)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(search_result_id)
                    .bind(&r.case_number)
                    .bind(&parties)
                    .bind(&r.court)
                    .bind(r.decision_date)
                    .bind(&r.summary)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (DomainTag::Dgii, DomainRecord::Dgii(r)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO dgii_record
                            (id, search_result_id, rnc, name, commercial_name,
                             status, economic_activity, address)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(search_result_id)
                    .bind(&r.rnc)
                    .bind(&r.name)
                    .bind(&r.commercial_name)
                    .bind(&r.status)
                    .bind(&r.economic_activity)
                    .bind(&r.address)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (DomainTag::Pgr, DomainRecord::Pgr(r)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO pgr_record
                            (id, search_result_id, title, url, summary, published_at)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(search_result_id)
                    .bind(&r.title)
                    .bind(&r.url)
                    .bind(&r.summary)
                    .bind(r.published_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (DomainTag::WebSearch, DomainRecord::WebLink(r)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO web_link_record
                            (id, search_result_id, title, url, snippet, source)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(search_result_id)
                    .bind(&r.title)
                    .bind(&r.url)
                    .bind(&r.snippet)
                    .bind(&r.source)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                }
                (kind, record) => {
                    return Err(IntelflowError::Database(format!(
                        "record does not match payload kind {kind}: {record:?}"
                    )));
                }
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn list_steps_by_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<Step>, IntelflowError> {
        let rows = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, pipeline_id, domain_tag, search_parameter, category,
                   keywords, success, error_text, depth, created_at, completed_at
            FROM pipeline_step
            WHERE pipeline_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(StepRow::into_step).collect()
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, IntelflowError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, created_at, updated_at, config,
                   total_steps, successful_steps, failed_steps, max_depth_reached
            FROM pipeline
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PipelineRow::into_pipeline).transpose()
    }

    async fn delete_pipeline(&self, id: Uuid) -> Result<(), IntelflowError> {
        sqlx::query("DELETE FROM pipeline WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
