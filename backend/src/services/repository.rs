//! Persistence for [`Analysis`] records: state-machine-enforcing CRUD
//! over a `sqlx` SQLite pool, mirroring the teacher's `*Service`
//! structs wrapping a `Pool<Sqlite>`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Analysis, AnalysisResult, AnalysisRow, AnalysisStatus, ImageRef};
use crate::utils::ApiError;

/// One page of [`AnalysisService::list`]/[`AnalysisRepository::list`] filters.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFilter {
    pub code: Option<String>,
    pub status: Option<AnalysisStatus>,
    pub created_at_from: Option<NaiveDate>,
    pub created_at_to: Option<NaiveDate>,
}

/// Pre-pagination cap named by the spec: `list` never considers more
/// than this many rows before slicing out a page.
pub const LIST_HARD_CAP: i64 = 2000;

const MAX_CODE_ATTEMPTS: u32 = 10;

#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn insert_open(&self, image_ref: ImageRef) -> Result<Analysis, ApiError>;
    async fn get(&self, id: Uuid) -> Result<Analysis, ApiError>;
    async fn list(
        &self,
        filter: &AnalysisFilter,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Analysis>, u64), ApiError>;
    async fn delete(&self, id: Uuid) -> Result<(), ApiError>;
    async fn transition_to_running(&self, id: Uuid) -> Result<bool, ApiError>;
    async fn transition_to_done(&self, id: Uuid, result: &AnalysisResult) -> Result<bool, ApiError>;
    async fn transition_to_failed(&self, id: Uuid, error_message: &str) -> Result<bool, ApiError>;
    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), ApiError>;
}

pub struct SqliteAnalysisRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `TMA-` followed by 8 decimal digits, retried on unique-constraint
    /// collision up to [`MAX_CODE_ATTEMPTS`] times.
    fn generate_code() -> String {
        let digits: u32 = rand::thread_rng().gen_range(0..=99_999_999);
        format!("TMA-{digits:08}")
    }

    async fn row_exists_with_code(&self, code: &str) -> Result<bool, ApiError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM analyses WHERE code = ?").bind(code).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl AnalysisRepository for SqliteAnalysisRepository {
    async fn insert_open(&self, image_ref: ImageRef) -> Result<Analysis, ApiError> {
        let mut code = Self::generate_code();
        let mut attempts = 1;
        while self.row_exists_with_code(&code).await? {
            if attempts >= MAX_CODE_ATTEMPTS {
                return Err(ApiError::CodeExhausted);
            }
            code = Self::generate_code();
            attempts += 1;
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO analyses (id, code, image_ext, image_mime, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&code)
        .bind(&image_ref.ext)
        .bind(&image_ref.mime)
        .bind(AnalysisStatus::Open.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Analysis {
            id,
            code,
            image_ref,
            status: AnalysisStatus::Open,
            created_at,
            started_at: None,
            finished_at: None,
            result: None,
            error_message: None,
            processing_logs: None,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Analysis, ApiError> {
        let row: AnalysisRow = sqlx::query_as("SELECT * FROM analyses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found(id.to_string()))?;
        row.into_analysis().map_err(ApiError::from)
    }

    async fn list(
        &self,
        filter: &AnalysisFilter,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Analysis>, u64), ApiError> {
        let mut sql = String::from("SELECT * FROM analyses WHERE 1 = 1");
        let mut count_sql = String::from("SELECT COUNT(*) FROM analyses WHERE 1 = 1");

        if filter.code.is_some() {
            sql.push_str(" AND code LIKE ? COLLATE NOCASE");
            count_sql.push_str(" AND code LIKE ? COLLATE NOCASE");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
            count_sql.push_str(" AND status = ?");
        }
        if filter.created_at_from.is_some() {
            sql.push_str(" AND date(created_at) >= date(?)");
            count_sql.push_str(" AND date(created_at) >= date(?)");
        }
        if filter.created_at_to.is_some() {
            sql.push_str(" AND date(created_at) <= date(?)");
            count_sql.push_str(" AND date(created_at) <= date(?)");
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ?");

        let bind_common = |mut query: sqlx::query::QueryAs<'_, sqlx::Sqlite, AnalysisRow, _>| {
            if let Some(code) = &filter.code {
                query = query.bind(format!("%{code}%"));
            }
            if let Some(status) = &filter.status {
                query = query.bind(status.as_str());
            }
            if let Some(from) = filter.created_at_from {
                query = query.bind(from.to_string());
            }
            if let Some(to) = filter.created_at_to {
                query = query.bind(to.to_string());
            }
            query
        };

        let rows_query = sqlx::query_as::<_, AnalysisRow>(&sql);
        let rows_query = bind_common(rows_query).bind(LIST_HARD_CAP);
        let rows = rows_query.fetch_all(&self.pool).await?;

        let count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        let count_query = {
            let mut q = count_query;
            if let Some(code) = &filter.code {
                q = q.bind(format!("%{code}%"));
            }
            if let Some(status) = &filter.status {
                q = q.bind(status.as_str());
            }
            if let Some(from) = filter.created_at_from {
                q = q.bind(from.to_string());
            }
            if let Some(to) = filter.created_at_to {
                q = q.bind(to.to_string());
            }
            q
        };
        let (total,): (i64,) = count_query.fetch_one(&self.pool).await?;
        let total = (total as u64).min(LIST_HARD_CAP as u64);

        let start = (page.saturating_sub(1) as usize) * size as usize;
        let page_rows: Vec<Analysis> = rows
            .into_iter()
            .skip(start)
            .take(size as usize)
            .map(|r| r.into_analysis())
            .collect::<Result<_, _>>()?;

        Ok((page_rows, total))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(id.to_string()));
        }
        Ok(())
    }

    async fn transition_to_running(&self, id: Uuid) -> Result<bool, ApiError> {
        let current = match self.get(id).await {
            Ok(a) => a,
            Err(ApiError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if current.status != AnalysisStatus::Open {
            return Err(ApiError::illegal_transition(current.status.as_str(), "RUNNING"));
        }

        let result = sqlx::query(
            "UPDATE analyses SET status = ?, started_at = ? WHERE id = ? AND status = 'OPEN'",
        )
        .bind(AnalysisStatus::Running.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_to_done(&self, id: Uuid, result_payload: &AnalysisResult) -> Result<bool, ApiError> {
        let current = match self.get(id).await {
            Ok(a) => a,
            Err(ApiError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if current.status != AnalysisStatus::Running {
            return Err(ApiError::illegal_transition(current.status.as_str(), "DONE"));
        }

        let result_json = serde_json::to_string(result_payload)?;
        let changed = sqlx::query(
            "UPDATE analyses SET status = ?, finished_at = ?, result_json = ? \
             WHERE id = ? AND status = 'RUNNING'",
        )
        .bind(AnalysisStatus::Done.as_str())
        .bind(Utc::now())
        .bind(result_json)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(changed.rows_affected() == 1)
    }

    async fn transition_to_failed(&self, id: Uuid, error_message: &str) -> Result<bool, ApiError> {
        let current = match self.get(id).await {
            Ok(a) => a,
            Err(ApiError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if current.status != AnalysisStatus::Open && current.status != AnalysisStatus::Running {
            return Err(ApiError::illegal_transition(current.status.as_str(), "FAILED"));
        }

        let changed = sqlx::query(
            "UPDATE analyses SET status = ?, finished_at = ?, error_message = ? \
             WHERE id = ? AND status IN ('OPEN', 'RUNNING')",
        )
        .bind(AnalysisStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(changed.rows_affected() == 1)
    }

    async fn append_log(&self, id: Uuid, line: &str) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE analyses SET processing_logs = COALESCE(processing_logs, '') || ? || char(10) \
             WHERE id = ?",
        )
        .bind(line)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn image_ref() -> ImageRef {
        ImageRef { ext: "png".to_string(), mime: "image/png".to_string() }
    }

    #[tokio::test]
    async fn generated_code_matches_shape() {
        let pool = test_pool().await;
        let repo = SqliteAnalysisRepository::new(pool);
        let analysis = repo.insert_open(image_ref()).await.unwrap();
        let re = regex::Regex::new(r"^TMA-\d{8}$").unwrap();
        assert!(re.is_match(&analysis.code));
        assert_eq!(analysis.status, AnalysisStatus::Open);
    }

    #[tokio::test]
    async fn state_machine_rejects_illegal_transitions() {
        let pool = test_pool().await;
        let repo = SqliteAnalysisRepository::new(pool);
        let analysis = repo.insert_open(image_ref()).await.unwrap();

        // DONE is illegal directly from OPEN.
        let result = AnalysisResult {
            model_used: "test".into(),
            components: vec![],
            connections: vec![],
            threats: vec![],
            risk_score: 0.0,
            risk_level: crate::models::RiskLevel::Low,
            processing_time_secs: Some(0.1),
        };
        let err = repo.transition_to_done(analysis.id, &result).await.unwrap_err();
        assert!(matches!(err, ApiError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn happy_path_state_sequence() {
        let pool = test_pool().await;
        let repo = SqliteAnalysisRepository::new(pool);
        let analysis = repo.insert_open(image_ref()).await.unwrap();

        assert!(repo.transition_to_running(analysis.id).await.unwrap());
        let running = repo.get(analysis.id).await.unwrap();
        assert_eq!(running.status, AnalysisStatus::Running);
        assert!(running.started_at.is_some());

        let result = AnalysisResult {
            model_used: "test".into(),
            components: vec![],
            connections: vec![],
            threats: vec![],
            risk_score: 0.0,
            risk_level: crate::models::RiskLevel::Low,
            processing_time_secs: Some(0.1),
        };
        assert!(repo.transition_to_done(analysis.id, &result).await.unwrap());
        let done = repo.get(analysis.id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Done);
        assert!(done.result.is_some());
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn delete_of_missing_record_is_not_found() {
        let pool = test_pool().await;
        let repo = SqliteAnalysisRepository::new(pool);
        let err = repo.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn transition_to_running_on_deleted_record_is_a_noop() {
        let pool = test_pool().await;
        let repo = SqliteAnalysisRepository::new(pool);
        let analysis = repo.insert_open(image_ref()).await.unwrap();
        repo.delete(analysis.id).await.unwrap();
        assert!(!repo.transition_to_running(analysis.id).await.unwrap());
    }
}
