// ==========================================
// Analitik ETL - 导入运行 Repository 实现
// ==========================================
// 职责: 使用 rusqlite 实现 ImportRunRepository
// 说明: 各阶段错误、告警、落库汇总以 JSON TEXT 存储，
//       读取时还原为强类型结构
// ==========================================

use crate::domain::import_run::{ImportRun, LoadSummary};
use crate::domain::validation::StructuredError;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_run_repo::ImportRunRepository;
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const RUN_COLUMNS: &str = r#"
    id, tenant_id, file_name, file_size, content_hash, state, phase, progress_pct,
    records_extracted, records_transformed, records_loaded, records_rejected,
    extraction_errors, transformation_errors, load_errors, warnings, load_result,
    started_at, finished_at, duration_secs, updated_at
"#;

// ==========================================
// ImportRunRepositoryImpl
// ==========================================
pub struct ImportRunRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepositoryImpl {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<ImportRun> {
        let load_result: Option<String> = row.get(16)?;
        Ok(ImportRun {
            id: parse_uuid(row, 0)?,
            tenant_id: parse_uuid(row, 1)?,
            file_name: row.get(2)?,
            file_size: row.get(3)?,
            content_hash: row.get(4)?,
            state: row
                .get::<_, String>(5)?
                .parse()
                .map_err(|e: String| conversion_error(5, e))?,
            phase: row
                .get::<_, String>(6)?
                .parse()
                .map_err(|e: String| conversion_error(6, e))?,
            progress_pct: row.get(7)?,
            records_extracted: row.get(8)?,
            records_transformed: row.get(9)?,
            records_loaded: row.get(10)?,
            records_rejected: row.get(11)?,
            extraction_errors: parse_json::<Vec<StructuredError>>(row, 12)?,
            transformation_errors: parse_json::<Vec<StructuredError>>(row, 13)?,
            load_errors: parse_json::<Vec<StructuredError>>(row, 14)?,
            warnings: parse_json::<Vec<String>>(row, 15)?,
            load_result: match load_result {
                Some(json) => Some(
                    serde_json::from_str::<LoadSummary>(&json)
                        .map_err(|e| conversion_error(16, e))?,
                ),
                None => None,
            },
            started_at: row.get(17)?,
            finished_at: row.get(18)?,
            duration_secs: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

#[async_trait]
impl ImportRunRepository for ImportRunRepositoryImpl {
    async fn insert_run(&self, run: &ImportRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO import_run ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                RUN_COLUMNS
            ),
            params![
                run.id.to_string(),
                run.tenant_id.to_string(),
                run.file_name,
                run.file_size,
                run.content_hash,
                run.state.as_str(),
                run.phase.as_str(),
                run.progress_pct,
                run.records_extracted,
                run.records_transformed,
                run.records_loaded,
                run.records_rejected,
                serde_json::to_string(&run.extraction_errors)?,
                serde_json::to_string(&run.transformation_errors)?,
                serde_json::to_string(&run.load_errors)?,
                serde_json::to_string(&run.warnings)?,
                run.load_result.as_ref().map(serde_json::to_string).transpose()?,
                run.started_at,
                run.finished_at,
                run.duration_secs,
                run.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn update_run(&self, run: &ImportRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE import_run SET
                state = ?2, phase = ?3, progress_pct = ?4,
                records_extracted = ?5, records_transformed = ?6,
                records_loaded = ?7, records_rejected = ?8,
                extraction_errors = ?9, transformation_errors = ?10,
                load_errors = ?11, warnings = ?12, load_result = ?13,
                finished_at = ?14, duration_secs = ?15, updated_at = ?16
            WHERE id = ?1
            "#,
            params![
                run.id.to_string(),
                run.state.as_str(),
                run.phase.as_str(),
                run.progress_pct,
                run.records_extracted,
                run.records_transformed,
                run.records_loaded,
                run.records_rejected,
                serde_json::to_string(&run.extraction_errors)?,
                serde_json::to_string(&run.transformation_errors)?,
                serde_json::to_string(&run.load_errors)?,
                serde_json::to_string(&run.warnings)?,
                run.load_result.as_ref().map(serde_json::to_string).transpose()?,
                run.finished_at,
                run.duration_secs,
                run.updated_at,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_run".to_string(),
                id: run.id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_run(&self, run_id: Uuid) -> RepositoryResult<Option<ImportRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM import_run WHERE id = ?1", RUN_COLUMNS),
                params![run_id.to_string()],
                Self::map_row,
            )
            .optional()?;
        Ok(run)
    }

    async fn find_completed_by_hash(
        &self,
        tenant_id: Uuid,
        content_hash: &str,
        exclude_run_id: Uuid,
    ) -> RepositoryResult<Option<ImportRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!(
                    "SELECT {} FROM import_run
                     WHERE tenant_id = ?1 AND content_hash = ?2 AND state = 'completado' AND id <> ?3
                     ORDER BY started_at DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![tenant_id.to_string(), content_hash, exclude_run_id.to_string()],
                Self::map_row,
            )
            .optional()?;
        Ok(run)
    }

    async fn list_runs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ImportRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_run WHERE tenant_id = ?1
             ORDER BY started_at DESC, id LIMIT ?2 OFFSET ?3",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map(params![tenant_id.to_string(), limit, offset], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    async fn count_runs(&self, tenant_id: Uuid) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM import_run WHERE tenant_id = ?1",
            params![tenant_id.to_string()],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::types::{EtlPhase, RunState};

    fn repo() -> ImportRunRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        ImportRunRepositoryImpl::new(Arc::new(Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_insert_update_find_round_trip() {
        let repo = repo();
        let mut run = ImportRun::register(Uuid::new_v4(), "carga.xlsx", 2048, "hash-1");
        repo.insert_run(&run).await.unwrap();

        run.phase = EtlPhase::Transformation;
        run.state = RunState::Failed;
        run.transformation_errors
            .push(StructuredError::new(2, "codigo_producto", "x").with_value("PROD-999"));
        run.warnings.push("aviso".to_string());
        repo.update_run(&run).await.unwrap();

        let stored = repo.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::Failed);
        assert_eq!(stored.phase, EtlPhase::Transformation);
        assert_eq!(stored.transformation_errors, run.transformation_errors);
        assert_eq!(stored.warnings, vec!["aviso".to_string()]);
        assert!(stored.load_result.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_run_is_not_found() {
        let repo = repo();
        let run = ImportRun::register(Uuid::new_v4(), "carga.xlsx", 1, "h");
        let err = repo.update_run(&run).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_find_completed_by_hash_ignores_other_states() {
        let repo = repo();
        let tenant = Uuid::new_v4();
        let pending = ImportRun::register(tenant, "a.xlsx", 1, "same");
        repo.insert_run(&pending).await.unwrap();
        let mut done = ImportRun::register(tenant, "b.xlsx", 1, "same");
        done.state = RunState::Completed;
        repo.insert_run(&done).await.unwrap();

        let found = repo
            .find_completed_by_hash(tenant, "same", Uuid::new_v4())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, done.id);
        assert!(repo
            .find_completed_by_hash(tenant, "same", done.id)
            .await
            .unwrap()
            .is_none());
    }
}
