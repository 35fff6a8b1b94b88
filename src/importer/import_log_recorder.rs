// ==========================================
// Analitik ETL - 导入日志记录器
// ==========================================
// 职责: ImportRun 生命周期（登记 → 进度 → 成功/失败）+ 报告/状态/历史
// 状态机:
//   en_proceso(extraccion) → en_proceso(transformacion) → en_proceso(carga)
//     → completado(completado)
//   任意阶段失败 → fallido（阶段保持为失败发生处；超时/意外中止为 error）
//   completado / fallido / cancelado 为终态，不再接受更新
// 说明: 记录器写入在落库事务之外，与管道结果不要求原子一致
// ==========================================

use crate::domain::import_run::{
    ImportReport, ImportRun, LoadSummary, PhaseErrors, RunCounters, RunHistoryPage, RunStatus,
};
use crate::domain::types::{EtlPhase, RunState};
use crate::domain::validation::StructuredError;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_run_repo::ImportRunRepository;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// 历史分页上限
pub const MAX_PAGE_SIZE: u32 = 100;

// ==========================================
// ImportLogRecorder
// ==========================================
pub struct ImportLogRecorder<R>
where
    R: ImportRunRepository,
{
    repo: Arc<R>,
}

impl<R> ImportLogRecorder<R>
where
    R: ImportRunRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// 文件内容 SHA-256（十六进制小写）
    pub fn content_hash(content: &[u8]) -> String {
        format!("{:x}", Sha256::digest(content))
    }

    /// 登记运行（文件级校验通过后调用一次）
    pub async fn register(
        &self,
        tenant_id: Uuid,
        file_name: &str,
        file_size: u64,
        content: &[u8],
    ) -> RepositoryResult<ImportRun> {
        let size = i64::try_from(file_size).map_err(|_| RepositoryError::FieldValueError {
            field: "file_size".to_string(),
            message: file_size.to_string(),
        })?;
        let run = ImportRun::register(tenant_id, file_name, size, Self::content_hash(content));
        self.repo.insert_run(&run).await?;
        info!(run_id = %run.id, tenant_id = %tenant_id, file = %file_name, "导入运行已登记");
        Ok(run)
    }

    /// 同租户已成功导入过相同内容的运行
    pub async fn previous_import_with_hash(
        &self,
        run: &ImportRun,
    ) -> RepositoryResult<Option<ImportRun>> {
        self.repo
            .find_completed_by_hash(run.tenant_id, &run.content_hash, run.id)
            .await
    }

    async fn load_active(&self, run_id: Uuid, target: RunState) -> RepositoryResult<ImportRun> {
        let run = self
            .repo
            .find_run(run_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "import_run".to_string(),
                id: run_id.to_string(),
            })?;
        if run.state.is_terminal() {
            return Err(RepositoryError::InvalidStateTransition {
                from: run.state.to_string(),
                to: target.to_string(),
            });
        }
        Ok(run)
    }

    /// 更新阶段与进度（可重复调用，结果幂等）
    pub async fn update_progress(
        &self,
        run_id: Uuid,
        phase: EtlPhase,
        progress_pct: f64,
        counters: Option<RunCounters>,
    ) -> RepositoryResult<ImportRun> {
        let mut run = self.load_active(run_id, RunState::InProgress).await?;
        run.phase = phase;
        run.progress_pct = progress_pct.clamp(0.0, 100.0);
        if let Some(counters) = counters {
            run.apply_counters(counters);
        }
        run.updated_at = Utc::now();
        self.repo.update_run(&run).await?;
        debug!(run_id = %run_id, phase = %phase, progress = run.progress_pct, "进度已更新");
        Ok(run)
    }

    /// 记录失败: 错误存入发生阶段对应的集合，状态 → fallido
    pub async fn record_failure(
        &self,
        run_id: Uuid,
        phase: EtlPhase,
        errors: Vec<StructuredError>,
        warnings: Vec<String>,
        counters: RunCounters,
    ) -> RepositoryResult<ImportRun> {
        let mut run = self.load_active(run_id, RunState::Failed).await?;
        run.phase = phase;
        self.finish_failed(&mut run, phase, errors, warnings, counters)
            .await?;
        Ok(run)
    }

    /// 记录中止（超时/意外错误）: 错误存入中止时所在阶段，阶段 → error
    pub async fn record_abort(
        &self,
        run_id: Uuid,
        at_phase: EtlPhase,
        error: StructuredError,
        warnings: Vec<String>,
        counters: RunCounters,
    ) -> RepositoryResult<ImportRun> {
        let mut run = self.load_active(run_id, RunState::Failed).await?;
        run.phase = EtlPhase::Error;
        self.finish_failed(&mut run, at_phase, vec![error], warnings, counters)
            .await?;
        Ok(run)
    }

    async fn finish_failed(
        &self,
        run: &mut ImportRun,
        error_phase: EtlPhase,
        errors: Vec<StructuredError>,
        warnings: Vec<String>,
        counters: RunCounters,
    ) -> RepositoryResult<()> {
        let now = Utc::now();
        let error_count = errors.len();
        run.errors_for_phase_mut(error_phase).extend(errors);
        run.warnings.extend(warnings);
        run.apply_counters(counters);
        run.state = RunState::Failed;
        run.finished_at = Some(now);
        run.duration_secs = Some(run.elapsed_secs(now));
        run.updated_at = now;
        self.repo.update_run(run).await?;
        info!(
            run_id = %run.id,
            phase = %error_phase,
            errors = error_count,
            "导入运行记录为失败"
        );
        Ok(())
    }

    /// 记录成功: 保存汇总与告警，状态 → completado，进度 100%
    pub async fn record_success(
        &self,
        run_id: Uuid,
        summary: LoadSummary,
        warnings: Vec<String>,
        counters: RunCounters,
    ) -> RepositoryResult<ImportRun> {
        let mut run = self.load_active(run_id, RunState::Completed).await?;
        let now = Utc::now();
        run.state = RunState::Completed;
        run.phase = EtlPhase::Completed;
        run.progress_pct = 100.0;
        run.apply_counters(counters);
        run.warnings.extend(warnings);
        run.load_result = Some(summary);
        run.finished_at = Some(now);
        run.duration_secs = Some(run.elapsed_secs(now));
        run.updated_at = now;
        self.repo.update_run(&run).await?;
        info!(run_id = %run_id, records = run.records_loaded, "导入运行记录为完成");
        Ok(run)
    }

    // ===== 查询 =====

    /// 按 ID 读取运行（不存在 → NotFound）
    pub async fn find_run(&self, run_id: Uuid) -> RepositoryResult<ImportRun> {
        self.repo
            .find_run(run_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "import_run".to_string(),
                id: run_id.to_string(),
            })
    }

    /// 汇总报告（按阶段分组的错误 + 汇总 + 告警）
    pub async fn generate_report(&self, run_id: Uuid) -> RepositoryResult<ImportReport> {
        let run = self.find_run(run_id).await?;
        let counters = run.counters();
        let errors_by_phase = vec![
            PhaseErrors {
                phase: EtlPhase::Extraction,
                errors: run.extraction_errors,
            },
            PhaseErrors {
                phase: EtlPhase::Transformation,
                errors: run.transformation_errors,
            },
            PhaseErrors {
                phase: EtlPhase::Load,
                errors: run.load_errors,
            },
        ];
        Ok(ImportReport {
            run_id: run.id,
            file_name: run.file_name,
            state: run.state,
            phase: run.phase,
            errors_by_phase,
            warnings: run.warnings,
            summary: run.load_result,
            counters,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_secs: run.duration_secs,
        })
    }

    /// 状态轮询
    ///
    /// # 参数
    /// - stale_after: en_proceso 运行超过该时长未更新即视为废弃
    pub async fn status(&self, run_id: Uuid, stale_after: Duration) -> RepositoryResult<RunStatus> {
        let run = self.find_run(run_id).await?;
        let idle_ms = (Utc::now() - run.updated_at).num_milliseconds().max(0) as u128;
        let abandoned = run.state == RunState::InProgress && idle_ms > stale_after.as_millis();
        Ok(RunStatus {
            run_id: run.id,
            state: run.state,
            phase: run.phase,
            progress_pct: run.progress_pct,
            counters: run.counters(),
            started_at: run.started_at,
            updated_at: run.updated_at,
            finished_at: run.finished_at,
            abandoned,
        })
    }

    /// 租户导入历史（最新在前）
    ///
    /// # 参数
    /// - page: 页码（1 起始，0 按 1 处理）
    /// - page_size: 每页条数（1..=100）
    pub async fn history(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> RepositoryResult<RunHistoryPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let total = self.repo.count_runs(tenant_id).await?;
        let runs = self
            .repo
            .list_runs(tenant_id, i64::from(page_size), offset)
            .await?;
        let total_pages = (total + i64::from(page_size) - 1) / i64::from(page_size);

        Ok(RunHistoryPage {
            runs,
            page,
            page_size,
            total,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::repository::import_run_repo_impl::ImportRunRepositoryImpl;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn recorder() -> ImportLogRecorder<ImportRunRepositoryImpl> {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let repo = ImportRunRepositoryImpl::new(Arc::new(Mutex::new(conn)));
        ImportLogRecorder::new(Arc::new(repo))
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            ImportLogRecorder::<ImportRunRepositoryImpl>::content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_failure_stored_under_phase() {
        let recorder = recorder();
        let run = recorder
            .register(Uuid::new_v4(), "carga.xlsx", 10, b"contenido")
            .await
            .unwrap();
        recorder
            .update_progress(run.id, EtlPhase::Transformation, 40.0, None)
            .await
            .unwrap();

        let failed = recorder
            .record_failure(
                run.id,
                EtlPhase::Transformation,
                vec![StructuredError::new(2, "codigo_producto", "x")],
                vec![],
                RunCounters::default(),
            )
            .await
            .unwrap();

        assert_eq!(failed.state, RunState::Failed);
        assert_eq!(failed.phase, EtlPhase::Transformation);
        assert_eq!(failed.transformation_errors.len(), 1);
        assert!(failed.finished_at.is_some());
        assert!(failed.duration_secs.is_some());
    }

    #[tokio::test]
    async fn test_terminal_run_rejects_updates() {
        let recorder = recorder();
        let run = recorder
            .register(Uuid::new_v4(), "carga.xlsx", 10, b"x")
            .await
            .unwrap();
        recorder
            .record_success(run.id, LoadSummary::default(), vec![], RunCounters::default())
            .await
            .unwrap();

        let err = recorder
            .update_progress(run.id, EtlPhase::Load, 85.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_failed_run_cannot_complete() {
        let recorder = recorder();
        let run = recorder
            .register(Uuid::new_v4(), "carga.xlsx", 10, b"x")
            .await
            .unwrap();
        recorder
            .record_failure(run.id, EtlPhase::Load, vec![], vec![], RunCounters::default())
            .await
            .unwrap();

        let err = recorder
            .record_success(run.id, LoadSummary::default(), vec![], RunCounters::default())
            .await
            .unwrap_err();
        match err {
            RepositoryError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "fallido");
                assert_eq!(to, "completado");
            }
            other => panic!("意外错误: {:?}", other),
        }

        let stored = recorder.find_run(run.id).await.unwrap();
        assert_eq!(stored.state, RunState::Failed);
        assert!(stored.load_result.is_none());
    }

    #[tokio::test]
    async fn test_abort_moves_to_error_phase() {
        let recorder = recorder();
        let run = recorder
            .register(Uuid::new_v4(), "carga.xlsx", 10, b"x")
            .await
            .unwrap();
        let aborted = recorder
            .record_abort(
                run.id,
                EtlPhase::Load,
                StructuredError::new(0, "Sistema", "timeout"),
                vec![],
                RunCounters::default(),
            )
            .await
            .unwrap();
        assert_eq!(aborted.phase, EtlPhase::Error);
        assert_eq!(aborted.load_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_status_flags_abandoned_runs() {
        let recorder = recorder();
        let run = recorder
            .register(Uuid::new_v4(), "carga.xlsx", 10, b"x")
            .await
            .unwrap();

        let fresh = recorder.status(run.id, Duration::from_secs(60)).await.unwrap();
        assert!(!fresh.abandoned);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stale = recorder.status(run.id, Duration::from_millis(1)).await.unwrap();
        assert!(stale.abandoned);
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let recorder = recorder();
        let tenant = Uuid::new_v4();
        for i in 0..5 {
            recorder
                .register(tenant, &format!("carga_{}.xlsx", i), 10, b"x")
                .await
                .unwrap();
        }

        let page = recorder.history(tenant, 2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.runs.len(), 2);

        let last = recorder.history(tenant, 3, 2).await.unwrap();
        assert_eq!(last.runs.len(), 1);
    }
}
