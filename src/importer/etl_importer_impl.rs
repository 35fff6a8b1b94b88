// ==========================================
// Analitik ETL - 导入管道实现
// ==========================================
// 职责: 编排完整导入流程，从上传字节到落库与运行记录
// 流程: 文件校验 → 登记 → 工作表校验 → 产品 → 库存 → 销售 → 财务 → 原子落库
// 红线: 任一工作表存在行错误即中止，不进入落库；对外从不返回 Err
// ==========================================

use crate::config::config_manager::defaults;
use crate::config::EtlConfigReader;
use crate::domain::import_run::{ImportOutcome, ImportRequest, RunCounters};
use crate::domain::records::{LoadDefaults, ValidatedBatch};
use crate::domain::types::{EtlPhase, SheetKind};
use crate::domain::validation::StructuredError;
use crate::i18n::{t, t_with_args};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::etl_importer_trait::{EtlImporter, SheetReader, StructureValidator};
use crate::importer::import_log_recorder::ImportLogRecorder;
use crate::importer::sheet::WorkbookData;
use crate::importer::sheet_reader::{
    FinancialSheetReader, InventorySheetReader, ProductSheetReader, ReadContext,
    SalesSheetReader,
};
use crate::importer::structure::{StructuralValidator, FILE_COLUMN};
use crate::repository::etl_load_repo::EtlLoadRepository;
use crate::repository::import_run_repo::ImportRunRepository;
use async_trait::async_trait;
use chrono::Local;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 落库失败错误的列名
pub const LOAD_COLUMN: &str = "Carga";
/// 超时/意外错误的列名
pub const SYSTEM_COLUMN: &str = "Sistema";

// ===== 进度里程碑 =====
const PROGRESS_STRUCTURE_OK: f64 = 25.0;
const PROGRESS_PRODUCTS_READ: f64 = 40.0;
const PROGRESS_INVENTORY_READ: f64 = 55.0;
const PROGRESS_SALES_READ: f64 = 70.0;
const PROGRESS_BEFORE_LOAD: f64 = 85.0;

// ==========================================
// PipelineProgress - 管道进度快照
// ==========================================
// 超时中止时用于确定"中止发生在哪个阶段"以及已累积的计数/告警
#[derive(Debug, Clone)]
struct PipelineProgress {
    phase: EtlPhase,
    counters: RunCounters,
    warnings: Vec<String>,
}

impl PipelineProgress {
    fn new(warnings: Vec<String>) -> Self {
        Self {
            phase: EtlPhase::Extraction,
            counters: RunCounters::default(),
            warnings,
        }
    }
}

fn with_progress<T>(progress: &Mutex<PipelineProgress>, f: impl FnOnce(&mut PipelineProgress) -> T) -> T {
    match progress.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            f(&mut guard)
        }
    }
}

/// 中止原因对应的用户消息
fn abort_message(cause: &ImportError) -> String {
    match cause {
        ImportError::DeadlineExceeded(secs) => {
            t_with_args("pipeline.deadline", &[("seconds", &secs.to_string())])
        }
        _ => t("pipeline.unexpected"),
    }
}

/// 单表读取结果
enum SheetRead<T> {
    Accepted(Vec<T>),
    Rejected(Vec<StructuredError>),
}

// ==========================================
// EtlImporterImpl - 导入管道
// ==========================================
pub struct EtlImporterImpl<L, R, C>
where
    L: EtlLoadRepository,
    R: ImportRunRepository,
    C: EtlConfigReader,
{
    // 数据访问层
    load_repo: Arc<L>,

    // 运行记录
    recorder: ImportLogRecorder<R>,

    // 配置读取器
    config: Arc<C>,

    // 结构校验器
    validator: Box<dyn StructureValidator>,
}

impl<L, R, C> EtlImporterImpl<L, R, C>
where
    L: EtlLoadRepository,
    R: ImportRunRepository,
    C: EtlConfigReader,
{
    /// 创建导入管道
    ///
    /// # 参数
    /// - load_repo: 原子落库仓储
    /// - run_repo: 导入运行仓储
    /// - config: 配置读取器
    pub fn new(load_repo: Arc<L>, run_repo: Arc<R>, config: Arc<C>) -> Self {
        Self {
            load_repo,
            recorder: ImportLogRecorder::new(run_repo),
            config,
            validator: Box::new(StructuralValidator::new()),
        }
    }

    pub fn recorder(&self) -> &ImportLogRecorder<R> {
        &self.recorder
    }

    // ===== 配置（读取失败时记录告警并使用默认值） =====

    async fn max_file_size(&self, tenant_id: Uuid) -> u64 {
        match self.config.max_file_size_bytes(tenant_id).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "读取上传大小上限失败，使用默认值");
                defaults::MAX_FILE_SIZE_BYTES
            }
        }
    }

    async fn deadline_secs(&self, tenant_id: Uuid) -> u64 {
        match self.config.import_deadline_secs(tenant_id).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "读取导入截止时间失败，使用默认值");
                defaults::IMPORT_DEADLINE_SECS
            }
        }
    }

    async fn load_defaults(&self, tenant_id: Uuid) -> LoadDefaults {
        match self.config.load_defaults(tenant_id).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "读取落库缺省值失败，使用默认值");
                LoadDefaults::default()
            }
        }
    }

    // ===== 运行记录辅助 =====

    /// 推进阶段并写入进度
    async fn checkpoint(
        &self,
        run_id: Uuid,
        progress: &Mutex<PipelineProgress>,
        phase: EtlPhase,
        pct: f64,
    ) -> ImportResult<()> {
        let counters = with_progress(progress, |p| {
            p.phase = phase;
            p.counters
        });
        self.recorder
            .update_progress(run_id, phase, pct, Some(counters))
            .await?;
        Ok(())
    }

    /// 记录失败并构造失败结果
    async fn halt(
        &self,
        run_id: Uuid,
        progress: &Mutex<PipelineProgress>,
        phase: EtlPhase,
        errors: Vec<StructuredError>,
        message: String,
    ) -> ImportResult<ImportOutcome> {
        let snapshot = with_progress(progress, |p| {
            p.phase = phase;
            p.clone()
        });
        self.recorder
            .record_failure(
                run_id,
                phase,
                errors.clone(),
                snapshot.warnings.clone(),
                snapshot.counters,
            )
            .await?;
        info!(run_id = %run_id, phase = %phase, errors = errors.len(), "导入已中止");
        Ok(ImportOutcome::failed(
            Some(run_id),
            message,
            errors,
            snapshot.warnings,
        ))
    }

    /// 超时或意外错误: 记录中止（阶段 → error）
    async fn abort(
        &self,
        run_id: Uuid,
        progress: &Mutex<PipelineProgress>,
        cause: ImportError,
    ) -> ImportOutcome {
        let message = abort_message(&cause);
        let snapshot = with_progress(progress, |p| p.clone());
        warn!(run_id = %run_id, phase = %snapshot.phase, cause = %cause, "导入中止");
        let err = StructuredError::file_level(SYSTEM_COLUMN, message.clone());
        if let Err(e) = self
            .recorder
            .record_abort(
                run_id,
                snapshot.phase,
                err.clone(),
                snapshot.warnings.clone(),
                snapshot.counters,
            )
            .await
        {
            error!(run_id = %run_id, error = %e, "中止状态写入失败");
        }
        ImportOutcome::failed(Some(run_id), message, vec![err], snapshot.warnings)
    }

    // ===== 读取阶段 =====

    fn read_sheet<S: SheetReader>(
        reader: &S,
        workbook: &WorkbookData,
        ctx: &ReadContext<'_>,
        progress: &Mutex<PipelineProgress>,
    ) -> ImportResult<SheetRead<S::Record>> {
        let sheet = reader.sheet();
        let table = workbook
            .table(sheet)
            .ok_or_else(|| ImportError::SheetNotFound(sheet.sheet_name().to_string()))?;
        let (records, outcome) = reader.read(table, ctx);

        debug!(
            sheet = %sheet,
            accepted = records.len(),
            errors = outcome.errors.len(),
            warnings = outcome.warnings.len(),
            "工作表读取完成"
        );

        Ok(with_progress(progress, |p| {
            p.warnings.extend(outcome.warnings);
            if outcome.errors.is_empty() {
                p.counters.transformed += records.len() as i64;
                SheetRead::Accepted(records)
            } else {
                p.counters.rejected = outcome.errors.len() as i64;
                SheetRead::Rejected(outcome.errors)
            }
        }))
    }

    async fn halt_sheet(
        &self,
        run_id: Uuid,
        progress: &Mutex<PipelineProgress>,
        sheet: SheetKind,
        errors: Vec<StructuredError>,
    ) -> ImportResult<ImportOutcome> {
        warn!(run_id = %run_id, sheet = %sheet, errors = errors.len(), "工作表存在行错误");
        let message = t_with_args("pipeline.sheet_errors", &[("sheet", sheet.sheet_name())]);
        self.halt(run_id, progress, EtlPhase::Transformation, errors, message)
            .await
    }

    /// 登记之后的管道主体
    async fn run_pipeline(
        &self,
        run_id: Uuid,
        request: &ImportRequest,
        progress: &Mutex<PipelineProgress>,
    ) -> ImportResult<ImportOutcome> {
        let tenant_id = request.tenant_id;

        // ==========================================
        // 提取: 打开工作簿 + 工作表级结构校验
        // ==========================================
        let workbook = match WorkbookData::open(&request.content) {
            Ok(workbook) => workbook,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "工作簿读取失败");
                let err = StructuredError::file_level(FILE_COLUMN, t("file.corrupt"))
                    .with_suggestion(t("file.corrupt_suggestion"));
                return self
                    .halt(run_id, progress, EtlPhase::Extraction, vec![err], t("pipeline.file_errors"))
                    .await;
            }
        };

        let structure = self.validator.validate_sheets(&workbook);
        with_progress(progress, |p| p.warnings.extend(structure.warnings.iter().cloned()));
        if !structure.is_success() {
            return self
                .halt(
                    run_id,
                    progress,
                    EtlPhase::Extraction,
                    structure.errors,
                    t("pipeline.file_errors"),
                )
                .await;
        }

        let extracted: i64 = SheetKind::ALL
            .iter()
            .filter_map(|kind| workbook.table(*kind))
            .map(|table| table.rows.len() as i64)
            .sum();
        with_progress(progress, |p| p.counters.extracted = extracted);
        self.checkpoint(run_id, progress, EtlPhase::Transformation, PROGRESS_STRUCTURE_OK)
            .await?;

        // ==========================================
        // 转换: 四张表按固定顺序读取
        // ==========================================
        let persisted = self.load_repo.find_product_codes(tenant_id).await?;
        let today = Local::now().date_naive();

        let no_upload_codes = HashSet::new();
        let product_ctx = ReadContext {
            tenant_id,
            today,
            upload_product_codes: &no_upload_codes,
            persisted_product_codes: &persisted,
        };
        let products = match Self::read_sheet(&ProductSheetReader, &workbook, &product_ctx, progress)? {
            SheetRead::Accepted(records) => records,
            SheetRead::Rejected(errors) => {
                return self.halt_sheet(run_id, progress, SheetKind::Products, errors).await
            }
        };
        self.checkpoint(run_id, progress, EtlPhase::Transformation, PROGRESS_PRODUCTS_READ)
            .await?;

        let upload_codes: HashSet<String> = products.iter().map(|p| p.code.clone()).collect();
        let ctx = ReadContext {
            tenant_id,
            today,
            upload_product_codes: &upload_codes,
            persisted_product_codes: &persisted,
        };

        let inventory = match Self::read_sheet(&InventorySheetReader, &workbook, &ctx, progress)? {
            SheetRead::Accepted(records) => records,
            SheetRead::Rejected(errors) => {
                return self.halt_sheet(run_id, progress, SheetKind::Inventory, errors).await
            }
        };
        self.checkpoint(run_id, progress, EtlPhase::Transformation, PROGRESS_INVENTORY_READ)
            .await?;

        let sales = match Self::read_sheet(&SalesSheetReader, &workbook, &ctx, progress)? {
            SheetRead::Accepted(records) => records,
            SheetRead::Rejected(errors) => {
                return self.halt_sheet(run_id, progress, SheetKind::Sales, errors).await
            }
        };
        self.checkpoint(run_id, progress, EtlPhase::Transformation, PROGRESS_SALES_READ)
            .await?;

        let financials = match Self::read_sheet(&FinancialSheetReader, &workbook, &ctx, progress)? {
            SheetRead::Accepted(records) => records,
            SheetRead::Rejected(errors) => {
                return self.halt_sheet(run_id, progress, SheetKind::Financials, errors).await
            }
        };

        // ==========================================
        // 落库: 单事务写入四类记录
        // ==========================================
        self.checkpoint(run_id, progress, EtlPhase::Load, PROGRESS_BEFORE_LOAD)
            .await?;
        let defaults = self.load_defaults(tenant_id).await;
        let batch = ValidatedBatch {
            products,
            inventory,
            sales,
            financials,
        };

        match self.load_repo.load_atomically(tenant_id, &batch, &defaults).await {
            Ok(output) => {
                let (counters, warnings) = with_progress(progress, |p| {
                    p.warnings.extend(output.warnings);
                    p.counters.loaded = output.summary.records_processed;
                    (p.counters, p.warnings.clone())
                });
                let mut summary = output.summary;
                summary.total_warnings = warnings.len() as i64;

                self.recorder
                    .record_success(run_id, summary.clone(), warnings.clone(), counters)
                    .await?;

                info!(
                    run_id = %run_id,
                    records = summary.records_processed,
                    warnings = warnings.len(),
                    "导入完成"
                );
                let message = t_with_args(
                    "pipeline.success",
                    &[
                        ("count", &summary.records_processed.to_string()),
                        ("seconds", &format!("{:.2}", summary.duration_secs)),
                    ],
                );
                Ok(ImportOutcome::succeeded(run_id, message, summary, warnings))
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "原子落库失败，事务已回滚"
                );
                let message = if e.is_retryable() {
                    t("load.failed_retryable")
                } else {
                    t("load.failed")
                };
                let err = StructuredError::file_level(LOAD_COLUMN, message.clone());
                self.halt(run_id, progress, EtlPhase::Load, vec![err], message)
                    .await
            }
        }
    }
}

#[async_trait]
impl<L, R, C> EtlImporter for EtlImporterImpl<L, R, C>
where
    L: EtlLoadRepository,
    R: ImportRunRepository,
    C: EtlConfigReader,
{
    #[instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, file = %request.file_name, run_id = tracing::field::Empty)
    )]
    async fn import_workbook(&self, request: ImportRequest) -> ImportOutcome {
        let tenant_id = request.tenant_id;
        let size = request.effective_size();
        info!(size, "开始导入");

        // ===== 文件级校验（未通过则不登记运行） =====
        let max_size = self.max_file_size(tenant_id).await;
        let file_check =
            self.validator
                .validate_file(&request.file_name, size, &request.content, max_size);
        if !file_check.is_success() {
            info!(errors = file_check.errors.len(), "文件级校验未通过");
            return ImportOutcome::failed(
                None,
                t("pipeline.file_errors"),
                file_check.errors,
                file_check.warnings,
            );
        }

        // ===== 登记 =====
        let run = match self
            .recorder
            .register(tenant_id, &request.file_name, size, &request.content)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(error = %e, "导入运行登记失败");
                let message = t("pipeline.register_failed");
                return ImportOutcome::failed(
                    None,
                    message.clone(),
                    vec![StructuredError::file_level(SYSTEM_COLUMN, message)],
                    file_check.warnings,
                );
            }
        };
        tracing::Span::current().record("run_id", tracing::field::display(run.id));

        // ===== 重复上传检测（仅告警） =====
        let mut warnings = file_check.warnings;
        match self.recorder.previous_import_with_hash(&run).await {
            Ok(Some(previous)) => {
                info!(previous_run_id = %previous.id, "检测到重复上传");
                warnings.push(t_with_args(
                    "pipeline.duplicate_upload",
                    &[("run_id", &previous.id.to_string())],
                ));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "重复上传检测失败"),
        }

        // ===== 管道主体（可选截止时间） =====
        let deadline_secs = self.deadline_secs(tenant_id).await;
        let progress = Mutex::new(PipelineProgress::new(warnings));
        let pipeline = self.run_pipeline(run.id, &request, &progress);
        let result = if deadline_secs == 0 {
            Ok(pipeline.await)
        } else {
            tokio::time::timeout(Duration::from_secs(deadline_secs), pipeline).await
        };

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(run_id = %run.id, error = %e, "导入管道意外错误");
                self.abort(run.id, &progress, e).await
            }
            Err(_) => {
                self.abort(run.id, &progress, ImportError::DeadlineExceeded(deadline_secs))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{config_keys, ConfigManager, GLOBAL_SCOPE};
    use crate::db;
    use crate::domain::types::RunState;
    use crate::repository::error::RepositoryResult;
    use crate::repository::etl_load_repo::{LoadOutput, TenantRowCounts};
    use crate::repository::import_run_repo_impl::ImportRunRepositoryImpl;
    use crate::importer::sheet_reader::mandatory_columns;
    use rusqlite::Connection;
    use rust_xlsxwriter::Workbook;

    /// 落库阶段阻塞的仓储（用于截止时间测试）
    struct SlowLoadRepo;

    #[async_trait]
    impl EtlLoadRepository for SlowLoadRepo {
        async fn find_product_codes(&self, _tenant_id: Uuid) -> RepositoryResult<HashSet<String>> {
            Ok(HashSet::new())
        }

        async fn load_atomically(
            &self,
            _tenant_id: Uuid,
            _batch: &ValidatedBatch,
            _defaults: &LoadDefaults,
        ) -> RepositoryResult<LoadOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LoadOutput::default())
        }

        async fn count_tenant_rows(&self, _tenant_id: Uuid) -> RepositoryResult<TenantRowCounts> {
            Ok(TenantRowCounts::default())
        }
    }

    fn write_sheet(workbook: &mut Workbook, kind: SheetKind, row: &[&str]) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(kind.sheet_name()).unwrap();
        for (col, header) in mandatory_columns(kind).iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
            sheet.write_string(1, col as u16, row[col]).unwrap();
        }
    }

    fn minimal_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        write_sheet(
            &mut workbook,
            SheetKind::Products,
            &["PROD-001", "Camisa", "89500", "unidad", "VERDADERO", "SI"],
        );
        write_sheet(&mut workbook, SheetKind::Inventory, &["PROD-001", "10"]);
        write_sheet(
            &mut workbook,
            SheetKind::Sales,
            &["ORD-1", "2024-01-15", "Ana", "89500", "efectivo"],
        );
        write_sheet(
            &mut workbook,
            SheetKind::Financials,
            &["gasto", "salarios", "Nómina", "1500000", "2024-01-31"],
        );
        workbook.save_to_buffer().unwrap()
    }

    fn shared_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn test_abort_message_by_cause() {
        let deadline = abort_message(&ImportError::DeadlineExceeded(300));
        assert!(deadline.contains("300"));
        let unexpected = abort_message(&ImportError::InternalError("x".to_string()));
        assert_eq!(unexpected, t("pipeline.unexpected"));
        assert_ne!(deadline, unexpected);
    }

    #[tokio::test]
    async fn test_file_errors_do_not_register_run() {
        let conn = shared_conn();
        let run_repo = Arc::new(ImportRunRepositoryImpl::new(conn.clone()));
        let config = Arc::new(ConfigManager::from_connection(conn).unwrap());
        let importer = EtlImporterImpl::new(Arc::new(SlowLoadRepo), run_repo.clone(), config);

        let tenant = Uuid::new_v4();
        let outcome = importer
            .import_workbook(ImportRequest::new(tenant, "datos.csv", b"a;b".to_vec()))
            .await;

        assert!(!outcome.success);
        assert!(outcome.run_id.is_none());
        assert_eq!(outcome.errors[0].row, 0);
        assert_eq!(outcome.errors[0].column, FILE_COLUMN);
        assert_eq!(run_repo.count_runs(tenant).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deadline_marks_run_failed_in_error_phase() {
        let conn = shared_conn();
        let run_repo = Arc::new(ImportRunRepositoryImpl::new(conn.clone()));
        let config = ConfigManager::from_connection(conn).unwrap();
        config
            .set_value(GLOBAL_SCOPE, config_keys::IMPORT_DEADLINE_SECS, "1")
            .unwrap();
        let importer =
            EtlImporterImpl::new(Arc::new(SlowLoadRepo), run_repo.clone(), Arc::new(config));

        let outcome = importer
            .import_workbook(ImportRequest::new(Uuid::new_v4(), "carga.xlsx", minimal_workbook()))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].column, SYSTEM_COLUMN);
        assert_eq!(
            outcome.message,
            abort_message(&ImportError::DeadlineExceeded(1))
        );
        assert!(outcome.message.contains('1'));

        let run = run_repo
            .find_run(outcome.run_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.phase, EtlPhase::Error);
        assert_eq!(run.load_errors.len(), 1);
        assert_eq!(run.records_transformed, 4);
    }
}
