// ==========================================
// Analitik ETL - 导入 API
// ==========================================
// 职责: 封装导入、状态轮询、报告、历史查询
// 说明: 每次调用按 db_path 打开共享连接并装配仓储/配置/管道
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::defaults;
use crate::config::{ConfigManager, EtlConfigReader};
use crate::db::{init_schema, open_shared_connection};
use crate::domain::import_run::{ImportOutcome, ImportReport, ImportRequest, RunHistoryPage, RunStatus};
use crate::importer::{EtlImporter, EtlImporterImpl, ImportLogRecorder};
use crate::repository::{
    EtlLoadRepository, EtlLoadRepositoryImpl, ImportRunRepositoryImpl,
    TenantRowCounts,
};
use rusqlite::Connection;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

type Importer = EtlImporterImpl<EtlLoadRepositoryImpl, ImportRunRepositoryImpl, ConfigManager>;

/// 导入 API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的 ImportApi 实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn open(&self) -> ApiResult<Arc<Mutex<Connection>>> {
        let conn = open_shared_connection(&self.db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
            init_schema(&guard)?;
        }
        Ok(conn)
    }

    fn config(&self, conn: Arc<Mutex<Connection>>) -> ApiResult<ConfigManager> {
        Ok(ConfigManager::from_connection(conn)?)
    }

    fn recorder(&self) -> ApiResult<(ImportLogRecorder<ImportRunRepositoryImpl>, ConfigManager)> {
        let conn = self.open()?;
        let recorder = ImportLogRecorder::new(Arc::new(ImportRunRepositoryImpl::new(conn.clone())));
        Ok((recorder, self.config(conn)?))
    }

    fn importer(&self) -> ApiResult<(Importer, Arc<ConfigManager>)> {
        let conn = self.open()?;
        let config = Arc::new(self.config(conn.clone())?);
        let importer = EtlImporterImpl::new(
            Arc::new(EtlLoadRepositoryImpl::new(conn.clone())),
            Arc::new(ImportRunRepositoryImpl::new(conn)),
            config.clone(),
        );
        Ok((importer, config))
    }

    /// 导入内存中的工作簿
    pub async fn import_bytes(
        &self,
        tenant_id: Uuid,
        file_name: &str,
        content: Vec<u8>,
    ) -> ApiResult<ImportOutcome> {
        let (importer, _) = self.importer()?;
        Ok(importer
            .import_workbook(ImportRequest::new(tenant_id, file_name, content))
            .await)
    }

    /// 从文件路径导入
    ///
    /// # 参数
    /// - tenant_id: 租户 ID
    /// - file_path: 工作簿路径（读取量以配置上限为界）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 导入结果（成功或结构化失败）
    /// - Err(ApiError): 文件无法打开、数据库不可用
    pub async fn import_file(&self, tenant_id: Uuid, file_path: &str) -> ApiResult<ImportOutcome> {
        let (importer, config) = self.importer()?;
        let path = Path::new(file_path);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ApiError::InvalidInput(format!("无效的文件路径: {}", file_path)))?;

        let file = File::open(path).map_err(|e| ApiError::FileError(e.to_string()))?;
        let declared_size = file
            .metadata()
            .map_err(|e| ApiError::FileError(e.to_string()))?
            .len();
        let max_bytes = config.max_file_size_bytes(tenant_id).await?;
        let request = ImportRequest::from_reader(tenant_id, file_name, declared_size, file, max_bytes)
            .map_err(|e| ApiError::FileError(e.to_string()))?;

        info!(tenant_id = %tenant_id, file = %file_path, size = declared_size, "收到导入请求");
        Ok(importer.import_workbook(request).await)
    }

    /// 运行状态（废弃判定使用运行所属租户的超时配置）
    pub async fn status(&self, run_id: Uuid) -> ApiResult<RunStatus> {
        let (recorder, config) = self.recorder()?;
        let run = recorder.find_run(run_id).await?;
        let stale_secs = match config.stale_run_timeout_secs(run.tenant_id).await {
            Ok(secs) => secs,
            Err(e) => {
                warn!(error = %e, "读取废弃超时失败，使用默认值");
                defaults::STALE_RUN_TIMEOUT_SECS
            }
        };
        Ok(recorder.status(run_id, Duration::from_secs(stale_secs)).await?)
    }

    /// 运行报告
    pub async fn report(&self, run_id: Uuid) -> ApiResult<ImportReport> {
        let (recorder, _) = self.recorder()?;
        Ok(recorder.generate_report(run_id).await?)
    }

    /// 租户导入历史
    pub async fn history(
        &self,
        tenant_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> ApiResult<RunHistoryPage> {
        let (recorder, _) = self.recorder()?;
        Ok(recorder.history(tenant_id, page, page_size).await?)
    }

    /// 租户业务表行数
    pub async fn tenant_row_counts(&self, tenant_id: Uuid) -> ApiResult<TenantRowCounts> {
        let conn = self.open()?;
        let repo = EtlLoadRepositoryImpl::new(conn);
        Ok(repo.count_tenant_rows(tenant_id).await?)
    }
}
