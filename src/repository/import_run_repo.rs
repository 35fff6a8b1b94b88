// ==========================================
// Analitik ETL - 导入运行 Repository Trait
// ==========================================
// 职责: ImportRun 的持久化（只增改，不删除）
// 说明: 错误/告警集合在此边界序列化为 JSON 文本
// ==========================================

use crate::domain::import_run::ImportRun;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use uuid::Uuid;

// ==========================================
// ImportRunRepository Trait
// ==========================================
// 实现者: ImportRunRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait ImportRunRepository: Send + Sync {
    /// 插入新运行
    async fn insert_run(&self, run: &ImportRun) -> RepositoryResult<()>;

    /// 整行覆盖更新（按 id）
    ///
    /// # 返回
    /// - Err(NotFound): 运行不存在
    async fn update_run(&self, run: &ImportRun) -> RepositoryResult<()>;

    async fn find_run(&self, run_id: Uuid) -> RepositoryResult<Option<ImportRun>>;

    /// 同租户、同内容哈希、已完成的最近一次运行
    async fn find_completed_by_hash(
        &self,
        tenant_id: Uuid,
        content_hash: &str,
        exclude_run_id: Uuid,
    ) -> RepositoryResult<Option<ImportRun>>;

    /// 租户运行列表（按开始时间倒序）
    async fn list_runs(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<ImportRun>>;

    async fn count_runs(&self, tenant_id: Uuid) -> RepositoryResult<i64>;
}
