// ==========================================
// Analitik ETL - 原子落库 Repository Trait
// ==========================================
// 职责: 定义落库相关数据访问接口（不包含业务校验）
// 红线: 四类记录在同一事务中写入，全部成功或全部回滚
// ==========================================

use crate::domain::import_run::LoadSummary;
use crate::domain::records::{LoadDefaults, ValidatedBatch};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

/// 落库输出: 汇总 + 落库级告警（跳过的行）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutput {
    pub summary: LoadSummary,
    pub warnings: Vec<String>,
}

/// 租户各业务表行数（核对用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantRowCounts {
    pub products: i64,
    pub inventory: i64,
    pub sales: i64,
    pub sale_lines: i64,
    pub financials: i64,
}

impl TenantRowCounts {
    pub fn total(&self) -> i64 {
        self.products + self.inventory + self.sales + self.sale_lines + self.financials
    }
}

// ==========================================
// EtlLoadRepository Trait
// ==========================================
// 用途: 读取已有产品编码 + 原子落库
// 实现者: EtlLoadRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait EtlLoadRepository: Send + Sync {
    /// 租户已持久化的产品编码（批量查询）
    async fn find_product_codes(&self, tenant_id: Uuid) -> RepositoryResult<HashSet<String>>;

    /// 在单个事务中写入四类记录
    ///
    /// # 参数
    /// - tenant_id: 租户 ID
    /// - batch: 已通过读取阶段校验的记录
    /// - defaults: 缺省币种、支付状态等
    ///
    /// # 返回
    /// - Ok(LoadOutput): 各类计数、处理总数、耗时、落库级告警
    /// - Err: 任意子步骤失败（事务已回滚，无任何记录可见）
    async fn load_atomically(
        &self,
        tenant_id: Uuid,
        batch: &ValidatedBatch,
        defaults: &LoadDefaults,
    ) -> RepositoryResult<LoadOutput>;

    /// 统计租户各业务表行数
    async fn count_tenant_rows(&self, tenant_id: Uuid) -> RepositoryResult<TenantRowCounts>;
}
