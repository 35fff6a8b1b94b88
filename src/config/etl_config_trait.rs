// ==========================================
// Analitik ETL - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// 查找顺序: 租户 scope → global → 内置默认值
// ==========================================

use crate::domain::records::LoadDefaults;
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use uuid::Uuid;

// ==========================================
// EtlConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait EtlConfigReader: Send + Sync {
    /// 上传大小上限（字节）
    ///
    /// # 默认值
    /// - 10 MiB（超过契约上限的配置值会被截断为 10 MiB）
    async fn max_file_size_bytes(&self, tenant_id: Uuid) -> ImportResult<u64>;

    /// 整次导入的截止时间（秒），0 表示不限
    ///
    /// # 默认值
    /// - 300
    async fn import_deadline_secs(&self, tenant_id: Uuid) -> ImportResult<u64>;

    /// en_proceso 运行判定为废弃的无更新时长（秒）
    ///
    /// # 默认值
    /// - 1800
    async fn stale_run_timeout_secs(&self, tenant_id: Uuid) -> ImportResult<u64>;

    /// 落库缺省值（币种、到期提醒天数、支付状态、销售状态）
    async fn load_defaults(&self, tenant_id: Uuid) -> ImportResult<LoadDefaults>;
}
