// ==========================================
// Analitik ETL - 配置层
// ==========================================
// 职责: 导入配置管理，支持租户级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod etl_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, GLOBAL_SCOPE};
pub use etl_config_trait::EtlConfigReader;
