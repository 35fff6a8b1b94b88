// ==========================================
// Analitik ETL - 核心库
// ==========================================
// 职责: 多租户 Excel 工作簿导入
//       (PRODUCTOS / INVENTARIO / VENTAS / FINANCIEROS)
// 技术栈: Rust + SQLite + calamine
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "es");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 运行记录、工作表记录与校验结果
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 结构校验、工作表读取、管道编排
pub mod importer;

// 配置层 - 租户级配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

pub use api::{ApiError, ImportApi};
pub use domain::{
    EtlPhase, ImportOutcome, ImportReport, ImportRun, LoadSummary, RunState, RunStatus,
    StructuredError, ValidationOutcome,
};
pub use importer::{EtlImporter, EtlImporterImpl, ImportLogRecorder};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Analitik ETL";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
