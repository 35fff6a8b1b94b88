// ==========================================
// Analitik ETL - 领域模型层
// ==========================================
// 职责: 定义导入运行、工作表记录、校验结果与枚举类型
// 红线: 不含数据访问逻辑，不含 Excel 读取逻辑
// ==========================================

pub mod import_run;
pub mod records;
pub mod types;
pub mod validation;

// 重导出核心类型
pub use import_run::{
    ImportOutcome, ImportReport, ImportRequest, ImportRun, LoadSummary, PhaseErrors, RunCounters, RunHistoryPage, RunStatus,
};
pub use records::{
    FinancialRecord, InventoryRecord, LoadDefaults, ProductRecord, SaleLineItem, SaleRecord, ValidatedBatch,
};
pub use types::{EntryKind, EtlPhase, PaymentMethod, RunState, SheetKind};
pub use validation::{StructuredError, ValidationOutcome};
