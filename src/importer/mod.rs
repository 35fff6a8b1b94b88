// ==========================================
// Analitik ETL - 导入层
// ==========================================
// 职责: 上传工作簿 → 结构校验 → 逐表读取 → 原子落库 → 运行记录
// 支持: Excel (.xlsx)，固定四张工作表
// ==========================================

// 模块声明
pub mod error;
pub mod etl_importer_impl;
pub mod etl_importer_trait;
pub mod import_log_recorder;
pub mod sheet;
pub mod sheet_reader;
pub mod structure;
pub mod transform;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use etl_importer_impl::EtlImporterImpl;
pub use import_log_recorder::ImportLogRecorder;
pub use sheet::{CellValue, SheetTable, WorkbookData};
pub use sheet_reader::{
    FinancialSheetReader, InventorySheetReader, ProductSheetReader, ReadContext,
    SalesSheetReader,
};
pub use structure::StructuralValidator;

// 重导出 Trait 接口
pub use etl_importer_trait::{EtlImporter, SheetReader, StructureValidator};
