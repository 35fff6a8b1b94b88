// ==========================================
// Analitik ETL - 导入接口 Trait
// ==========================================
// 职责: 定义导入管道各阶段的接口（不包含实现）
// ==========================================

use crate::domain::import_run::{ImportOutcome, ImportRequest};
use crate::domain::types::SheetKind;
use crate::domain::validation::ValidationOutcome;
use crate::importer::sheet::{SheetTable, WorkbookData};
use crate::importer::sheet_reader::ReadContext;
use async_trait::async_trait;

// ==========================================
// EtlImporter Trait
// ==========================================
// 用途: 导入主接口
// 实现者: EtlImporterImpl
#[async_trait]
pub trait EtlImporter: Send + Sync {
    /// 导入一个工作簿
    ///
    /// # 参数
    /// - request: 租户 ID + 文件名 + 文件内容
    ///
    /// # 返回
    /// - ImportOutcome: 成功标志、消息、运行 ID、结构化错误、告警、汇总
    ///   （不返回 Err，任何失败都转为 success = false 的结果）
    ///
    /// # 导入流程
    /// 1. 文件级结构校验
    /// 2. 登记运行 + 重复上传检测
    /// 3. 工作表级结构校验
    /// 4. 逐表读取（PRODUCTOS → INVENTARIO → VENTAS → FINANCIEROS）
    /// 5. 原子落库
    /// 6. 记录成功/失败
    async fn import_workbook(&self, request: ImportRequest) -> ImportOutcome;
}

// ==========================================
// StructureValidator Trait
// ==========================================
// 用途: 结构校验（行级处理之前执行）
// 实现者: StructuralValidator
pub trait StructureValidator: Send + Sync {
    /// 文件级校验: 扩展名、大小、可解析、至少一张工作表
    ///
    /// # 返回
    /// - 失败时恰好包含一条行号 0 的错误
    fn validate_file(
        &self,
        file_name: &str,
        size: u64,
        content: &[u8],
        max_size: u64,
    ) -> ValidationOutcome;

    /// 工作表级校验: 四张必需表、必填列、至少一行数据
    fn validate_sheets(&self, workbook: &WorkbookData) -> ValidationOutcome;
}

// ==========================================
// SheetReader Trait
// ==========================================
// 用途: 单张工作表读取
// 实现者: ProductSheetReader, InventorySheetReader, SalesSheetReader, FinancialSheetReader
pub trait SheetReader: Send + Sync {
    type Record: Send;

    /// 读取器对应的工作表
    fn sheet(&self) -> SheetKind;

    /// 读取全部数据行
    ///
    /// # 返回
    /// - (通过的记录, 校验结果)；结果失败时调用方必须中止
    fn read(&self, table: &SheetTable, ctx: &ReadContext<'_>)
        -> (Vec<Self::Record>, ValidationOutcome);
}
