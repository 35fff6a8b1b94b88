// ==========================================
// Analitik ETL - 工作表读取器（公共部分）
// ==========================================
// 职责: 逐行扫描、行级拒绝收敛、字段读取辅助
// 流程: 必填检查 → 格式解析 → 业务规则（首个失败即拒绝该行）
// 红线: 单行异常只产生行级错误，不中断整张表的扫描
// ==========================================

pub mod financials;
pub mod inventory;
pub mod products;
pub mod sales;

use crate::domain::types::SheetKind;
use crate::domain::validation::{StructuredError, ValidationOutcome};
use crate::i18n::{t, t_with_args};
use crate::importer::error::ImportError;
use crate::importer::sheet::{CellValue, ColumnSet, SheetRow, SheetSchema, SheetTable};
use crate::importer::transform::{self, ParseError};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

pub use financials::{FinancialColumn, FinancialSheetReader};
pub use inventory::{InventoryColumn, InventorySheetReader};
pub use products::{ProductColumn, ProductSheetReader};
pub use sales::{SaleColumn, SalesSheetReader};

// ==========================================
// ReadContext - 读取上下文
// ==========================================
pub struct ReadContext<'a> {
    pub tenant_id: Uuid,
    /// 未来日期判定基准
    pub today: NaiveDate,
    /// 本次上传中已通过校验的产品编码
    pub upload_product_codes: &'a HashSet<String>,
    /// 租户已持久化的产品编码
    pub persisted_product_codes: &'a HashSet<String>,
}

// ==========================================
// RowRejection - 行级拒绝
// ==========================================
#[derive(Debug)]
pub enum RowRejection {
    /// 校验失败（用户可修正）
    Invalid(StructuredError),
    /// 意外错误（记录日志后转为通用行错误）
    Unexpected(ImportError),
}

impl From<StructuredError> for RowRejection {
    fn from(err: StructuredError) -> Self {
        RowRejection::Invalid(err)
    }
}

pub type RowResult<T> = Result<T, RowRejection>;

/// 工作表必填列（结构校验与读取共用同一来源）
pub fn mandatory_columns(kind: SheetKind) -> Vec<&'static str> {
    match kind {
        SheetKind::Products => SheetSchema::<ProductColumn>::mandatory_headers(),
        SheetKind::Inventory => SheetSchema::<InventoryColumn>::mandatory_headers(),
        SheetKind::Sales => SheetSchema::<SaleColumn>::mandatory_headers(),
        SheetKind::Financials => SheetSchema::<FinancialColumn>::mandatory_headers(),
    }
}

/// 工作表缺失的必填列
pub fn missing_mandatory_columns(kind: SheetKind, table: &SheetTable) -> Vec<&'static str> {
    match kind {
        SheetKind::Products => SheetSchema::<ProductColumn>::resolve(table).missing_mandatory(),
        SheetKind::Inventory => SheetSchema::<InventoryColumn>::resolve(table).missing_mandatory(),
        SheetKind::Sales => SheetSchema::<SaleColumn>::resolve(table).missing_mandatory(),
        SheetKind::Financials => SheetSchema::<FinancialColumn>::resolve(table).missing_mandatory(),
    }
}

/// 逐行扫描
///
/// # 参数
/// - table: 工作表
/// - read_row: 单行读取闭包（可持有跨行状态，如重复检测集合）
///
/// # 返回
/// - (通过的记录, 校验结果)；任意行错误 → 结果失败
pub fn scan_rows<C, T, F>(table: &SheetTable, mut read_row: F) -> (Vec<T>, ValidationOutcome)
where
    C: ColumnSet,
    F: FnMut(&mut RowFields<'_, C>) -> RowResult<T>,
{
    let schema = SheetSchema::<C>::resolve(table);
    let mut records = Vec::new();
    let mut outcome = ValidationOutcome::success();

    for row in &table.rows {
        let mut fields = RowFields {
            schema: &schema,
            row,
            warnings: &mut outcome.warnings,
        };
        match read_row(&mut fields) {
            Ok(record) => records.push(record),
            Err(RowRejection::Invalid(err)) => outcome.push_error(err),
            Err(RowRejection::Unexpected(err)) => {
                warn!(sheet = %table.name, row = row.row_number, error = %err, "行处理异常");
                outcome.push_error(
                    StructuredError::new(row.row_number, table.name.clone(), t("row.unexpected"))
                        .with_suggestion(t("row.unexpected_suggestion")),
                );
            }
        }
    }

    (records, outcome)
}

// ==========================================
// RowFields - 单行字段读取
// ==========================================
pub struct RowFields<'a, C: ColumnSet> {
    schema: &'a SheetSchema<C>,
    row: &'a SheetRow,
    warnings: &'a mut Vec<String>,
}

impl<'a, C: ColumnSet> RowFields<'a, C> {
    pub fn row_number(&self) -> u32 {
        self.row.row_number
    }

    pub fn cell(&self, column: C) -> &'a CellValue {
        self.schema.cell(self.row, column)
    }

    /// 构造本行某列的错误
    pub fn error(&self, column: C, message: impl Into<String>) -> StructuredError {
        StructuredError::new(self.row.row_number, column.header(), message)
    }

    pub fn warn(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    // ===== 必填字段 =====

    /// 必填检查（空白即拒绝）
    pub fn require_present(&self, column: C) -> RowResult<()> {
        if self.cell(column).is_blank() {
            return Err(self
                .error(column, t("row.required"))
                .with_suggestion(t_with_args("row.required_suggestion", &[("column", column.header())]))
                .into());
        }
        Ok(())
    }

    /// 必填文本（规范化后）
    pub fn required_text(&self, column: C) -> RowResult<String> {
        self.require_present(column)?;
        Ok(transform::normalize_text(&self.cell(column).raw_text()))
    }

    /// 必填金额
    pub fn required_currency(&self, column: C) -> RowResult<f64> {
        self.require_present(column)?;
        let value = transform::parse_currency(self.cell(column))
            .map_err(|e| self.format_error(column, e, t("row.decimal_suggestion")))?;
        self.ensure_finite(column, value)
    }

    /// 必填整数
    pub fn required_integer(&self, column: C) -> RowResult<i64> {
        self.require_present(column)?;
        transform::parse_integer(self.cell(column))
            .map_err(|e| self.format_error(column, e, t("row.integer_suggestion")))
    }

    /// 必填日期
    pub fn required_date(&self, column: C) -> RowResult<NaiveDate> {
        self.require_present(column)?;
        transform::parse_date(self.cell(column)).map_err(|e| {
            RowRejection::Invalid(
                self.error(column, t("row.invalid_date"))
                    .with_value(e.raw)
                    .with_suggestion(t("row.date_suggestion"))
                    .with_expected_type(e.expected),
            )
        })
    }

    fn format_error(&self, column: C, err: ParseError, suggestion: String) -> RowRejection {
        RowRejection::Invalid(
            self.error(column, t("row.invalid_format"))
                .with_value(err.raw)
                .with_suggestion(suggestion)
                .with_expected_type(err.expected),
        )
    }

    /// 超长数字串会解析为无穷大，视为意外错误
    fn ensure_finite(&self, column: C, value: f64) -> RowResult<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(RowRejection::Unexpected(ImportError::TypeConversionError {
                row: self.row.row_number,
                field: column.header().to_string(),
                message: format!("valor no finito: {}", self.cell(column).raw_text()),
            }))
        }
    }

    // ===== 可选字段 =====
    // 格式错误只告警，字段按缺省处理

    pub fn optional_text(&self, column: C) -> Option<String> {
        self.cell(column)
            .as_text()
            .map(|s| transform::normalize_text(&s))
            .filter(|s| !s.is_empty())
    }

    pub fn optional_currency(&mut self, column: C) -> Option<f64> {
        self.optional_with(column, transform::parse_currency)
            .filter(|v| v.is_finite())
    }

    pub fn optional_decimal(&mut self, column: C) -> Option<f64> {
        self.optional_with(column, transform::parse_decimal)
            .filter(|v| v.is_finite())
    }

    pub fn optional_integer(&mut self, column: C) -> Option<i64> {
        self.optional_with(column, transform::parse_integer)
    }

    pub fn optional_date(&mut self, column: C) -> Option<NaiveDate> {
        self.optional_with(column, transform::parse_date)
    }

    /// 布尔（宽松解析，不会失败）
    pub fn flag(&self, column: C) -> bool {
        transform::parse_boolean(self.cell(column))
    }

    fn optional_with<T>(
        &mut self,
        column: C,
        parse: fn(&CellValue) -> Result<T, ParseError>,
    ) -> Option<T> {
        let cell = self.cell(column);
        if cell.is_blank() {
            return None;
        }
        match parse(cell) {
            Ok(value) => Some(value),
            Err(err) => {
                let row = self.row.row_number.to_string();
                self.warn(t_with_args(
                    "row.optional_ignored",
                    &[("row", &row), ("value", &err.raw), ("column", column.header())],
                ));
                None
            }
        }
    }
}

/// "Debe ser: a, b, c"
pub(crate) fn one_of_message(options: &[&str]) -> String {
    t_with_args("row.must_be_one_of", &[("options", &options.join(", "))])
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn context<'a>(
        upload: &'a HashSet<String>,
        persisted: &'a HashSet<String>,
    ) -> ReadContext<'a> {
        ReadContext {
            tenant_id: Uuid::nil(),
            today: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            upload_product_codes: upload,
            persisted_product_codes: persisted,
        }
    }

    pub fn codes(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }
}
