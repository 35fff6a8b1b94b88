// ==========================================
// Analitik ETL - 结构校验器
// ==========================================
// 阶段 1: 文件级（扩展名 → 大小 → 容器可解析 → 至少一张表），首个失败即返回
// 阶段 2: 工作表级（四张必需表 → 必填列 → 数据行），任何错误均终止导入
// 红线: 结构错误在行级处理之前产生，不读取任何数据行内容
// ==========================================

use crate::domain::types::SheetKind;
use crate::domain::validation::{StructuredError, ValidationOutcome};
use crate::i18n::{t, t_with_args};
use crate::importer::etl_importer_trait::StructureValidator;
use crate::importer::sheet::WorkbookData;
use crate::importer::sheet_reader::missing_mandatory_columns;
use tracing::{debug, warn};

/// 文件级错误列名
pub const FILE_COLUMN: &str = "Archivo";
/// 缺失工作表错误列名
pub const SHEETS_COLUMN: &str = "Hojas";

/// 上传大小上限（契约值 10 MiB）
pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

const ACCEPTED_EXTENSION: &str = ".xlsx";

// ==========================================
// StructuralValidator
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl StructuralValidator {
    pub fn new() -> Self {
        Self
    }
}

impl StructureValidator for StructuralValidator {
    fn validate_file(
        &self,
        file_name: &str,
        size: u64,
        content: &[u8],
        max_size: u64,
    ) -> ValidationOutcome {
        if !file_name.trim().to_lowercase().ends_with(ACCEPTED_EXTENSION) {
            return ValidationOutcome::failure(
                StructuredError::file_level(FILE_COLUMN, t("file.not_xlsx"))
                    .with_value(file_name)
                    .with_suggestion(t("file.not_xlsx_suggestion")),
            );
        }

        let max_size = max_size.min(MAX_FILE_SIZE_BYTES);
        if size > max_size {
            let max_mb = (max_size as f64 / (1024.0 * 1024.0)).to_string();
            return ValidationOutcome::failure(
                StructuredError::file_level(
                    FILE_COLUMN,
                    t_with_args("file.too_large", &[("max_mb", &max_mb)]),
                )
                .with_value(size.to_string())
                .with_suggestion(t("file.too_large_suggestion")),
            );
        }

        match WorkbookData::list_sheet_names(content) {
            Ok(names) if names.is_empty() => ValidationOutcome::failure(
                StructuredError::file_level(FILE_COLUMN, t("file.no_sheets")),
            ),
            Ok(names) => {
                debug!(file = %file_name, sheets = ?names, "文件级校验通过");
                ValidationOutcome::success()
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "工作簿解析失败");
                ValidationOutcome::failure(
                    StructuredError::file_level(FILE_COLUMN, t("file.corrupt"))
                        .with_suggestion(t("file.corrupt_suggestion")),
                )
            }
        }
    }

    fn validate_sheets(&self, workbook: &WorkbookData) -> ValidationOutcome {
        let missing: Vec<&str> = SheetKind::ALL
            .iter()
            .filter(|kind| workbook.table(**kind).is_none())
            .map(|kind| kind.sheet_name())
            .collect();
        if !missing.is_empty() {
            return ValidationOutcome::failure(
                StructuredError::file_level(
                    SHEETS_COLUMN,
                    t_with_args("structure.missing_sheets", &[("sheets", &missing.join(", "))]),
                )
                .with_value(workbook.sheet_names.join(", "))
                .with_suggestion(t("structure.missing_sheets_suggestion")),
            );
        }

        let mut outcome = ValidationOutcome::success();
        for kind in SheetKind::ALL {
            let Some(table) = workbook.table(kind) else {
                continue;
            };
            let sheet = kind.sheet_name();

            if table.is_empty() {
                outcome.push_error(StructuredError::new(
                    1,
                    sheet,
                    t_with_args("structure.empty_sheet", &[("sheet", sheet)]),
                ));
                continue;
            }

            let missing_columns = missing_mandatory_columns(kind, table);
            if !missing_columns.is_empty() {
                outcome.push_error(
                    StructuredError::new(
                        1,
                        sheet,
                        t_with_args(
                            "structure.missing_columns",
                            &[("columns", &missing_columns.join(", "))],
                        ),
                    )
                    .with_suggestion(t_with_args(
                        "structure.missing_columns_suggestion",
                        &[("sheet", sheet)],
                    )),
                );
                continue;
            }

            if table.rows.is_empty() {
                outcome.push_error(
                    StructuredError::new(
                        2,
                        sheet,
                        t_with_args("structure.no_data", &[("sheet", sheet)]),
                    )
                    .with_suggestion(t("structure.no_data_suggestion")),
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::sheet::SheetTable;
    use rust_xlsxwriter::Workbook;
    use std::collections::HashMap;

    fn workbook_bytes(sheets: &[&str]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for name in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(*name).unwrap();
            sheet.write_string(0, 0, "codigo_producto").unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    fn full_headers(kind: SheetKind) -> Vec<&'static str> {
        crate::importer::sheet_reader::mandatory_columns(kind)
    }

    fn workbook_with(tables: Vec<(SheetKind, Vec<Vec<&str>>)>) -> WorkbookData {
        let mut map = HashMap::new();
        for (kind, rows) in tables {
            let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
            map.insert(kind, SheetTable::from_text_rows(kind.sheet_name(), &rows));
        }
        WorkbookData {
            sheet_names: map.values().map(|t| t.name.clone()).collect(),
            tables: map,
        }
    }

    fn complete_sheet(kind: SheetKind) -> (SheetKind, Vec<Vec<&'static str>>) {
        let header = full_headers(kind);
        let data = vec!["x"; header.len()];
        (kind, vec![header, data])
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let outcome = StructuralValidator.validate_file("datos.csv", 10, b"a,b", MAX_FILE_SIZE_BYTES);
        assert!(!outcome.is_success());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 0);
        assert_eq!(outcome.errors[0].column, FILE_COLUMN);
    }

    #[test]
    fn test_rejects_oversized_file() {
        let bytes = workbook_bytes(&["PRODUCTOS"]);
        let outcome = StructuralValidator.validate_file(
            "datos.xlsx",
            MAX_FILE_SIZE_BYTES + 1,
            &bytes,
            MAX_FILE_SIZE_BYTES,
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].offending_value.as_deref(), Some("10485761"));
    }

    #[test]
    fn test_configured_limit_cannot_exceed_contract() {
        let bytes = workbook_bytes(&["PRODUCTOS"]);
        let outcome = StructuralValidator.validate_file(
            "datos.xlsx",
            MAX_FILE_SIZE_BYTES + 1,
            &bytes,
            u64::MAX,
        );
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_rejects_corrupt_container() {
        let outcome = StructuralValidator.validate_file(
            "datos.xlsx",
            12,
            b"no es un zip",
            MAX_FILE_SIZE_BYTES,
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 0);
    }

    #[test]
    fn test_accepts_valid_workbook_file() {
        let bytes = workbook_bytes(&["PRODUCTOS", "INVENTARIO"]);
        let outcome = StructuralValidator.validate_file(
            "Carga.XLSX",
            bytes.len() as u64,
            &bytes,
            MAX_FILE_SIZE_BYTES,
        );
        assert!(outcome.is_success(), "{:?}", outcome.errors);
    }

    #[test]
    fn test_missing_sheets_reported_once() {
        let workbook = workbook_with(vec![
            complete_sheet(SheetKind::Products),
            complete_sheet(SheetKind::Inventory),
        ]);
        let outcome = StructuralValidator.validate_sheets(&workbook);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].column, SHEETS_COLUMN);
        assert!(outcome.errors[0].message.contains("VENTAS"));
        assert!(outcome.errors[0].message.contains("FINANCIEROS"));
    }

    #[test]
    fn test_sheet_errors_collected_across_sheets() {
        let workbook = workbook_with(vec![
            complete_sheet(SheetKind::Products),
            (SheetKind::Inventory, vec![vec!["codigo_producto"], vec!["PROD-001"]]),
            (SheetKind::Sales, vec![]),
            (SheetKind::Financials, vec![full_headers(SheetKind::Financials)]),
        ]);
        let outcome = StructuralValidator.validate_sheets(&workbook);

        let located: Vec<(u32, &str)> = outcome
            .errors
            .iter()
            .map(|e| (e.row, e.column.as_str()))
            .collect();
        assert_eq!(
            located,
            vec![(1, "INVENTARIO"), (1, "VENTAS"), (2, "FINANCIEROS")]
        );
        assert!(outcome.errors[0].message.contains("cantidad_disponible"));
    }

    #[test]
    fn test_complete_workbook_passes() {
        let workbook = workbook_with(SheetKind::ALL.iter().map(|k| complete_sheet(*k)).collect());
        assert!(StructuralValidator.validate_sheets(&workbook).is_success());
    }
}
