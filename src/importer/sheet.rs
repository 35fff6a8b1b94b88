// ==========================================
// Analitik ETL - 工作表模型
// ==========================================
// 职责: calamine 单元格 → CellValue；工作表 → SheetTable；
//       表头一次性解析为列位置描述 (SheetSchema)，逐行按下标取值
// 说明: 行号为工作表绝对行号（1 起始），全空行跳过但不重新编号
// ==========================================

use crate::domain::types::SheetKind;
use crate::importer::error::ImportResult;
use calamine::{Data, Range, Reader, Xlsx};
use std::collections::HashMap;
use std::io::Cursor;
use std::marker::PhantomData;
use tracing::debug;

// ==========================================
// CellValue - 单元格原始值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateSerial(f64), // Excel 日期序列号（1899-12-30 基准）
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// 空值或纯空白文本
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 原始文本（用于错误报告中的 ValorEncontrado）
    pub fn raw_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) | CellValue::DateSerial(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
        }
    }

    /// 去除首尾空白后的文本，空白返回 None
    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        Some(self.raw_text().trim().to_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::from(s.as_str()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::DateSerial(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ==========================================
// SheetRow / SheetTable
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_number: u32,
    pub cells: Vec<CellValue>,
}

impl SheetRow {
    /// 越界视为空单元格
    pub fn cell(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(CellValue::is_blank)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub name: String,
    /// 规范化表头（小写、去空白），空表为空
    pub headers: Vec<String>,
    /// 非空数据行
    pub rows: Vec<SheetRow>,
}

impl SheetTable {
    /// 从行集合构建：首个非空行为表头
    ///
    /// # 参数
    /// - first_row_number: rows[0] 在工作表中的绝对行号
    pub fn from_rows(name: &str, first_row_number: u32, rows: Vec<Vec<CellValue>>) -> Self {
        let mut headers = Vec::new();
        let mut data_rows = Vec::new();

        for (offset, cells) in rows.into_iter().enumerate() {
            let row = SheetRow {
                row_number: first_row_number + offset as u32,
                cells,
            };
            if row.is_blank() {
                continue;
            }
            if headers.is_empty() {
                headers = row
                    .cells
                    .iter()
                    .map(|c| c.raw_text().trim().to_lowercase())
                    .collect();
                continue;
            }
            data_rows.push(row);
        }

        Self {
            name: name.to_string(),
            headers,
            rows: data_rows,
        }
    }

    /// 从文本行构建（第 1 行为表头）
    pub fn from_text_rows(name: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|s| CellValue::from(*s)).collect())
            .collect();
        Self::from_rows(name, 1, rows)
    }

    /// 从 calamine Range 构建
    pub fn from_range(name: &str, range: &Range<Data>) -> Self {
        let first_row_number = range.start().map(|(row, _)| row + 1).unwrap_or(1);
        let rows = range
            .rows()
            .map(|r| r.iter().map(CellValue::from).collect())
            .collect();
        Self::from_rows(name, first_row_number, rows)
    }

    /// 无表头（空表）
    pub fn is_empty(&self) -> bool {
        self.headers.iter().all(|h| h.is_empty())
    }

    /// 表头名 → 列下标（忽略大小写，精确匹配）
    pub fn column_index(&self, header: &str) -> Option<usize> {
        let wanted = header.trim().to_lowercase();
        self.headers.iter().position(|h| *h == wanted)
    }
}

// ==========================================
// ColumnSet / SheetSchema - 列定义与一次性解析
// ==========================================

/// 工作表列集合（每张表一个枚举）
pub trait ColumnSet: Copy + 'static {
    /// 全部列，顺序与 index() 一致
    const ALL: &'static [Self];

    /// 契约列名（小写）
    fn header(&self) -> &'static str;

    fn is_mandatory(&self) -> bool;

    fn index(&self) -> usize;
}

/// 表头解析结果：列 → 工作表列下标
#[derive(Debug, Clone)]
pub struct SheetSchema<C: ColumnSet> {
    positions: Vec<Option<usize>>,
    _columns: PhantomData<C>,
}

impl<C: ColumnSet> SheetSchema<C> {
    pub fn resolve(table: &SheetTable) -> Self {
        Self {
            positions: C::ALL.iter().map(|c| table.column_index(c.header())).collect(),
            _columns: PhantomData,
        }
    }

    /// 必填列名清单
    pub fn mandatory_headers() -> Vec<&'static str> {
        C::ALL
            .iter()
            .filter(|c| c.is_mandatory())
            .map(|c| c.header())
            .collect()
    }

    /// 缺失的必填列
    pub fn missing_mandatory(&self) -> Vec<&'static str> {
        C::ALL
            .iter()
            .filter(|c| c.is_mandatory() && !self.has(**c))
            .map(|c| c.header())
            .collect()
    }

    pub fn has(&self, column: C) -> bool {
        self.positions.get(column.index()).copied().flatten().is_some()
    }

    /// 取单元格；列不存在时返回空单元格
    pub fn cell<'r>(&self, row: &'r SheetRow, column: C) -> &'r CellValue {
        match self.positions.get(column.index()).copied().flatten() {
            Some(idx) => row.cell(idx),
            None => &EMPTY_CELL,
        }
    }
}

// ==========================================
// WorkbookData - 已读取的工作簿
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct WorkbookData {
    pub sheet_names: Vec<String>,
    pub tables: HashMap<SheetKind, SheetTable>,
}

impl WorkbookData {
    /// 仅读取工作表名称（文件级校验用）
    pub fn list_sheet_names(bytes: &[u8]) -> ImportResult<Vec<String>> {
        let workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        Ok(workbook.sheet_names())
    }

    /// 读取工作簿及四张必需表的全部单元格
    pub fn open(bytes: &[u8]) -> ImportResult<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let sheet_names = workbook.sheet_names();

        let mut tables = HashMap::new();
        for name in &sheet_names {
            let Some(kind) = SheetKind::from_sheet_name(name) else {
                continue;
            };
            if tables.contains_key(&kind) {
                continue;
            }
            let range = workbook.worksheet_range(name)?;
            let table = SheetTable::from_range(kind.sheet_name(), &range);
            debug!(sheet = %name, rows = table.rows.len(), "工作表读取完成");
            tables.insert(kind, table);
        }

        Ok(Self {
            sheet_names,
            tables,
        })
    }

    pub fn table(&self, kind: SheetKind) -> Option<&SheetTable> {
        self.tables.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum DemoColumn {
        Code = 0,
        Qty = 1,
        Note = 2,
    }

    impl ColumnSet for DemoColumn {
        const ALL: &'static [Self] = &[DemoColumn::Code, DemoColumn::Qty, DemoColumn::Note];

        fn header(&self) -> &'static str {
            match self {
                DemoColumn::Code => "codigo_producto",
                DemoColumn::Qty => "cantidad_disponible",
                DemoColumn::Note => "ubicacion",
            }
        }

        fn is_mandatory(&self) -> bool {
            !matches!(self, DemoColumn::Note)
        }

        fn index(&self) -> usize {
            *self as usize
        }
    }

    #[test]
    fn test_header_resolution_is_case_insensitive() {
        let table = SheetTable::from_text_rows(
            "INVENTARIO",
            &[&["Cantidad_Disponible", " CODIGO_PRODUCTO "], &["5", "PROD-001"]],
        );
        let schema = SheetSchema::<DemoColumn>::resolve(&table);

        assert!(schema.missing_mandatory().is_empty());
        assert!(!schema.has(DemoColumn::Note));
        let row = &table.rows[0];
        assert_eq!(schema.cell(row, DemoColumn::Code).raw_text(), "PROD-001");
        assert!(schema.cell(row, DemoColumn::Note).is_blank());
    }

    #[test]
    fn test_missing_mandatory_columns_reported() {
        let table = SheetTable::from_text_rows("INVENTARIO", &[&["codigo_producto"], &["A"]]);
        let schema = SheetSchema::<DemoColumn>::resolve(&table);
        assert_eq!(schema.missing_mandatory(), vec!["cantidad_disponible"]);
    }

    #[test]
    fn test_blank_rows_skipped_keep_absolute_numbers() {
        let table = SheetTable::from_text_rows(
            "INVENTARIO",
            &[&["codigo_producto", "cantidad_disponible"], &["A", "1"], &["", " "], &["B", "2"]],
        );
        let numbers: Vec<u32> = table.rows.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![2, 4]);
    }

    #[test]
    fn test_raw_text_of_integral_number() {
        assert_eq!(CellValue::Number(15000.0).raw_text(), "15000");
        assert_eq!(CellValue::Number(1.5).raw_text(), "1.5");
    }
}
