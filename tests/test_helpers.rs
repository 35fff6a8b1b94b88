// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试工作簿生成等功能
// ==========================================

#![allow(dead_code)]

use analitik_etl::db::{init_schema, open_sqlite_connection};
use rust_xlsxwriter::Workbook;
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

// ==========================================
// 测试工作簿
// ==========================================

/// 单张工作表（第 1 行为表头）
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    pub fn new(name: &str, rows: &[&[&str]]) -> Self {
        Self {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    /// 修改某数据行（1 起始，不含表头）某列的值
    pub fn set(&mut self, data_row: usize, header: &str, value: &str) {
        let col = self.rows[0]
            .iter()
            .position(|h| h == header)
            .unwrap_or_else(|| panic!("列不存在: {}", header));
        self.rows[data_row][col] = value.to_string();
    }

    pub fn push_row(&mut self, row: &[&str]) {
        self.rows.push(row.iter().map(|s| s.to_string()).collect());
    }
}

/// 生成 .xlsx 字节
pub fn workbook_bytes(sheets: &[SheetData]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for data in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(&data.name).unwrap();
        for (r, row) in data.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet.write_string(r as u32, c as u16, value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// 标准场景: 2 个产品、2 条库存、1 笔销售（含明细）、1 条财务
pub fn standard_sheets() -> Vec<SheetData> {
    vec![
        SheetData::new(
            "PRODUCTOS",
            &[
                &[
                    "codigo_producto",
                    "nombre",
                    "precio_venta",
                    "unidad_medida",
                    "requiere_inventario",
                    "activo",
                    "categoria",
                    "costo_unitario",
                ],
                &["PROD-001", "Camisa Polo", "89500", "unidad", "VERDADERO", "SI", "uniformes", "45000"],
                &["PROD-002", "Pantalón Drill", "120000", "unidad", "SI", "SI", "casual", ""],
            ],
        ),
        SheetData::new(
            "INVENTARIO",
            &[
                &["codigo_producto", "cantidad_disponible", "ubicacion"],
                &["PROD-001", "25", "Bodega A"],
                &["PROD-002", "10", "Bodega B"],
            ],
        ),
        SheetData::new(
            "VENTAS",
            &[
                &[
                    "numero_orden",
                    "fecha_venta",
                    "cliente_nombre",
                    "monto_total",
                    "metodo_pago",
                    "cliente_email",
                    "canal_venta",
                    "codigo_producto",
                    "cantidad",
                    "precio_unitario",
                ],
                &[
                    "ORD-0001",
                    "2024-03-05",
                    "María Gómez",
                    "179000",
                    "tarjeta",
                    "maria@example.com",
                    "online",
                    "PROD-001",
                    "2",
                    "89500",
                ],
            ],
        ),
        SheetData::new(
            "FINANCIEROS",
            &[
                &["tipo_dato", "categoria", "concepto", "monto", "fecha_registro"],
                &["gasto", "salarios", "Nómina marzo", "1500000", "2024-03-31"],
            ],
        ),
    ]
}

/// 标准场景工作簿
pub fn standard_workbook() -> Vec<u8> {
    workbook_bytes(&standard_sheets())
}

/// 按名称取工作表（可修改）
pub fn sheet_mut<'a>(sheets: &'a mut [SheetData], name: &str) -> &'a mut SheetData {
    sheets
        .iter_mut()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("工作表不存在: {}", name))
}
