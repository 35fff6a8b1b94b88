// ==========================================
// Analitik ETL - PRODUCTOS 读取器
// ==========================================
// 规则顺序: 必填 → 编码规范化/格式 → 表内重复 → 价格 > 0
//          → 成本 <= 价格 → 计量单位 → 服务不管库存 → 分类（仅告警）
// ==========================================

use crate::domain::records::ProductRecord;
use crate::domain::types::{SheetKind, PRODUCT_CATEGORIES, UNITS_OF_MEASURE};
use crate::domain::validation::ValidationOutcome;
use crate::i18n::{t, t_with_args};
use crate::importer::etl_importer_trait::SheetReader;
use crate::importer::sheet::{ColumnSet, SheetTable};
use crate::importer::sheet_reader::{
    one_of_message, scan_rows, ReadContext, RowFields, RowRejection, RowResult,
};
use crate::importer::transform;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductColumn {
    Code,
    Name,
    SalePrice,
    UnitOfMeasure,
    RequiresInventory,
    Active,
    Category,
    Subcategory,
    Brand,
    Model,
    Description,
    UnitCost,
    SuggestedPrice,
    WeightKg,
    VolumeM3,
    Barcode,
    QrCode,
    IsService,
}

impl ColumnSet for ProductColumn {
    const ALL: &'static [Self] = &[
        ProductColumn::Code,
        ProductColumn::Name,
        ProductColumn::SalePrice,
        ProductColumn::UnitOfMeasure,
        ProductColumn::RequiresInventory,
        ProductColumn::Active,
        ProductColumn::Category,
        ProductColumn::Subcategory,
        ProductColumn::Brand,
        ProductColumn::Model,
        ProductColumn::Description,
        ProductColumn::UnitCost,
        ProductColumn::SuggestedPrice,
        ProductColumn::WeightKg,
        ProductColumn::VolumeM3,
        ProductColumn::Barcode,
        ProductColumn::QrCode,
        ProductColumn::IsService,
    ];

    fn header(&self) -> &'static str {
        match self {
            ProductColumn::Code => "codigo_producto",
            ProductColumn::Name => "nombre",
            ProductColumn::SalePrice => "precio_venta",
            ProductColumn::UnitOfMeasure => "unidad_medida",
            ProductColumn::RequiresInventory => "requiere_inventario",
            ProductColumn::Active => "activo",
            ProductColumn::Category => "categoria",
            ProductColumn::Subcategory => "subcategoria",
            ProductColumn::Brand => "marca",
            ProductColumn::Model => "modelo",
            ProductColumn::Description => "descripcion",
            ProductColumn::UnitCost => "costo_unitario",
            ProductColumn::SuggestedPrice => "precio_sugerido",
            ProductColumn::WeightKg => "peso_kg",
            ProductColumn::VolumeM3 => "volumen_m3",
            ProductColumn::Barcode => "codigo_barras",
            ProductColumn::QrCode => "codigo_qr",
            ProductColumn::IsService => "es_servicio",
        }
    }

    fn is_mandatory(&self) -> bool {
        matches!(
            self,
            ProductColumn::Code
                | ProductColumn::Name
                | ProductColumn::SalePrice
                | ProductColumn::UnitOfMeasure
                | ProductColumn::RequiresInventory
                | ProductColumn::Active
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// PRODUCTOS 读取器
pub struct ProductSheetReader;

impl SheetReader for ProductSheetReader {
    type Record = ProductRecord;

    fn sheet(&self) -> SheetKind {
        SheetKind::Products
    }

    fn read(&self, table: &SheetTable, ctx: &ReadContext<'_>) -> (Vec<ProductRecord>, ValidationOutcome) {
        // 编码 → 首次出现行号
        let mut seen: HashMap<String, u32> = HashMap::new();
        scan_rows::<ProductColumn, _, _>(table, |fields| read_row(fields, ctx, &mut seen))
    }
}

fn read_row(
    fields: &mut RowFields<'_, ProductColumn>,
    ctx: &ReadContext<'_>,
    seen: &mut HashMap<String, u32>,
) -> RowResult<ProductRecord> {
    use ProductColumn as C;

    // === 必填 ===
    if fields.cell(C::Code).is_blank() {
        return Err(fields
            .error(C::Code, t("row.required"))
            .with_suggestion(t("products.code_suggestion"))
            .into());
    }
    let name = fields.required_text(C::Name)?;
    fields.require_present(C::SalePrice)?;
    fields.require_present(C::UnitOfMeasure)?;

    // === 编码 ===
    let code = transform::normalize_code(&fields.cell(C::Code).raw_text());
    if !transform::is_valid_code(&code) {
        return Err(fields
            .error(C::Code, t("products.code_format"))
            .with_value(code)
            .with_suggestion(t("products.code_format_suggestion"))
            .into());
    }
    if let Some(first_row) = seen.get(&code) {
        return Err(fields
            .error(
                C::Code,
                t_with_args(
                    "products.duplicate_code",
                    &[("code", &code), ("row", &first_row.to_string())],
                ),
            )
            .with_value(code)
            .with_suggestion(t("products.duplicate_code_suggestion"))
            .into());
    }
    seen.insert(code.clone(), fields.row_number());

    // === 价格 ===
    let unit_price = fields.required_currency(C::SalePrice)?;
    if unit_price <= 0.0 {
        return Err(fields
            .error(C::SalePrice, t("row.must_be_positive"))
            .with_value(unit_price.to_string())
            .with_suggestion(t("products.price_suggestion"))
            .into());
    }

    let unit_cost = fields.optional_currency(C::UnitCost);
    if let Some(cost) = unit_cost {
        if cost > unit_price {
            return Err(fields
                .error(C::UnitCost, t("products.cost_exceeds_price"))
                .with_value(format!("{} (precio: {})", cost, unit_price))
                .with_suggestion(t("products.cost_exceeds_price_suggestion"))
                .into());
        }
    }

    // === 计量单位 ===
    let unit_of_measure = fields.cell(C::UnitOfMeasure).raw_text().trim().to_lowercase();
    if !UNITS_OF_MEASURE.contains(&unit_of_measure.as_str()) {
        return Err(RowRejection::Invalid(
            fields
                .error(C::UnitOfMeasure, one_of_message(&UNITS_OF_MEASURE))
                .with_value(unit_of_measure),
        ));
    }

    // === 标志 ===
    let requires_inventory = fields.flag(C::RequiresInventory);
    let active = fields.flag(C::Active);
    let is_service = fields.flag(C::IsService);
    if is_service && requires_inventory {
        return Err(fields
            .error(C::IsService, t("products.service_requires_inventory"))
            .with_suggestion(t("products.service_suggestion"))
            .into());
    }

    // === 分类（仅告警） ===
    let category = fields.optional_text(C::Category);
    if let Some(cat) = &category {
        if !PRODUCT_CATEGORIES.contains(&cat.to_lowercase().as_str()) {
            let warning = t_with_args(
                "products.unknown_category",
                &[("row", &fields.row_number().to_string()), ("value", cat)],
            );
            fields.warn(warning);
        }
    }

    Ok(ProductRecord {
        tenant_id: ctx.tenant_id,
        source_row: fields.row_number(),
        code,
        name,
        description: fields.optional_text(C::Description),
        category,
        subcategory: fields.optional_text(C::Subcategory),
        brand: fields.optional_text(C::Brand),
        model: fields.optional_text(C::Model),
        unit_price,
        unit_cost,
        suggested_price: fields.optional_currency(C::SuggestedPrice),
        unit_of_measure,
        weight_kg: fields.optional_decimal(C::WeightKg),
        volume_m3: fields.optional_decimal(C::VolumeM3),
        barcode: fields.optional_text(C::Barcode),
        qr_code: fields.optional_text(C::QrCode),
        is_service,
        requires_inventory,
        active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::sheet_reader::test_support::{codes, context};

    const HEADER: &[&str] = &[
        "codigo_producto",
        "nombre",
        "precio_venta",
        "unidad_medida",
        "requiere_inventario",
        "activo",
        "costo_unitario",
        "categoria",
        "es_servicio",
    ];

    fn read(rows: &[&[&str]]) -> (Vec<ProductRecord>, ValidationOutcome) {
        let mut all: Vec<&[&str]> = vec![HEADER];
        all.extend_from_slice(rows);
        let table = SheetTable::from_text_rows("PRODUCTOS", &all);
        let (upload, persisted) = (codes(&[]), codes(&[]));
        ProductSheetReader.read(&table, &context(&upload, &persisted))
    }

    #[test]
    fn test_valid_rows_produce_records() {
        let (records, outcome) = read(&[
            &["prod-001", "Camisa  polo", "89500", "Unidad", "SI", "VERDADERO", "50.000,00", "casual", ""],
            &["PROD-002", "Servicio bordado", "15000", "unidad", "NO", "1", "", "", "SI"],
        ]);

        assert!(outcome.is_success(), "{:?}", outcome.errors);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "PROD-001");
        assert_eq!(records[0].name, "Camisa polo");
        assert_eq!(records[0].unit_price, 89_500.0);
        assert_eq!(records[0].unit_cost, Some(50_000.0));
        assert_eq!(records[0].source_row, 2);
        assert!(records[1].is_service);
        assert!(!records[1].requires_inventory);
    }

    #[test]
    fn test_duplicate_code_reports_second_occurrence() {
        let (records, outcome) = read(&[
            &["PROD-001", "A", "100", "unidad", "SI", "SI", "", "", ""],
            &["PROD-002", "B", "100", "unidad", "SI", "SI", "", "", ""],
            &["prod-001", "C", "100", "unidad", "SI", "SI", "", "", ""],
        ]);

        assert!(!outcome.is_success());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 4);
        assert_eq!(outcome.errors[0].column, "codigo_producto");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_code_format_rejected() {
        let (_, outcome) = read(&[&["1PROD", "A", "100", "unidad", "SI", "SI", "", "", ""]]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].column, "codigo_producto");
        assert_eq!(outcome.errors[0].offending_value.as_deref(), Some("1PROD"));
    }

    #[test]
    fn test_price_and_cost_rules() {
        let (_, outcome) = read(&[
            &["PROD-001", "A", "0", "unidad", "SI", "SI", "", "", ""],
            &["PROD-002", "B", "100", "unidad", "SI", "SI", "150", "", ""],
            &["PROD-003", "C", "cien", "unidad", "SI", "SI", "", "", ""],
        ]);
        let columns: Vec<(&str, u32)> = outcome
            .errors
            .iter()
            .map(|e| (e.column.as_str(), e.row))
            .collect();
        assert_eq!(
            columns,
            vec![("precio_venta", 2), ("costo_unitario", 3), ("precio_venta", 4)]
        );
        assert_eq!(outcome.errors[2].expected_type.as_deref(), Some("decimal"));
    }

    #[test]
    fn test_blank_mandatory_field_skips_row() {
        let (records, outcome) = read(&[&["PROD-001", "", "100", "unidad", "SI", "SI", "", "", ""]]);
        assert!(records.is_empty());
        assert_eq!(outcome.errors[0].column, "nombre");
    }

    #[test]
    fn test_unit_service_and_category_rules() {
        let (records, outcome) = read(&[
            &["PROD-001", "A", "100", "galon", "SI", "SI", "", "", ""],
            &["PROD-002", "B", "100", "kg", "SI", "SI", "", "", "SI"],
            &["PROD-003", "C", "100", "kg", "SI", "SI", "", "Electrodomesticos", ""],
        ]);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.errors[0].column, "unidad_medida");
        assert_eq!(outcome.errors[1].column, "es_servicio");
        // 未知分类仅告警，记录仍保留
        assert_eq!(records.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Electrodomesticos"));
    }

    #[test]
    fn test_overflowing_price_becomes_generic_row_error() {
        let huge = "9".repeat(400);
        let (records, outcome) = read(&[&["PROD-001", "A", huge.as_str(), "unidad", "SI", "SI", "", "", ""]]);
        assert!(records.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 2);
        assert_eq!(outcome.errors[0].column, "PRODUCTOS");
    }
}
