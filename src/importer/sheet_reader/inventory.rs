// ==========================================
// Analitik ETL - INVENTARIO 读取器
// ==========================================
// 规则: 产品编码必须出现在本次上传的 PRODUCTOS 中；可用数量 >= 0
// ==========================================

use crate::domain::records::InventoryRecord;
use crate::domain::types::SheetKind;
use crate::domain::validation::ValidationOutcome;
use crate::i18n::{t, t_with_args};
use crate::importer::etl_importer_trait::SheetReader;
use crate::importer::sheet::{ColumnSet, SheetTable};
use crate::importer::sheet_reader::{scan_rows, ReadContext, RowFields, RowResult};
use crate::importer::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryColumn {
    ProductCode,
    Available,
    Reserved,
    InTransit,
    MinStock,
    MaxStock,
    ReorderPoint,
    Location,
    Aisle,
    Shelf,
    Level,
    CurrentLot,
    ExpiryDate,
    ExpiryAlertDays,
}

impl ColumnSet for InventoryColumn {
    const ALL: &'static [Self] = &[
        InventoryColumn::ProductCode,
        InventoryColumn::Available,
        InventoryColumn::Reserved,
        InventoryColumn::InTransit,
        InventoryColumn::MinStock,
        InventoryColumn::MaxStock,
        InventoryColumn::ReorderPoint,
        InventoryColumn::Location,
        InventoryColumn::Aisle,
        InventoryColumn::Shelf,
        InventoryColumn::Level,
        InventoryColumn::CurrentLot,
        InventoryColumn::ExpiryDate,
        InventoryColumn::ExpiryAlertDays,
    ];

    fn header(&self) -> &'static str {
        match self {
            InventoryColumn::ProductCode => "codigo_producto",
            InventoryColumn::Available => "cantidad_disponible",
            InventoryColumn::Reserved => "cantidad_reservada",
            InventoryColumn::InTransit => "cantidad_en_transito",
            InventoryColumn::MinStock => "stock_minimo",
            InventoryColumn::MaxStock => "stock_maximo",
            InventoryColumn::ReorderPoint => "punto_reorden",
            InventoryColumn::Location => "ubicacion",
            InventoryColumn::Aisle => "pasillo",
            InventoryColumn::Shelf => "estante",
            InventoryColumn::Level => "nivel",
            InventoryColumn::CurrentLot => "lote_actual",
            InventoryColumn::ExpiryDate => "fecha_vencimiento",
            InventoryColumn::ExpiryAlertDays => "dias_alerta_vencimiento",
        }
    }

    fn is_mandatory(&self) -> bool {
        matches!(self, InventoryColumn::ProductCode | InventoryColumn::Available)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// INVENTARIO 读取器
pub struct InventorySheetReader;

impl SheetReader for InventorySheetReader {
    type Record = InventoryRecord;

    fn sheet(&self) -> SheetKind {
        SheetKind::Inventory
    }

    fn read(&self, table: &SheetTable, ctx: &ReadContext<'_>) -> (Vec<InventoryRecord>, ValidationOutcome) {
        scan_rows::<InventoryColumn, _, _>(table, |fields| read_row(fields, ctx))
    }
}

fn read_row(
    fields: &mut RowFields<'_, InventoryColumn>,
    ctx: &ReadContext<'_>,
) -> RowResult<InventoryRecord> {
    use InventoryColumn as C;

    fields.require_present(C::ProductCode)?;
    fields.require_present(C::Available)?;

    let product_code = transform::normalize_code(&fields.cell(C::ProductCode).raw_text());
    if !ctx.upload_product_codes.contains(&product_code) {
        return Err(fields
            .error(
                C::ProductCode,
                t_with_args("inventory.unknown_product", &[("code", &product_code)]),
            )
            .with_value(product_code)
            .with_suggestion(t("inventory.unknown_product_suggestion"))
            .into());
    }

    let available_qty = fields.required_integer(C::Available)?;
    if available_qty < 0 {
        return Err(fields
            .error(C::Available, t("row.must_not_be_negative"))
            .with_value(available_qty.to_string())
            .into());
    }

    Ok(InventoryRecord {
        tenant_id: ctx.tenant_id,
        source_row: fields.row_number(),
        product_code,
        available_qty,
        reserved_qty: fields.optional_integer(C::Reserved),
        in_transit_qty: fields.optional_integer(C::InTransit),
        min_stock: fields.optional_integer(C::MinStock),
        max_stock: fields.optional_integer(C::MaxStock),
        reorder_point: fields.optional_integer(C::ReorderPoint),
        location: fields.optional_text(C::Location),
        aisle: fields.optional_text(C::Aisle),
        shelf: fields.optional_text(C::Shelf),
        level: fields.optional_text(C::Level),
        current_lot: fields.optional_text(C::CurrentLot),
        expiry_date: fields.optional_date(C::ExpiryDate),
        expiry_alert_days: fields.optional_integer(C::ExpiryAlertDays),
    })
}
