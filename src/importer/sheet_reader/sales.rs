// ==========================================
// Analitik ETL - VENTAS 读取器
// ==========================================
// 规则: 订单号规范化且表内唯一 → 销售日期可解析且不在未来
//      → 支付方式在允许列表内 → 金额非负
// 明细: 行内带 codigo_producto 时生成一条销售明细，
//      编码须存在于本次上传或租户已有产品中
// ==========================================

use crate::domain::records::{SaleLineItem, SaleRecord};
use crate::domain::types::{PaymentMethod, SheetKind, SALES_CHANNELS};
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
pub enum SaleColumn {
    OrderNumber,
    SaleDate,
    CustomerName,
    TotalAmount,
    PaymentMethod,
    InvoiceNumber,
    CustomerDocument,
    CustomerPhone,
    CustomerEmail,
    CustomerAddress,
    City,
    Subtotal,
    Discount,
    Taxes,
    PaymentStatus,
    Seller,
    SalesChannel,
    State,
    Notes,
    // ===== 明细 =====
    ProductCode,
    Quantity,
    UnitPrice,
    DiscountPct,
}

impl ColumnSet for SaleColumn {
    const ALL: &'static [Self] = &[
        SaleColumn::OrderNumber,
        SaleColumn::SaleDate,
        SaleColumn::CustomerName,
        SaleColumn::TotalAmount,
        SaleColumn::PaymentMethod,
        SaleColumn::InvoiceNumber,
        SaleColumn::CustomerDocument,
        SaleColumn::CustomerPhone,
        SaleColumn::CustomerEmail,
        SaleColumn::CustomerAddress,
        SaleColumn::City,
        SaleColumn::Subtotal,
        SaleColumn::Discount,
        SaleColumn::Taxes,
        SaleColumn::PaymentStatus,
        SaleColumn::Seller,
        SaleColumn::SalesChannel,
        SaleColumn::State,
        SaleColumn::Notes,
        SaleColumn::ProductCode,
        SaleColumn::Quantity,
        SaleColumn::UnitPrice,
        SaleColumn::DiscountPct,
    ];

    fn header(&self) -> &'static str {
        match self {
            SaleColumn::OrderNumber => "numero_orden",
            SaleColumn::SaleDate => "fecha_venta",
            SaleColumn::CustomerName => "cliente_nombre",
            SaleColumn::TotalAmount => "monto_total",
            SaleColumn::PaymentMethod => "metodo_pago",
            SaleColumn::InvoiceNumber => "numero_factura",
            SaleColumn::CustomerDocument => "cliente_documento",
            SaleColumn::CustomerPhone => "cliente_telefono",
            SaleColumn::CustomerEmail => "cliente_email",
            SaleColumn::CustomerAddress => "cliente_direccion",
            SaleColumn::City => "ciudad",
            SaleColumn::Subtotal => "monto_subtotal",
            SaleColumn::Discount => "monto_descuento",
            SaleColumn::Taxes => "monto_impuestos",
            SaleColumn::PaymentStatus => "estado_pago",
            SaleColumn::Seller => "vendedor",
            SaleColumn::SalesChannel => "canal_venta",
            SaleColumn::State => "estado",
            SaleColumn::Notes => "notas",
            SaleColumn::ProductCode => "codigo_producto",
            SaleColumn::Quantity => "cantidad",
            SaleColumn::UnitPrice => "precio_unitario",
            SaleColumn::DiscountPct => "descuento_porcentaje",
        }
    }

    fn is_mandatory(&self) -> bool {
        matches!(
            self,
            SaleColumn::OrderNumber
                | SaleColumn::SaleDate
                | SaleColumn::CustomerName
                | SaleColumn::TotalAmount
                | SaleColumn::PaymentMethod
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// VENTAS 读取器
pub struct SalesSheetReader;

impl SheetReader for SalesSheetReader {
    type Record = SaleRecord;

    fn sheet(&self) -> SheetKind {
        SheetKind::Sales
    }

    fn read(&self, table: &SheetTable, ctx: &ReadContext<'_>) -> (Vec<SaleRecord>, ValidationOutcome) {
        let mut seen: HashMap<String, u32> = HashMap::new();
        scan_rows::<SaleColumn, _, _>(table, |fields| read_row(fields, ctx, &mut seen))
    }
}

fn read_row(
    fields: &mut RowFields<'_, SaleColumn>,
    ctx: &ReadContext<'_>,
    seen: &mut HashMap<String, u32>,
) -> RowResult<SaleRecord> {
    use SaleColumn as C;

    for column in [C::OrderNumber, C::SaleDate, C::CustomerName, C::TotalAmount, C::PaymentMethod] {
        fields.require_present(column)?;
    }

    // === 订单号 ===
    let order_number = transform::normalize_code(&fields.cell(C::OrderNumber).raw_text());
    if let Some(first_row) = seen.get(&order_number) {
        return Err(fields
            .error(
                C::OrderNumber,
                t_with_args(
                    "sales.duplicate_order",
                    &[("order", &order_number), ("row", &first_row.to_string())],
                ),
            )
            .with_value(order_number)
            .with_suggestion(t("sales.duplicate_order_suggestion"))
            .into());
    }
    seen.insert(order_number.clone(), fields.row_number());

    // === 日期 ===
    let sale_date = fields.required_date(C::SaleDate)?;
    if sale_date > ctx.today {
        return Err(fields
            .error(C::SaleDate, t("row.future_date"))
            .with_value(sale_date.to_string())
            .into());
    }

    // === 支付方式 ===
    let raw_method = fields.cell(C::PaymentMethod).raw_text();
    let Some(payment_method) = PaymentMethod::parse(&raw_method) else {
        return Err(RowRejection::Invalid(
            fields
                .error(C::PaymentMethod, one_of_message(&PaymentMethod::ALLOWED))
                .with_value(raw_method.trim()),
        ));
    };

    // === 金额 ===
    let total_amount = fields.required_currency(C::TotalAmount)?;
    if total_amount < 0.0 {
        return Err(fields
            .error(C::TotalAmount, t("row.must_not_be_negative"))
            .with_value(total_amount.to_string())
            .into());
    }

    let customer_name = fields.required_text(C::CustomerName)?;
    let row = fields.row_number().to_string();

    // === 可选: 邮箱 / 渠道（无效仅告警） ===
    let customer_email = match fields.optional_text(C::CustomerEmail) {
        Some(email) if !transform::is_valid_email(&email) => {
            fields.warn(t_with_args(
                "sales.invalid_email",
                &[("row", &row), ("value", &email)],
            ));
            None
        }
        other => other,
    };

    let sales_channel = match fields.optional_text(C::SalesChannel).map(|c| c.to_lowercase()) {
        Some(channel) if !SALES_CHANNELS.contains(&channel.as_str()) => {
            fields.warn(t_with_args(
                "sales.unknown_channel",
                &[("row", &row), ("value", &channel)],
            ));
            None
        }
        other => other,
    };

    let line_items = match read_line_item(fields, ctx, total_amount)? {
        Some(item) => vec![item],
        None => Vec::new(),
    };

    Ok(SaleRecord {
        tenant_id: ctx.tenant_id,
        source_row: fields.row_number(),
        order_number,
        invoice_number: fields.optional_text(C::InvoiceNumber),
        sale_date,
        customer_name,
        customer_document: fields.optional_text(C::CustomerDocument),
        customer_phone: fields.optional_text(C::CustomerPhone),
        customer_email,
        customer_address: fields.optional_text(C::CustomerAddress),
        city: fields.optional_text(C::City),
        total_amount,
        subtotal_amount: fields.optional_currency(C::Subtotal),
        discount_amount: fields.optional_currency(C::Discount),
        tax_amount: fields.optional_currency(C::Taxes),
        payment_method,
        payment_status: fields.optional_text(C::PaymentStatus).map(|s| s.to_lowercase()),
        seller: fields.optional_text(C::Seller),
        sales_channel,
        state: fields.optional_text(C::State).map(|s| s.to_lowercase()),
        notes: fields.optional_text(C::Notes),
        line_items,
    })
}

/// 行内明细（无 codigo_producto 时返回 None）
fn read_line_item(
    fields: &mut RowFields<'_, SaleColumn>,
    ctx: &ReadContext<'_>,
    total_amount: f64,
) -> RowResult<Option<SaleLineItem>> {
    use SaleColumn as C;

    let Some(raw_code) = fields.cell(C::ProductCode).as_text() else {
        return Ok(None);
    };
    let product_code = transform::normalize_code(&raw_code);
    if !ctx.upload_product_codes.contains(&product_code)
        && !ctx.persisted_product_codes.contains(&product_code)
    {
        return Err(fields
            .error(
                C::ProductCode,
                t_with_args("sales.unknown_product", &[("code", &product_code)]),
            )
            .with_value(product_code)
            .with_suggestion(t("sales.unknown_product_suggestion"))
            .into());
    }

    let quantity = fields.optional_decimal(C::Quantity).unwrap_or(1.0);
    if quantity <= 0.0 {
        return Err(fields
            .error(C::Quantity, t("row.must_be_positive"))
            .with_value(quantity.to_string())
            .into());
    }

    let unit_price = fields.optional_currency(C::UnitPrice).unwrap_or(total_amount);
    let discount_pct = fields.optional_decimal(C::DiscountPct).unwrap_or(0.0);
    if discount_pct < 0.0 {
        return Err(fields
            .error(C::DiscountPct, t("row.must_not_be_negative"))
            .with_value(discount_pct.to_string())
            .into());
    }

    Ok(Some(SaleLineItem::new(
        product_code,
        quantity,
        unit_price,
        discount_pct,
    )))
}
