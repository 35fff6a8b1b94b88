// ==========================================
// Analitik ETL - FINANCIEROS 读取器
// ==========================================
// 规则: 分录类型在允许列表内 → 金额 > 0 → 登记日期可解析
// 分类不在该类型的常用分类中时仅告警
// ==========================================

use crate::domain::records::FinancialRecord;
use crate::domain::types::{EntryKind, SheetKind};
use crate::domain::validation::ValidationOutcome;
use crate::i18n::{t, t_with_args};
use crate::importer::etl_importer_trait::SheetReader;
use crate::importer::sheet::{ColumnSet, SheetTable};
use crate::importer::sheet_reader::{
    one_of_message, scan_rows, ReadContext, RowFields, RowRejection, RowResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialColumn {
    EntryKind,
    Category,
    Subcategory,
    Concept,
    Amount,
    Currency,
    RegisteredOn,
    PaidOn,
    VoucherNumber,
    Beneficiary,
    Notes,
}

impl ColumnSet for FinancialColumn {
    const ALL: &'static [Self] = &[
        FinancialColumn::EntryKind,
        FinancialColumn::Category,
        FinancialColumn::Subcategory,
        FinancialColumn::Concept,
        FinancialColumn::Amount,
        FinancialColumn::Currency,
        FinancialColumn::RegisteredOn,
        FinancialColumn::PaidOn,
        FinancialColumn::VoucherNumber,
        FinancialColumn::Beneficiary,
        FinancialColumn::Notes,
    ];

    fn header(&self) -> &'static str {
        match self {
            FinancialColumn::EntryKind => "tipo_dato",
            FinancialColumn::Category => "categoria",
            FinancialColumn::Subcategory => "subcategoria",
            FinancialColumn::Concept => "concepto",
            FinancialColumn::Amount => "monto",
            FinancialColumn::Currency => "moneda",
            FinancialColumn::RegisteredOn => "fecha_registro",
            FinancialColumn::PaidOn => "fecha_pago",
            FinancialColumn::VoucherNumber => "numero_comprobante",
            FinancialColumn::Beneficiary => "beneficiario",
            FinancialColumn::Notes => "observaciones",
        }
    }

    fn is_mandatory(&self) -> bool {
        matches!(
            self,
            FinancialColumn::EntryKind
                | FinancialColumn::Category
                | FinancialColumn::Concept
                | FinancialColumn::Amount
                | FinancialColumn::RegisteredOn
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// FINANCIEROS 读取器
pub struct FinancialSheetReader;

impl SheetReader for FinancialSheetReader {
    type Record = FinancialRecord;

    fn sheet(&self) -> SheetKind {
        SheetKind::Financials
    }

    fn read(
        &self,
        table: &SheetTable,
        ctx: &ReadContext<'_>,
    ) -> (Vec<FinancialRecord>, ValidationOutcome) {
        scan_rows::<FinancialColumn, _, _>(table, |fields| read_row(fields, ctx))
    }
}

fn read_row(
    fields: &mut RowFields<'_, FinancialColumn>,
    ctx: &ReadContext<'_>,
) -> RowResult<FinancialRecord> {
    use FinancialColumn as C;

    for column in [C::EntryKind, C::Category, C::Concept, C::Amount, C::RegisteredOn] {
        fields.require_present(column)?;
    }

    let raw_kind = fields.cell(C::EntryKind).raw_text();
    let Some(entry_kind) = EntryKind::parse(&raw_kind) else {
        return Err(RowRejection::Invalid(
            fields
                .error(C::EntryKind, one_of_message(&EntryKind::ALLOWED))
                .with_value(raw_kind.trim()),
        ));
    };

    let amount = fields.required_currency(C::Amount)?;
    if amount <= 0.0 {
        return Err(fields
            .error(C::Amount, t("row.must_be_positive"))
            .with_value(amount.to_string())
            .into());
    }

    let registered_on = fields.required_date(C::RegisteredOn)?;
    let category = fields.required_text(C::Category)?;
    let concept = fields.required_text(C::Concept)?;

    if !entry_kind
        .known_categories()
        .contains(&category.to_lowercase().as_str())
    {
        let row = fields.row_number().to_string();
        fields.warn(t_with_args(
            "financials.unknown_category",
            &[
                ("row", &row),
                ("value", &category),
                ("kind", entry_kind.as_str()),
            ],
        ));
    }

    Ok(FinancialRecord {
        tenant_id: ctx.tenant_id,
        source_row: fields.row_number(),
        entry_kind,
        category,
        subcategory: fields.optional_text(C::Subcategory),
        concept,
        amount,
        currency: fields.optional_text(C::Currency).map(|c| c.to_uppercase()),
        registered_on,
        paid_on: fields.optional_date(C::PaidOn),
        voucher_number: fields.optional_text(C::VoucherNumber),
        beneficiary: fields.optional_text(C::Beneficiary),
        notes: fields.optional_text(C::Notes),
    })
}
