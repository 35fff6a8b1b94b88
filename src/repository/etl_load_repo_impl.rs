// ==========================================
// Analitik ETL - 原子落库 Repository 实现
// ==========================================
// 职责: 使用 rusqlite 实现 EtlLoadRepository
// 事务: BEGIN IMMEDIATE（写锁在事务开始时获取），
//       同一 Transaction 依次传入四个子步骤，最后统一提交；
//       任一子步骤返回 Err → Transaction 被 drop → 自动回滚
// 策略:
// - 产品: 按 (tenant_id, code) upsert
// - 库存: 批量解析 code → product_id；无法解析 → 告警并跳过；已有 → 覆盖
// - 销售: 订单号已存在 → 告警并跳过；否则插入单头与明细
// - 财务: 总是插入，派生年/月
// ==========================================

use crate::domain::import_run::LoadSummary;
use crate::domain::records::{
    FinancialRecord, InventoryRecord, LoadDefaults, ProductRecord, SaleRecord, ValidatedBatch,
};
use crate::i18n::t_with_args;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::etl_load_repo::{EtlLoadRepository, LoadOutput, TenantRowCounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 库存新建时的默认状态
const DEFAULT_STOCK_STATE: &str = "normal";
/// 财务分录默认汇总周期
const DEFAULT_FINANCIAL_PERIOD: &str = "mensual";

// ==========================================
// EtlLoadRepositoryImpl
// ==========================================
pub struct EtlLoadRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl EtlLoadRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - conn: 共享数据库连接
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 产品 =====

    /// 在事务中 upsert 产品
    ///
    /// # 返回
    /// - (新增数, 更新数)
    fn upsert_products_tx(
        tx: &Transaction,
        tenant_id: &str,
        products: &[ProductRecord],
        now: DateTime<Utc>,
    ) -> RepositoryResult<(i64, i64)> {
        let mut find = tx.prepare("SELECT id FROM product WHERE tenant_id = ?1 AND code = ?2")?;
        let mut update = tx.prepare(
            r#"
            UPDATE product SET
                name = ?2, description = ?3, category = ?4, subcategory = ?5,
                brand = ?6, model = ?7, unit_price = ?8, unit_cost = ?9,
                suggested_price = ?10, margin_pct = ?11, unit_of_measure = ?12,
                weight_kg = ?13, volume_m3 = ?14, barcode = ?15, qr_code = ?16,
                is_service = ?17, requires_inventory = ?18, active = ?19,
                updated_at = ?20
            WHERE id = ?1
            "#,
        )?;
        let mut insert = tx.prepare(
            r#"
            INSERT INTO product (
                id, tenant_id, code, name, description, category, subcategory,
                brand, model, unit_price, unit_cost, suggested_price, margin_pct,
                unit_of_measure, weight_kg, volume_m3, barcode, qr_code,
                is_service, requires_inventory, active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?22
            )
            "#,
        )?;

        let (mut inserted, mut updated) = (0, 0);
        for p in products {
            let existing: Option<String> = find
                .query_row(params![tenant_id, p.code], |row| row.get(0))
                .optional()?;
            let margin = p.margin_pct();

            match existing {
                Some(id) => {
                    update.execute(params![
                        id,
                        p.name,
                        p.description,
                        p.category,
                        p.subcategory,
                        p.brand,
                        p.model,
                        p.unit_price,
                        p.unit_cost,
                        p.suggested_price,
                        margin,
                        p.unit_of_measure,
                        p.weight_kg,
                        p.volume_m3,
                        p.barcode,
                        p.qr_code,
                        p.is_service,
                        p.requires_inventory,
                        p.active,
                        now,
                    ])?;
                    updated += 1;
                }
                None => {
                    insert.execute(params![
                        Uuid::new_v4().to_string(),
                        tenant_id,
                        p.code,
                        p.name,
                        p.description,
                        p.category,
                        p.subcategory,
                        p.brand,
                        p.model,
                        p.unit_price,
                        p.unit_cost,
                        p.suggested_price,
                        margin,
                        p.unit_of_measure,
                        p.weight_kg,
                        p.volume_m3,
                        p.barcode,
                        p.qr_code,
                        p.is_service,
                        p.requires_inventory,
                        p.active,
                        now,
                    ])?;
                    inserted += 1;
                }
            }
        }

        Ok((inserted, updated))
    }

    /// 批量查询 code → product_id（事务内可见本次 upsert 的产品）
    fn product_ids_tx(tx: &Transaction, tenant_id: &str) -> RepositoryResult<HashMap<String, String>> {
        let mut stmt = tx.prepare("SELECT code, id FROM product WHERE tenant_id = ?1")?;
        let rows = stmt.query_map(params![tenant_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (code, id) = row?;
            map.insert(code, id);
        }
        Ok(map)
    }

    // ===== 库存 =====

    /// 在事务中写入库存快照
    ///
    /// # 返回
    /// - (新增数, 更新数, 跳过数)
    fn upsert_inventory_tx(
        tx: &Transaction,
        tenant_id: &str,
        records: &[InventoryRecord],
        product_ids: &HashMap<String, String>,
        defaults: &LoadDefaults,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> RepositoryResult<(i64, i64, i64)> {
        let mut find = tx.prepare("SELECT id FROM inventory WHERE product_id = ?1")?;
        let mut update = tx.prepare(
            r#"
            UPDATE inventory SET
                available_qty = ?2, reserved_qty = ?3, in_transit_qty = ?4,
                min_stock = ?5, max_stock = ?6, reorder_point = ?7,
                location = ?8, aisle = ?9, shelf = ?10, level = ?11,
                current_lot = ?12, expiry_date = ?13, expiry_alert_days = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
        )?;
        let mut insert = tx.prepare(
            r#"
            INSERT INTO inventory (
                id, tenant_id, product_id, available_qty, reserved_qty, in_transit_qty,
                min_stock, max_stock, reorder_point, location, aisle, shelf, level,
                current_lot, expiry_date, expiry_alert_days, stock_state,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?18
            )
            "#,
        )?;

        let (mut inserted, mut updated, mut skipped) = (0, 0, 0);
        for r in records {
            let Some(product_id) = product_ids.get(&r.product_code) else {
                warn!(row = r.source_row, code = %r.product_code, "库存行产品未解析，跳过");
                warnings.push(t_with_args(
                    "load.unresolved_product",
                    &[("row", &r.source_row.to_string()), ("code", &r.product_code)],
                ));
                skipped += 1;
                continue;
            };

            let reserved = r.reserved_qty.unwrap_or(0);
            let in_transit = r.in_transit_qty.unwrap_or(0);
            let min_stock = r.min_stock.unwrap_or(0);
            let alert_days = r.expiry_alert_days.unwrap_or(defaults.expiry_alert_days);

            let existing: Option<String> = find
                .query_row(params![product_id], |row| row.get(0))
                .optional()?;
            match existing {
                Some(id) => {
                    update.execute(params![
                        id,
                        r.available_qty,
                        reserved,
                        in_transit,
                        min_stock,
                        r.max_stock,
                        r.reorder_point,
                        r.location,
                        r.aisle,
                        r.shelf,
                        r.level,
                        r.current_lot,
                        r.expiry_date,
                        alert_days,
                        now,
                    ])?;
                    updated += 1;
                }
                None => {
                    insert.execute(params![
                        Uuid::new_v4().to_string(),
                        tenant_id,
                        product_id,
                        r.available_qty,
                        reserved,
                        in_transit,
                        min_stock,
                        r.max_stock,
                        r.reorder_point,
                        r.location,
                        r.aisle,
                        r.shelf,
                        r.level,
                        r.current_lot,
                        r.expiry_date,
                        alert_days,
                        DEFAULT_STOCK_STATE,
                        now,
                    ])?;
                    inserted += 1;
                }
            }
        }

        Ok((inserted, updated, skipped))
    }

    // ===== 销售 =====

    /// 在事务中插入销售单头与明细
    ///
    /// # 返回
    /// - (插入单数, 跳过单数, 插入明细数)
    fn insert_sales_tx(
        tx: &Transaction,
        tenant_id: &str,
        sales: &[SaleRecord],
        product_ids: &HashMap<String, String>,
        defaults: &LoadDefaults,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> RepositoryResult<(i64, i64, i64)> {
        let mut exists =
            tx.prepare("SELECT 1 FROM sale WHERE tenant_id = ?1 AND order_number = ?2")?;
        let mut insert = tx.prepare(
            r#"
            INSERT INTO sale (
                id, tenant_id, order_number, invoice_number, sale_date,
                customer_name, customer_document, customer_phone, customer_email,
                customer_address, city, total_amount, subtotal_amount,
                discount_amount, tax_amount, payment_method, payment_status,
                seller, sales_channel, state, notes, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
            )
            "#,
        )?;
        let mut insert_line = tx.prepare(
            r#"
            INSERT INTO sale_line_item (
                id, sale_id, product_id, quantity, unit_price, discount_pct, subtotal
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;

        let (mut inserted, mut skipped, mut lines) = (0, 0, 0);
        for s in sales {
            let already: Option<i64> = exists
                .query_row(params![tenant_id, s.order_number], |row| row.get(0))
                .optional()?;
            if already.is_some() {
                warn!(row = s.source_row, order = %s.order_number, "订单已存在，跳过");
                warnings.push(t_with_args(
                    "load.duplicate_order",
                    &[("row", &s.source_row.to_string()), ("order", &s.order_number)],
                ));
                skipped += 1;
                continue;
            }

            let sale_id = Uuid::new_v4().to_string();
            insert.execute(params![
                sale_id,
                tenant_id,
                s.order_number,
                s.invoice_number,
                s.sale_date,
                s.customer_name,
                s.customer_document,
                s.customer_phone,
                s.customer_email,
                s.customer_address,
                s.city,
                s.total_amount,
                s.subtotal_amount,
                s.discount_amount.unwrap_or(0.0),
                s.tax_amount.unwrap_or(0.0),
                s.payment_method.as_str(),
                s.payment_status.as_deref().unwrap_or(&defaults.payment_status),
                s.seller,
                s.sales_channel,
                s.state.as_deref().unwrap_or(&defaults.sale_state),
                s.notes,
                now,
            ])?;
            inserted += 1;

            for item in &s.line_items {
                let product_id = product_ids.get(&item.product_code).ok_or_else(|| {
                    RepositoryError::NotFound {
                        entity: "product".to_string(),
                        id: item.product_code.clone(),
                    }
                })?;
                insert_line.execute(params![
                    Uuid::new_v4().to_string(),
                    sale_id,
                    product_id,
                    item.quantity,
                    item.unit_price,
                    item.discount_pct,
                    item.subtotal,
                ])?;
                lines += 1;
            }
        }

        Ok((inserted, skipped, lines))
    }

    // ===== 财务 =====

    fn insert_financials_tx(
        tx: &Transaction,
        tenant_id: &str,
        entries: &[FinancialRecord],
        defaults: &LoadDefaults,
        now: DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let mut insert = tx.prepare(
            r#"
            INSERT INTO financial_entry (
                id, tenant_id, entry_kind, category, subcategory, concept, amount,
                currency, registered_on, paid_on, voucher_number, beneficiary, notes,
                period, year, month, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17
            )
            "#,
        )?;

        let mut inserted = 0;
        for f in entries {
            let (year, month) = f.period();
            insert.execute(params![
                Uuid::new_v4().to_string(),
                tenant_id,
                f.entry_kind.as_str(),
                f.category,
                f.subcategory,
                f.concept,
                f.amount,
                f.currency.as_deref().unwrap_or(&defaults.currency),
                f.registered_on,
                f.paid_on,
                f.voucher_number,
                f.beneficiary,
                f.notes,
                DEFAULT_FINANCIAL_PERIOD,
                year,
                month,
                now,
            ])?;
            inserted += 1;
        }
        Ok(inserted)
    }

    fn count_where_tenant(conn: &Connection, table: &str, tenant_id: &str) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE tenant_id = ?1", table);
        Ok(conn.query_row(&sql, params![tenant_id], |row| row.get(0))?)
    }
}

#[async_trait]
impl EtlLoadRepository for EtlLoadRepositoryImpl {
    async fn find_product_codes(&self, tenant_id: Uuid) -> RepositoryResult<HashSet<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT code FROM product WHERE tenant_id = ?1")?;
        let codes = stmt
            .query_map(params![tenant_id.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(codes)
    }

    #[instrument(skip(self, batch, defaults), fields(tenant_id = %tenant_id, records = batch.record_count()))]
    async fn load_atomically(
        &self,
        tenant_id: Uuid,
        batch: &ValidatedBatch,
        defaults: &LoadDefaults,
    ) -> RepositoryResult<LoadOutput> {
        let started = Instant::now();
        let tenant = tenant_id.to_string();
        let now = Utc::now();
        let mut warnings = Vec::new();

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (products_inserted, products_updated) =
            Self::upsert_products_tx(&tx, &tenant, &batch.products, now)?;
        debug!(products_inserted, products_updated, "产品写入完成");

        let product_ids = Self::product_ids_tx(&tx, &tenant)?;

        let (inventory_inserted, inventory_updated, inventory_skipped) = Self::upsert_inventory_tx(
            &tx,
            &tenant,
            &batch.inventory,
            &product_ids,
            defaults,
            now,
            &mut warnings,
        )?;
        debug!(inventory_inserted, inventory_updated, inventory_skipped, "库存写入完成");

        let (sales_inserted, sales_skipped, sale_lines_inserted) = Self::insert_sales_tx(
            &tx,
            &tenant,
            &batch.sales,
            &product_ids,
            defaults,
            now,
            &mut warnings,
        )?;
        debug!(sales_inserted, sales_skipped, sale_lines_inserted, "销售写入完成");

        let financials_inserted =
            Self::insert_financials_tx(&tx, &tenant, &batch.financials, defaults, now)?;

        tx.commit().map_err(RepositoryError::from_commit)?;

        let mut summary = LoadSummary {
            products_inserted,
            products_updated,
            inventory_inserted,
            inventory_updated,
            inventory_skipped,
            sales_inserted,
            sales_skipped,
            sale_lines_inserted,
            financials_inserted,
            total_warnings: warnings.len() as i64,
            duration_secs: started.elapsed().as_secs_f64(),
            ..Default::default()
        };
        summary.compute_records_processed();

        info!(
            records_processed = summary.records_processed,
            duration_secs = summary.duration_secs,
            "原子落库提交完成"
        );
        Ok(LoadOutput { summary, warnings })
    }

    async fn count_tenant_rows(&self, tenant_id: Uuid) -> RepositoryResult<TenantRowCounts> {
        let conn = self.get_conn()?;
        let tenant = tenant_id.to_string();
        let sale_lines: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sale_line_item l JOIN sale s ON s.id = l.sale_id WHERE s.tenant_id = ?1",
            params![tenant],
            |row| row.get(0),
        )?;
        Ok(TenantRowCounts {
            products: Self::count_where_tenant(&conn, "product", &tenant)?,
            inventory: Self::count_where_tenant(&conn, "inventory", &tenant)?,
            sales: Self::count_where_tenant(&conn, "sale", &tenant)?,
            sale_lines,
            financials: Self::count_where_tenant(&conn, "financial_entry", &tenant)?,
        })
    }
}
