// ==========================================
// Analitik ETL - 工作表记录 DTO
// ==========================================
// 职责: 读取阶段产出、落库阶段消费的瞬时记录
// 说明: 每条记录携带租户 ID 与来源行号（用于错误定位），
//       不具备独立生命周期，同一次运行内创建并丢弃
// ==========================================

use crate::domain::types::{EntryKind, PaymentMethod};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ProductRecord - 产品
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub tenant_id: Uuid,
    pub source_row: u32,

    // ===== 业务键 =====
    pub code: String, // 已规范化（大写、无空白）

    // ===== 基础信息 =====
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,

    // ===== 价格 =====
    pub unit_price: f64,              // 销售价 > 0
    pub unit_cost: Option<f64>,       // 成本 <= 销售价
    pub suggested_price: Option<f64>, // 建议零售价

    // ===== 物理属性 =====
    pub unit_of_measure: String,
    pub weight_kg: Option<f64>,
    pub volume_m3: Option<f64>,
    pub barcode: Option<String>,
    pub qr_code: Option<String>,

    // ===== 标志 =====
    pub is_service: bool,
    pub requires_inventory: bool,
    pub active: bool,
}

impl ProductRecord {
    /// 毛利率 (price - cost) / cost * 100
    ///
    /// 成本缺失或为 0 时不计算
    pub fn margin_pct(&self) -> Option<f64> {
        match self.unit_cost {
            Some(cost) if cost != 0.0 => {
                let margin = (self.unit_price - cost) / cost * 100.0;
                Some((margin * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }
}

// ==========================================
// InventoryRecord - 库存快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub tenant_id: Uuid,
    pub source_row: u32,

    pub product_code: String,
    pub available_qty: i64, // >= 0

    pub reserved_qty: Option<i64>,
    pub in_transit_qty: Option<i64>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub reorder_point: Option<i64>,

    // ===== 库位 =====
    pub location: Option<String>,
    pub aisle: Option<String>,
    pub shelf: Option<String>,
    pub level: Option<String>,

    // ===== 批次/效期 =====
    pub current_lot: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub expiry_alert_days: Option<i64>,
}

// ==========================================
// SaleRecord - 销售单头
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub tenant_id: Uuid,
    pub source_row: u32,

    pub order_number: String, // 已规范化
    pub invoice_number: Option<String>,
    pub sale_date: NaiveDate, // 不允许未来日期

    // ===== 客户 =====
    pub customer_name: String,
    pub customer_document: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub city: Option<String>,

    // ===== 金额 =====
    pub total_amount: f64,
    pub subtotal_amount: Option<f64>,
    pub discount_amount: Option<f64>,
    pub tax_amount: Option<f64>,

    // ===== 支付/渠道 =====
    pub payment_method: PaymentMethod,
    pub payment_status: Option<String>,
    pub seller: Option<String>,
    pub sales_channel: Option<String>,
    pub state: Option<String>,
    pub notes: Option<String>,

    pub line_items: Vec<SaleLineItem>,
}

// ==========================================
// SaleLineItem - 销售明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLineItem {
    pub product_code: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount_pct: f64,
    pub subtotal: f64,
}

impl SaleLineItem {
    pub fn new(product_code: String, quantity: f64, unit_price: f64, discount_pct: f64) -> Self {
        let gross = quantity * unit_price * (1.0 - discount_pct / 100.0);
        Self {
            product_code,
            quantity,
            unit_price,
            discount_pct,
            subtotal: (gross * 100.0).round() / 100.0,
        }
    }
}

// ==========================================
// FinancialRecord - 财务分录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialRecord {
    pub tenant_id: Uuid,
    pub source_row: u32,

    pub entry_kind: EntryKind,
    pub category: String,
    pub subcategory: Option<String>,
    pub concept: String,
    pub amount: f64, // > 0
    pub currency: Option<String>,

    pub registered_on: NaiveDate,
    pub paid_on: Option<NaiveDate>,
    pub voucher_number: Option<String>,
    pub beneficiary: Option<String>,
    pub notes: Option<String>,
}

impl FinancialRecord {
    /// 汇总期间（年, 月），由登记日期派生
    pub fn period(&self) -> (i32, u32) {
        (self.registered_on.year(), self.registered_on.month())
    }
}

// ==========================================
// ValidatedBatch - 四张表的已校验记录
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedBatch {
    pub products: Vec<ProductRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub sales: Vec<SaleRecord>,
    pub financials: Vec<FinancialRecord>,
}

impl ValidatedBatch {
    pub fn record_count(&self) -> usize {
        self.products.len() + self.inventory.len() + self.sales.len() + self.financials.len()
    }
}

// ==========================================
// LoadDefaults - 落库缺省值（来自配置）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDefaults {
    pub currency: String,
    pub expiry_alert_days: i64,
    pub payment_status: String,
    pub sale_state: String,
}

impl Default for LoadDefaults {
    fn default() -> Self {
        Self {
            currency: "COP".to_string(),
            expiry_alert_days: 30,
            payment_status: "pendiente".to_string(),
            sale_state: "completado".to_string(),
        }
    }
}
