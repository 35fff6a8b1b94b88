// ==========================================
// Analitik ETL - 领域类型定义
// ==========================================
// 职责: 导入运行状态机、ETL 阶段、工作表与枚举型业务字段
// 序列化格式: 与数据库存储值一致（小写西语标识）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入运行状态 (Run State)
// ==========================================
// 终态: Completed / Failed / Cancelled
// Cancelled 仅能由外部操作者触发，管道自身不会进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    #[serde(rename = "en_proceso")]
    InProgress, // 处理中
    #[serde(rename = "completado")]
    Completed, // 已完成
    #[serde(rename = "fallido")]
    Failed, // 失败
    #[serde(rename = "cancelado")]
    Cancelled, // 已取消
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::InProgress => "en_proceso",
            RunState::Completed => "completado",
            RunState::Failed => "fallido",
            RunState::Cancelled => "cancelado",
        }
    }

    /// 是否为终态（终态运行不再接受任何写入）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::InProgress)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en_proceso" => Ok(RunState::InProgress),
            "completado" => Ok(RunState::Completed),
            "fallido" => Ok(RunState::Failed),
            "cancelado" => Ok(RunState::Cancelled),
            other => Err(format!("未知运行状态: {}", other)),
        }
    }
}

// ==========================================
// ETL 阶段 (Phase)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EtlPhase {
    #[serde(rename = "extraccion")]
    Extraction, // 提取（文件/结构校验）
    #[serde(rename = "transformacion")]
    Transformation, // 转换（逐行校验）
    #[serde(rename = "carga")]
    Load, // 落库
    #[serde(rename = "completado")]
    Completed, // 完成
    #[serde(rename = "error")]
    Error, // 非分类错误（超时/意外异常）
}

impl EtlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EtlPhase::Extraction => "extraccion",
            EtlPhase::Transformation => "transformacion",
            EtlPhase::Load => "carga",
            EtlPhase::Completed => "completado",
            EtlPhase::Error => "error",
        }
    }
}

impl fmt::Display for EtlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EtlPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extraccion" => Ok(EtlPhase::Extraction),
            "transformacion" => Ok(EtlPhase::Transformation),
            "carga" => Ok(EtlPhase::Load),
            "completado" => Ok(EtlPhase::Completed),
            "error" => Ok(EtlPhase::Error),
            other => Err(format!("未知 ETL 阶段: {}", other)),
        }
    }
}

// ==========================================
// 工作表 (Sheet Kind)
// ==========================================
// 固定契约: 四张表，名称大小写不敏感
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetKind {
    Products,
    Inventory,
    Sales,
    Financials,
}

impl SheetKind {
    /// 读取顺序: 产品 → 库存 → 销售 → 财务
    pub const ALL: [SheetKind; 4] = [
        SheetKind::Products,
        SheetKind::Inventory,
        SheetKind::Sales,
        SheetKind::Financials,
    ];

    pub fn sheet_name(&self) -> &'static str {
        match self {
            SheetKind::Products => "PRODUCTOS",
            SheetKind::Inventory => "INVENTARIO",
            SheetKind::Sales => "VENTAS",
            SheetKind::Financials => "FINANCIEROS",
        }
    }

    /// 按名称匹配（忽略大小写与首尾空白）
    pub fn from_sheet_name(name: &str) -> Option<SheetKind> {
        let name = name.trim();
        SheetKind::ALL
            .into_iter()
            .find(|kind| kind.sheet_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sheet_name())
    }
}

// ==========================================
// 财务数据类型 (Entry Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Ingreso,   // 收入
    Gasto,     // 费用
    Costo,     // 成本
    Inversion, // 投资
}

impl EntryKind {
    pub const ALLOWED: [&'static str; 4] = ["ingreso", "gasto", "costo", "inversion"];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Ingreso => "ingreso",
            EntryKind::Gasto => "gasto",
            EntryKind::Costo => "costo",
            EntryKind::Inversion => "inversion",
        }
    }

    /// 解析（忽略大小写，兼容 inversión）
    pub fn parse(raw: &str) -> Option<EntryKind> {
        match raw.trim().to_lowercase().as_str() {
            "ingreso" => Some(EntryKind::Ingreso),
            "gasto" => Some(EntryKind::Gasto),
            "costo" => Some(EntryKind::Costo),
            "inversion" | "inversión" => Some(EntryKind::Inversion),
            _ => None,
        }
    }

    /// 该类型下已知的分类（未知分类仅告警）
    pub fn known_categories(&self) -> &'static [&'static str] {
        match self {
            EntryKind::Ingreso => &[
                "ventas",
                "servicios",
                "retorno inversión",
                "intereses",
                "otros ingresos",
            ],
            EntryKind::Gasto => &[
                "salarios",
                "servicios",
                "transporte",
                "marketing",
                "comisiones",
                "otros gastos",
            ],
            EntryKind::Costo => &[
                "costo bienes vendidos",
                "materia prima",
                "mano obra directa",
                "otros costos",
            ],
            EntryKind::Inversion => &["activos fijos", "mejoras", "tecnología", "otros"],
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 支付方式 (Payment Method)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Efectivo,
    Tarjeta,
    Transferencia,
    Credito,
    Cheque,
}

impl PaymentMethod {
    pub const ALLOWED: [&'static str; 5] =
        ["efectivo", "tarjeta", "transferencia", "credito", "cheque"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Efectivo => "efectivo",
            PaymentMethod::Tarjeta => "tarjeta",
            PaymentMethod::Transferencia => "transferencia",
            PaymentMethod::Credito => "credito",
            PaymentMethod::Cheque => "cheque",
        }
    }

    pub fn parse(raw: &str) -> Option<PaymentMethod> {
        match raw.trim().to_lowercase().as_str() {
            "efectivo" => Some(PaymentMethod::Efectivo),
            "tarjeta" => Some(PaymentMethod::Tarjeta),
            "transferencia" => Some(PaymentMethod::Transferencia),
            "credito" | "crédito" => Some(PaymentMethod::Credito),
            "cheque" => Some(PaymentMethod::Cheque),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== 固定允许列表 =====

/// 计量单位
pub const UNITS_OF_MEASURE: [&str; 9] = [
    "unidad",
    "kg",
    "gramo",
    "metro",
    "centímetro",
    "litro",
    "mililitro",
    "caja",
    "docena",
];

/// 产品分类（未知分类仅告警）
pub const PRODUCT_CATEGORIES: [&str; 7] = [
    "uniformes",
    "casual",
    "formal",
    "deportivo",
    "accesorios",
    "calzado",
    "otro",
];

/// 销售渠道（未知渠道仅告警）
pub const SALES_CHANNELS: [&str; 5] = ["presencial", "online", "telefonico", "distribuidor", "otro"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_terminal() {
        assert!(!RunState::InProgress.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[test]
    fn test_run_state_round_trip_str() {
        for state in [
            RunState::InProgress,
            RunState::Completed,
            RunState::Failed,
            RunState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<RunState>().unwrap(), state);
        }
        assert!("running".parse::<RunState>().is_err());
    }

    #[test]
    fn test_sheet_kind_case_insensitive() {
        assert_eq!(SheetKind::from_sheet_name("productos"), Some(SheetKind::Products));
        assert_eq!(SheetKind::from_sheet_name(" Ventas "), Some(SheetKind::Sales));
        assert_eq!(SheetKind::from_sheet_name("CLIENTES"), None);
    }

    #[test]
    fn test_entry_kind_parse() {
        assert_eq!(EntryKind::parse("INGRESO"), Some(EntryKind::Ingreso));
        assert_eq!(EntryKind::parse("inversión"), Some(EntryKind::Inversion));
        assert_eq!(EntryKind::parse("donacion"), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("Tarjeta"), Some(PaymentMethod::Tarjeta));
        assert_eq!(PaymentMethod::parse("bitcoin"), None);
    }
}
