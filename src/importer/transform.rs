// ==========================================
// Analitik ETL - 数据转换服务
// ==========================================
// 职责: 纯函数解析/规范化（日期、金额、布尔、整数、编码、文本）
// 红线: 无 I/O，无状态
// ==========================================

use crate::importer::sheet::CellValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

/// 可接受的日期格式（用于错误提示）
pub const ACCEPTED_DATE_FORMATS: &str = "AAAA-MM-DD, DD/MM/AAAA, MM/DD/AAAA";

// 编译失败时按不匹配处理
static CODE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9\-_]*$").ok());

static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").ok());

const TRUTHY: [&str; 11] = [
    "VERDADERO", "TRUE", "V", "SÍ", "SI", "S", "YES", "Y", "1", "ACTIVO", "ACTIVA",
];

const FALSY: [&str; 8] = ["FALSO", "FALSE", "F", "NO", "N", "0", "INACTIVO", "INACTIVA"];

const CURRENCY_TOKENS: [&str; 5] = ["COP", "USD", "EUR", "$", "€"];

// Excel 序列号有效区间（1900-01-01 ~ 9999-12-31）
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

// ==========================================
// ParseError
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
#[error("valor '{raw}' no es {expected}: {reason}")]
pub struct ParseError {
    pub raw: String,
    pub expected: &'static str, // 期望类型提示（fecha / decimal / entero）
    pub reason: String,
}

impl ParseError {
    fn new(value: &CellValue, expected: &'static str, reason: impl Into<String>) -> Self {
        Self {
            raw: value.raw_text(),
            expected,
            reason: reason.into(),
        }
    }
}

// ==========================================
// 日期
// ==========================================

/// 日期解析
///
/// 优先级: ISO → DD/MM/YYYY → MM/DD/YYYY → 宽松回退
/// 数值单元格按 Excel 日期序列号处理
pub fn parse_date(value: &CellValue) -> Result<NaiveDate, ParseError> {
    match value {
        CellValue::DateSerial(serial) | CellValue::Number(serial) => excel_serial_to_datetime(*serial)
            .map(|dt| dt.date())
            .ok_or_else(|| ParseError::new(value, "fecha", "número de serie fuera de rango")),
        CellValue::Text(text) => {
            let text = text.trim();
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
                .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
                .ok()
                .or_else(|| parse_date_permissive(text))
                .ok_or_else(|| {
                    ParseError::new(
                        value,
                        "fecha",
                        format!("formatos aceptados: {}", ACCEPTED_DATE_FORMATS),
                    )
                })
        }
        CellValue::Empty => Err(ParseError::new(value, "fecha", "valor vacío")),
        CellValue::Bool(_) => Err(ParseError::new(value, "fecha", "valor booleano")),
    }
}

/// 宽松回退: 其它常见分隔符、带时间的格式、RFC 3339、文本形式的序列号
fn parse_date_permissive(text: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 5] = ["%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y", "%Y%m%d", "%d/%m/%y"];
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    {
        return Some(date);
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    text.parse::<f64>()
        .ok()
        .and_then(excel_serial_to_datetime)
        .map(|dt| dt.date())
}

/// Excel 序列号 → 日期时间（1899-12-30 基准）
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}

// ==========================================
// 金额 / 小数 / 整数
// ==========================================

/// 金额解析（保留两位小数，空值 → 0）
pub fn parse_currency(value: &CellValue) -> Result<f64, ParseError> {
    match value {
        CellValue::Empty => Ok(0.0),
        CellValue::Number(n) => Ok(round2(*n)),
        CellValue::Text(text) => {
            let mut cleaned = text.to_uppercase();
            for token in CURRENCY_TOKENS {
                cleaned = cleaned.replace(token, "");
            }
            let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Ok(0.0);
            }
            parse_normalized_number(&resolve_separators(&cleaned))
                .map(round2)
                .ok_or_else(|| ParseError::new(value, "decimal", "formato numérico inválido"))
        }
        CellValue::Bool(_) | CellValue::DateSerial(_) => {
            Err(ParseError::new(value, "decimal", "no es un valor numérico"))
        }
    }
}

/// 小数解析（分隔符规则同金额，不强制舍入）
pub fn parse_decimal(value: &CellValue) -> Result<f64, ParseError> {
    match value {
        CellValue::Empty => Ok(0.0),
        CellValue::Number(n) => Ok(*n),
        CellValue::Text(text) => {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Ok(0.0);
            }
            parse_normalized_number(&resolve_separators(&cleaned))
                .ok_or_else(|| ParseError::new(value, "decimal", "formato numérico inválido"))
        }
        CellValue::Bool(_) | CellValue::DateSerial(_) => {
            Err(ParseError::new(value, "decimal", "no es un valor numérico"))
        }
    }
}

// 2^63，f64 可精确表示
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// 整数解析（去除千分位 , . 与空白）
pub fn parse_integer(value: &CellValue) -> Result<i64, ParseError> {
    match value {
        CellValue::Number(n) => {
            if !n.is_finite() || n.fract() != 0.0 {
                Err(ParseError::new(value, "entero", "tiene parte decimal"))
            } else if *n < -I64_LIMIT || *n >= I64_LIMIT {
                Err(ParseError::new(value, "entero", "fuera de rango"))
            } else {
                Ok(*n as i64)
            }
        }
        CellValue::Text(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| !matches!(c, ',' | '.') && !c.is_whitespace())
                .collect();
            cleaned
                .parse::<i64>()
                .map_err(|_| ParseError::new(value, "entero", "no es un número entero"))
        }
        CellValue::Empty => Err(ParseError::new(value, "entero", "valor vacío")),
        CellValue::Bool(_) | CellValue::DateSerial(_) => {
            Err(ParseError::new(value, "entero", "no es un valor numérico"))
        }
    }
}

/// 分隔符消歧
///
/// - 同时出现 . 与 , : 靠右者为小数点
/// - 仅出现 , : 单个为小数点，多个为千分位
/// - 仅出现 . : 多个为千分位，单个为小数点
fn resolve_separators(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// 仅接受 [-]数字[.数字]
fn parse_normalized_number(s: &str) -> Option<f64> {
    let body = s.strip_prefix('-').unwrap_or(s);
    let valid = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.matches('.').count() <= 1
        && body.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return None;
    }
    s.parse::<f64>().ok()
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

// ==========================================
// 布尔
// ==========================================

/// 布尔解析（不会失败；无法识别的值视为 false）
pub fn parse_boolean(value: &CellValue) -> bool {
    match value {
        CellValue::Bool(b) => *b,
        CellValue::Number(n) => *n == 1.0,
        CellValue::Text(text) => {
            let token = text.trim().to_uppercase();
            if TRUTHY.contains(&token.as_str()) {
                return true;
            }
            if !token.is_empty() && !FALSY.contains(&token.as_str()) {
                trace!(raw = %text, "未识别的布尔值，按 false 处理");
            }
            false
        }
        CellValue::Empty | CellValue::DateSerial(_) => false,
    }
}

// ==========================================
// 文本 / 编码
// ==========================================

/// 文本规范化: 去控制字符、合并空白、去首尾空白
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 编码规范化: 去空白、转大写
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// 编码格式: 字母开头，仅字母/数字/-/_
pub fn is_valid_code(code: &str) -> bool {
    CODE_PATTERN.as_ref().is_some_and(|re| re.is_match(code))
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|re| re.is_match(email.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    // ===== 日期 =====

    #[test]
    fn test_date_iso_wins() {
        assert_eq!(
            parse_date(&text("2024-03-05")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_date_day_first() {
        assert_eq!(
            parse_date(&text("05/03/2024")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_date_month_first_when_day_first_impossible() {
        assert_eq!(
            parse_date(&text("12/25/2023")).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 25).unwrap()
        );
    }

    #[test]
    fn test_date_permissive_fallbacks() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date(&text("2024/03/05")).unwrap(), expected);
        assert_eq!(parse_date(&text("20240305")).unwrap(), expected);
        assert_eq!(parse_date(&text("2024-03-05 14:30:00")).unwrap(), expected);
    }

    #[test]
    fn test_date_excel_serial() {
        // 45356 = 2024-03-05
        assert_eq!(
            parse_date(&CellValue::DateSerial(45356.0)).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(
            parse_date(&CellValue::Number(45356.5)).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_date_invalid_reports_raw_text() {
        let err = parse_date(&text("not-a-date")).unwrap_err();
        assert_eq!(err.raw, "not-a-date");
        assert_eq!(err.expected, "fecha");
        assert!(err.reason.contains("AAAA-MM-DD"));
    }

    // ===== 金额 =====

    #[test]
    fn test_currency_separator_styles_agree() {
        assert_eq!(parse_currency(&text("1.234,56")).unwrap(), 1234.56);
        assert_eq!(parse_currency(&text("1,234.56")).unwrap(), 1234.56);
    }

    #[test]
    fn test_currency_strips_symbols() {
        assert_eq!(parse_currency(&text("$ 89.500")).unwrap(), 89.5);
        assert_eq!(parse_currency(&text("COP 1.500.000")).unwrap(), 1_500_000.0);
        assert_eq!(parse_currency(&text("USD 12,5")).unwrap(), 12.5);
    }

    #[test]
    fn test_currency_multiple_commas_are_thousands() {
        assert_eq!(parse_currency(&text("1,234,567")).unwrap(), 1_234_567.0);
    }

    #[test]
    fn test_currency_rounds_and_defaults() {
        assert_eq!(parse_currency(&CellValue::Number(10.005_1)).unwrap(), 10.01);
        assert_eq!(parse_currency(&CellValue::Empty).unwrap(), 0.0);
        assert!(parse_currency(&text("abc")).is_err());
        assert!(parse_currency(&text("12-3")).is_err());
    }

    #[test]
    fn test_decimal_keeps_precision() {
        assert_eq!(parse_decimal(&text("0,125")).unwrap(), 0.125);
        assert_eq!(parse_decimal(&text("-2.5")).unwrap(), -2.5);
    }

    #[test]
    fn test_integer_strips_thousands() {
        assert_eq!(parse_integer(&text("1.200")).unwrap(), 1200);
        assert_eq!(parse_integer(&text("1,200")).unwrap(), 1200);
        assert_eq!(parse_integer(&text("-5")).unwrap(), -5);
        assert_eq!(parse_integer(&CellValue::Number(7.0)).unwrap(), 7);
        assert!(parse_integer(&CellValue::Number(7.5)).is_err());
        assert!(parse_integer(&text("diez")).is_err());
    }

    #[test]
    fn test_integer_rejects_lossy_numbers() {
        assert!(parse_integer(&CellValue::Number(12.7)).is_err());
        assert!(parse_integer(&CellValue::Number(f64::NAN)).is_err());
        assert!(parse_integer(&CellValue::Number(1e19)).is_err());
        assert!(parse_integer(&CellValue::Number(-1e19)).is_err());
        let err = parse_integer(&CellValue::Number(1e19)).unwrap_err();
        assert_eq!(err.reason, "fuera de rango");
        assert_eq!(parse_integer(&CellValue::Number(-25.0)).unwrap(), -25);
    }

    // ===== 布尔 =====

    #[test]
    fn test_boolean_sets() {
        for t in ["VERDADERO", "true", "Sí", "si", "s", "1", "Activo", "y"] {
            assert!(parse_boolean(&text(t)), "{} debe ser true", t);
        }
        for f in ["FALSO", "no", "0", "inactiva", "n"] {
            assert!(!parse_boolean(&text(f)), "{} debe ser false", f);
        }
    }

    #[test]
    fn test_boolean_is_total() {
        for raw in ["tal vez", "", "2", "???"] {
            assert!(!parse_boolean(&text(raw)));
        }
        assert!(parse_boolean(&CellValue::Bool(true)));
    }

    // ===== 文本/编码 =====

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Camisa\t  polo \u{7}azul\n"), "Camisa polo azul");
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" prod - 001 "), "PROD-001");
    }

    #[test]
    fn test_code_validation() {
        assert!(is_valid_code("PROD-001"));
        assert!(is_valid_code("PANT_01"));
        assert!(!is_valid_code("1PROD"));
        assert!(!is_valid_code("PR OD"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ventas@empresa.com.co"));
        assert!(!is_valid_email("ventas@empresa"));
        assert!(!is_valid_email("ventas empresa.com"));
    }
}
