// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持西班牙语（默认）和英文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化；
//       当前语言由本模块持有，默认 es，不依赖 rust-i18n 的全局默认值
// ==========================================

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 默认语言
pub const DEFAULT_LOCALE: &str = "es";

static CURRENT_LOCALE: Lazy<RwLock<String>> =
    Lazy::new(|| RwLock::new(DEFAULT_LOCALE.to_string()));

/// 获取当前语言
pub fn current_locale() -> String {
    match CURRENT_LOCALE.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"es" 或 "en"）
pub fn set_locale(locale: &str) {
    match CURRENT_LOCALE.write() {
        Ok(mut guard) => *guard = locale.to_string(),
        Err(poisoned) => *poisoned.into_inner() = locale.to_string(),
    }
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use analitik_etl::i18n::t;
/// let msg = t("row.required");
/// ```
pub fn t(key: &str) -> String {
    t_in(&current_locale(), key)
}

/// 在指定语言下翻译（不修改当前语言）
pub fn t_in(locale: &str, key: &str) -> String {
    rust_i18n::t!(key, locale = locale).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use analitik_etl::i18n::t_with_args;
/// let msg = t_with_args("structure.missing_sheets", &[("sheets", "VENTAS")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = t(key);
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // 当前语言为全局状态，且 Rust 测试默认并行执行；
    // 修改语言的测试在此串行化，其余测试只使用 t_in
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_translate_in_explicit_locale() {
        assert_eq!(t_in("es", "row.required"), "Campo obligatorio vacío");
        assert_eq!(t_in("en", "row.required"), "Mandatory field is empty");
    }

    #[test]
    fn test_set_locale_round_trip() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");
        assert_eq!(t("common.success"), "Operation successful");

        set_locale(DEFAULT_LOCALE);
        assert_eq!(current_locale(), "es");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale(DEFAULT_LOCALE);
        let msg = t_with_args("structure.missing_sheets", &[("sheets", "VENTAS, FINANCIEROS")]);
        assert_eq!(msg, "Faltan las hojas: VENTAS, FINANCIEROS");
    }
}
