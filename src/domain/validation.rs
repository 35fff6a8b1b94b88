// ==========================================
// Analitik ETL - 校验结果模型
// ==========================================
// 职责: 结构化错误与校验结果包装
// 说明: StructuredError 是用户可见反馈的最小单元，
//       从校验到最终报告必须原样保留
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// StructuredError - 结构化错误
// ==========================================
// row: 1 起始的工作表行号，0 表示文件级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    #[serde(rename = "Fila")]
    pub row: u32,

    #[serde(rename = "Columna")]
    pub column: String,

    #[serde(rename = "Error")]
    pub message: String,

    #[serde(rename = "ValorEncontrado", default, skip_serializing_if = "Option::is_none")]
    pub offending_value: Option<String>,

    #[serde(rename = "Sugerencia", default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    #[serde(rename = "TipoDatoEsperado", default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
}

impl StructuredError {
    pub fn new(row: u32, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            column: column.into(),
            message: message.into(),
            offending_value: None,
            suggestion: None,
            expected_type: None,
        }
    }

    /// 文件级错误（行号 0）
    pub fn file_level(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(0, column, message)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.offending_value = Some(value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_expected_type(mut self, expected_type: impl Into<String>) -> Self {
        self.expected_type = Some(expected_type.into());
        self
    }
}

// ==========================================
// ValidationOutcome - 校验结果
// ==========================================
// 不存在"部分成功": errors 非空即失败，调用方必须中止该阶段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    #[serde(rename = "Errores")]
    pub errors: Vec<StructuredError>,

    #[serde(rename = "Advertencias")]
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(error: StructuredError) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, error: StructuredError) {
        self.errors.push(error);
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_flag_follows_errors() {
        let mut outcome = ValidationOutcome::success();
        outcome.push_warning("Fila 3: aviso");
        assert!(outcome.is_success());

        outcome.push_error(StructuredError::new(3, "nombre", "Campo obligatorio vacío"));
        assert!(!outcome.is_success());
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_structured_error_serializes_contract_names() {
        let err = StructuredError::new(2, "codigo_producto", "x")
            .with_value("PROD-999")
            .with_expected_type("texto");
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["Fila"], 2);
        assert_eq!(json["Columna"], "codigo_producto");
        assert_eq!(json["ValorEncontrado"], "PROD-999");
        assert_eq!(json["TipoDatoEsperado"], "texto");
        assert!(json.get("Sugerencia").is_none());
    }
}
