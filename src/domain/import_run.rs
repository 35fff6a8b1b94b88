// ==========================================
// Analitik ETL - 导入运行 (ImportRun)
// ==========================================
// 职责: 单次导入的生命周期记录 + 落库汇总 + 报告视图
// 说明: ImportRun 为审计记录，创建后只更新不删除；
//       错误集合在内存中保持强类型，仅在持久化边界序列化
// ==========================================

use crate::domain::types::{EtlPhase, RunState};
use crate::domain::validation::StructuredError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use uuid::Uuid;

// ==========================================
// ImportRun - 导入运行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Uuid,
    pub tenant_id: Uuid,

    // ===== 文件 =====
    pub file_name: String,
    pub file_size: i64,
    pub content_hash: String, // SHA-256 十六进制

    // ===== 生命周期 =====
    pub state: RunState,
    pub phase: EtlPhase,
    pub progress_pct: f64,

    // ===== 计数 =====
    pub records_extracted: i64,
    pub records_transformed: i64,
    pub records_loaded: i64,
    pub records_rejected: i64,

    // ===== 错误/告警（按阶段） =====
    pub extraction_errors: Vec<StructuredError>,
    pub transformation_errors: Vec<StructuredError>,
    pub load_errors: Vec<StructuredError>,
    pub warnings: Vec<String>,

    pub load_result: Option<LoadSummary>,

    // ===== 时间 =====
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ImportRun {
    /// 新登记的运行: en_proceso / extraccion / 0%
    pub fn register(
        tenant_id: Uuid,
        file_name: impl Into<String>,
        file_size: i64,
        content_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            file_name: file_name.into(),
            file_size,
            content_hash: content_hash.into(),
            state: RunState::InProgress,
            phase: EtlPhase::Extraction,
            progress_pct: 0.0,
            records_extracted: 0,
            records_transformed: 0,
            records_loaded: 0,
            records_rejected: 0,
            extraction_errors: Vec::new(),
            transformation_errors: Vec::new(),
            load_errors: Vec::new(),
            warnings: Vec::new(),
            load_result: None,
            started_at: now,
            finished_at: None,
            duration_secs: None,
            updated_at: now,
        }
    }

    /// 阶段对应的错误集合（completado/error 不是发生阶段，归入 carga）
    pub fn errors_for_phase_mut(&mut self, phase: EtlPhase) -> &mut Vec<StructuredError> {
        match phase {
            EtlPhase::Extraction => &mut self.extraction_errors,
            EtlPhase::Transformation => &mut self.transformation_errors,
            EtlPhase::Load | EtlPhase::Completed | EtlPhase::Error => &mut self.load_errors,
        }
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            extracted: self.records_extracted,
            transformed: self.records_transformed,
            loaded: self.records_loaded,
            rejected: self.records_rejected,
        }
    }

    pub fn apply_counters(&mut self, counters: RunCounters) {
        self.records_extracted = counters.extracted;
        self.records_transformed = counters.transformed;
        self.records_loaded = counters.loaded;
        self.records_rejected = counters.rejected;
    }

    /// 距启动以来的秒数（两位小数）
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.started_at).num_milliseconds().max(0);
        (millis as f64 / 10.0).round() / 100.0
    }
}

// ==========================================
// RunCounters - 记录计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub extracted: i64,   // 非空数据行
    pub transformed: i64, // 读取阶段通过的记录
    pub loaded: i64,      // 落库处理的记录
    pub rejected: i64,    // 被拒绝的行
}

// ==========================================
// LoadSummary - 落库汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    #[serde(rename = "RegistrosProcesados")]
    pub records_processed: i64,
    #[serde(rename = "TotalErrores")]
    pub total_errors: i64,
    #[serde(rename = "TotalAdvertencias")]
    pub total_warnings: i64,

    #[serde(rename = "ProductosInsertados")]
    pub products_inserted: i64,
    #[serde(rename = "ProductosActualizados")]
    pub products_updated: i64,
    #[serde(rename = "InventariosInsertados")]
    pub inventory_inserted: i64,
    #[serde(rename = "InventariosActualizados", default)]
    pub inventory_updated: i64,
    #[serde(rename = "InventariosOmitidos", default)]
    pub inventory_skipped: i64,
    #[serde(rename = "VentasInsertadas")]
    pub sales_inserted: i64,
    #[serde(rename = "VentasOmitidas", default)]
    pub sales_skipped: i64,
    #[serde(rename = "DetallesVentaInsertados", default)]
    pub sale_lines_inserted: i64,
    #[serde(rename = "FinancierosInsertados")]
    pub financials_inserted: i64,

    #[serde(rename = "DuracionSegundos")]
    pub duration_secs: f64,
}

impl LoadSummary {
    /// 处理总数 = 产品(新增+更新) + 库存(新增+更新) + 销售 + 财务
    pub fn compute_records_processed(&mut self) {
        self.records_processed = self.products_inserted
            + self.products_updated
            + self.inventory_inserted
            + self.inventory_updated
            + self.sales_inserted
            + self.financials_inserted;
    }
}

// ==========================================
// ImportReport - 运行报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub file_name: String,
    pub state: RunState,
    pub phase: EtlPhase,
    pub errors_by_phase: Vec<PhaseErrors>,
    pub warnings: Vec<String>,
    pub summary: Option<LoadSummary>,
    pub counters: RunCounters,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseErrors {
    pub phase: EtlPhase,
    pub errors: Vec<StructuredError>,
}

// ==========================================
// RunStatus - 状态轮询视图
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub state: RunState,
    pub phase: EtlPhase,
    pub progress_pct: f64,
    pub counters: RunCounters,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// en_proceso 但超过超时阈值未更新
    pub abandoned: bool,
}

// ==========================================
// RunHistoryPage - 历史分页
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistoryPage {
    pub runs: Vec<ImportRun>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

// ==========================================
// ImportRequest - 导入请求（边界输入）
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub tenant_id: Uuid,
    pub file_name: String,
    /// 上传层声明的字节数
    pub declared_size: u64,
    pub content: Vec<u8>,
}

impl ImportRequest {
    pub fn new(tenant_id: Uuid, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            tenant_id,
            file_name: file_name.into(),
            declared_size: content.len() as u64,
            content,
        }
    }

    /// 从流读取，最多读取 max_bytes + 1 字节（足以判定超限）
    pub fn from_reader<R: Read>(
        tenant_id: Uuid,
        file_name: impl Into<String>,
        declared_size: u64,
        reader: R,
        max_bytes: u64,
    ) -> std::io::Result<Self> {
        let mut content = Vec::new();
        reader.take(max_bytes.saturating_add(1)).read_to_end(&mut content)?;
        Ok(Self {
            tenant_id,
            file_name: file_name.into(),
            declared_size,
            content,
        })
    }

    /// 用于大小校验的字节数（声明值与实际读取值取大）
    pub fn effective_size(&self) -> u64 {
        self.declared_size.max(self.content.len() as u64)
    }
}

// ==========================================
// ImportOutcome - 导入结果（边界输出）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    #[serde(rename = "Exitoso")]
    pub success: bool,
    #[serde(rename = "Mensaje")]
    pub message: String,
    #[serde(rename = "ImportId")]
    pub run_id: Option<Uuid>,
    #[serde(rename = "Errores")]
    pub errors: Vec<StructuredError>,
    #[serde(rename = "Advertencias")]
    pub warnings: Vec<String>,
    #[serde(rename = "Resumen")]
    pub summary: Option<LoadSummary>,
}

impl ImportOutcome {
    pub fn succeeded(
        run_id: Uuid,
        message: impl Into<String>,
        summary: LoadSummary,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            run_id: Some(run_id),
            errors: Vec::new(),
            warnings,
            summary: Some(summary),
        }
    }

    pub fn failed(
        run_id: Option<Uuid>,
        message: impl Into<String>,
        errors: Vec<StructuredError>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            run_id,
            errors,
            warnings,
            summary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_in_extraction() {
        let run = ImportRun::register(Uuid::new_v4(), "carga.xlsx", 1024, "abc");
        assert_eq!(run.state, RunState::InProgress);
        assert_eq!(run.phase, EtlPhase::Extraction);
        assert_eq!(run.progress_pct, 0.0);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_records_processed_counts_all_categories() {
        let mut summary = LoadSummary {
            products_inserted: 2,
            inventory_inserted: 2,
            sales_inserted: 1,
            financials_inserted: 1,
            sale_lines_inserted: 1,
            ..Default::default()
        };
        summary.compute_records_processed();
        assert_eq!(summary.records_processed, 6);
    }

    #[test]
    fn test_request_from_reader_stops_after_limit() {
        let data = vec![0u8; 64];
        let request =
            ImportRequest::from_reader(Uuid::nil(), "big.xlsx", 10, data.as_slice(), 16).unwrap();
        assert_eq!(request.content.len(), 17);
        assert_eq!(request.effective_size(), 17);
    }

    #[test]
    fn test_outcome_serializes_boundary_names() {
        let outcome = ImportOutcome::failed(
            None,
            "x",
            vec![StructuredError::new(2, "codigo_producto", "m")],
            vec![],
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["Exitoso"], false);
        assert_eq!(json["Errores"][0]["Fila"], 2);
        assert_eq!(json["Errores"][0]["Columna"], "codigo_producto");
        assert!(json["Resumen"].is_null());
    }
}
