// ==========================================
// Analitik ETL - API 层错误类型
// ==========================================
// 职责: 定义 API 层错误类型，将 Repository/Importer 错误转换为调用方可处理的错误
// 说明: 导入本身的失败通过 ImportOutcome 返回，不经过本错误类型
// ==========================================

use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API 层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    /// 另一导入正在写入（可重试）
    #[error("写入冲突，请稍后重试: {0}")]
    Busy(String),

    // ==========================================
    // 文件/配置错误
    // ==========================================
    #[error("文件读取失败: {0}")]
    FileError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SerializationConflict(msg) => ApiError::Busy(msg),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg)
            | RepositoryError::CheckConstraintViolation(msg) => ApiError::DatabaseError(msg),

            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::SerializationError(err) => ApiError::InternalError(err.to_string()),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(e) => ApiError::from(e),
            ImportError::FileReadError(msg) => ApiError::FileError(msg),
            e @ (ImportError::ConfigReadError { .. } | ImportError::ConfigValueError { .. }) => {
                ApiError::ConfigError(e.to_string())
            }
            ImportError::Other(err) => ApiError::Other(err),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::from(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_conflict_maps_to_busy() {
        let err = ApiError::from(RepositoryError::SerializationConflict("locked".to_string()));
        assert!(matches!(err, ApiError::Busy(_)));
    }

    #[test]
    fn test_import_config_error_mapping() {
        let err = ApiError::from(ImportError::ConfigValueError {
            key: "etl/import_deadline_secs".to_string(),
            value: "x".to_string(),
            message: "invalid digit".to_string(),
        });
        assert!(matches!(err, ApiError::ConfigError(_)));
    }
}
