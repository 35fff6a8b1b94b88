// ==========================================
// Analitik ETL - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: SQLITE_BUSY / SQLITE_LOCKED 视为序列化冲突（可重试）
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 并发控制错误 =====
    #[error("序列化冲突（另一导入正在写入，可重试）: {0}")]
    SerializationConflict(String),

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("检查约束违反: {0}")]
    CheckConstraintViolation(String),

    // ===== 业务规则错误 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    #[error("序列化失败: {0}")]
    SerializationError(#[from] serde_json::Error),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 调用方是否可以重试整个导入
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::SerializationConflict(_))
    }

    /// 事务提交失败: 锁冲突仍为可重试，其余归为事务错误
    pub fn from_commit(err: rusqlite::Error) -> Self {
        match RepositoryError::from(err) {
            conflict @ RepositoryError::SerializationConflict(_) => conflict,
            other => RepositoryError::DatabaseTransactionError(other.to_string()),
        }
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                RepositoryError::SerializationConflict(err.to_string())
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else if msg.contains("CHECK") {
                    RepositoryError::CheckConstraintViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn test_busy_maps_to_retryable_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let repo_err = RepositoryError::from(err);
        assert!(matches!(repo_err, RepositoryError::SerializationConflict(_)));
        assert!(repo_err.is_retryable());
    }

    #[test]
    fn test_commit_failure_mapping() {
        let busy = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(RepositoryError::from_commit(busy).is_retryable());

        let io = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_IOERR),
            Some("disk I/O error".to_string()),
        );
        let repo_err = RepositoryError::from_commit(io);
        assert!(matches!(repo_err, RepositoryError::DatabaseTransactionError(_)));
        assert!(!repo_err.is_retryable());
    }

    #[test]
    fn test_check_constraint_mapping() {
        let err = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_CHECK),
            Some("CHECK constraint failed: amount > 0".to_string()),
        );
        let repo_err = RepositoryError::from(err);
        assert!(matches!(repo_err, RepositoryError::CheckConstraintViolation(_)));
        assert!(!repo_err.is_retryable());
    }
}
