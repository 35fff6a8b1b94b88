// ==========================================
// Analitik ETL - 配置管理器
// ==========================================
// 职责: 配置查询、覆写管理
// 存储: config_kv 表 (scope_id + key → value)
// 查找: scope_id = 租户 ID → scope_id = 'global' → 内置默认值
// ==========================================

use crate::config::etl_config_trait::EtlConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::records::LoadDefaults;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::structure::MAX_FILE_SIZE_BYTES;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// 全局 scope
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn read_scope(&self, scope_id: &str, key: &str) -> ImportResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| ImportError::ConfigReadError {
            key: key.to_string(),
            message: format!("锁获取失败: {}", e),
        })?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope_id, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取配置值（租户覆写优先）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 两级均未配置
    pub fn get_value(&self, tenant_id: Option<Uuid>, key: &str) -> ImportResult<Option<String>> {
        if let Some(tenant) = tenant_id {
            if let Some(value) = self.read_scope(&tenant.to_string(), key)? {
                return Ok(Some(value));
            }
        }
        self.read_scope(GLOBAL_SCOPE, key)
    }

    /// 写入配置值（UPSERT）
    ///
    /// # 参数
    /// - scope_id: 'global' 或租户 ID
    pub fn set_value(&self, scope_id: &str, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.conn.lock().map_err(|e| ImportError::ConfigReadError {
            key: key.to_string(),
            message: format!("锁获取失败: {}", e),
        })?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope_id, key, value],
        )?;
        debug!(scope_id, key, value, "配置已写入");
        Ok(())
    }

    /// 读取并解析，未配置时返回默认值
    fn get_parsed<T>(&self, tenant_id: Uuid, key: &str, default: T) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_value(Some(tenant_id), key)? {
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ImportError::ConfigValueError {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn get_string(&self, tenant_id: Uuid, key: &str, default: &str) -> ImportResult<String> {
        Ok(self
            .get_value(Some(tenant_id), key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

#[async_trait]
impl EtlConfigReader for ConfigManager {
    async fn max_file_size_bytes(&self, tenant_id: Uuid) -> ImportResult<u64> {
        let value = self.get_parsed(
            tenant_id,
            config_keys::MAX_FILE_SIZE_BYTES,
            defaults::MAX_FILE_SIZE_BYTES,
        )?;
        Ok(value.min(MAX_FILE_SIZE_BYTES))
    }

    async fn import_deadline_secs(&self, tenant_id: Uuid) -> ImportResult<u64> {
        self.get_parsed(
            tenant_id,
            config_keys::IMPORT_DEADLINE_SECS,
            defaults::IMPORT_DEADLINE_SECS,
        )
    }

    async fn stale_run_timeout_secs(&self, tenant_id: Uuid) -> ImportResult<u64> {
        self.get_parsed(
            tenant_id,
            config_keys::STALE_RUN_TIMEOUT_SECS,
            defaults::STALE_RUN_TIMEOUT_SECS,
        )
    }

    async fn load_defaults(&self, tenant_id: Uuid) -> ImportResult<LoadDefaults> {
        let fallback = LoadDefaults::default();
        Ok(LoadDefaults {
            currency: self
                .get_string(tenant_id, config_keys::DEFAULT_CURRENCY, &fallback.currency)?
                .to_uppercase(),
            expiry_alert_days: self.get_parsed(
                tenant_id,
                config_keys::EXPIRY_ALERT_DAYS,
                fallback.expiry_alert_days,
            )?,
            payment_status: self.get_string(
                tenant_id,
                config_keys::DEFAULT_PAYMENT_STATUS,
                &fallback.payment_status,
            )?,
            sale_state: self.get_string(
                tenant_id,
                config_keys::DEFAULT_SALE_STATE,
                &fallback.sale_state,
            )?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 上传
    pub const MAX_FILE_SIZE_BYTES: &str = "etl/max_file_size_bytes";

    // 落库缺省值
    pub const DEFAULT_CURRENCY: &str = "etl/default_currency";
    pub const EXPIRY_ALERT_DAYS: &str = "etl/expiry_alert_days";
    pub const DEFAULT_PAYMENT_STATUS: &str = "etl/default_payment_status";
    pub const DEFAULT_SALE_STATE: &str = "etl/default_sale_state";

    // 运行控制
    pub const STALE_RUN_TIMEOUT_SECS: &str = "etl/stale_run_timeout_secs";
    pub const IMPORT_DEADLINE_SECS: &str = "etl/import_deadline_secs";
}

/// 内置默认值
pub mod defaults {
    pub const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const STALE_RUN_TIMEOUT_SECS: u64 = 1800;
    pub const IMPORT_DEADLINE_SECS: u64 = 300;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let config = manager();
        let tenant = Uuid::new_v4();
        assert_eq!(config.max_file_size_bytes(tenant).await.unwrap(), 10 * 1024 * 1024);
        assert_eq!(config.import_deadline_secs(tenant).await.unwrap(), 300);
        assert_eq!(config.stale_run_timeout_secs(tenant).await.unwrap(), 1800);
        assert_eq!(config.load_defaults(tenant).await.unwrap(), LoadDefaults::default());
    }

    #[tokio::test]
    async fn test_tenant_scope_overrides_global() {
        let config = manager();
        let tenant = Uuid::new_v4();
        config.set_value(GLOBAL_SCOPE, config_keys::DEFAULT_CURRENCY, "usd").unwrap();
        assert_eq!(config.load_defaults(tenant).await.unwrap().currency, "USD");

        config
            .set_value(&tenant.to_string(), config_keys::DEFAULT_CURRENCY, "EUR")
            .unwrap();
        assert_eq!(config.load_defaults(tenant).await.unwrap().currency, "EUR");
        assert_eq!(config.load_defaults(Uuid::new_v4()).await.unwrap().currency, "USD");
    }

    #[tokio::test]
    async fn test_file_size_clamped_to_contract() {
        let config = manager();
        config
            .set_value(GLOBAL_SCOPE, config_keys::MAX_FILE_SIZE_BYTES, "999999999")
            .unwrap();
        assert_eq!(
            config.max_file_size_bytes(Uuid::new_v4()).await.unwrap(),
            10 * 1024 * 1024
        );
    }

    #[tokio::test]
    async fn test_malformed_value_reported() {
        let config = manager();
        config
            .set_value(GLOBAL_SCOPE, config_keys::IMPORT_DEADLINE_SECS, "cinco")
            .unwrap();
        let err = config.import_deadline_secs(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ImportError::ConfigValueError { .. }));
    }
}
