// ==========================================
// Analitik ETL - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入；所有查询按租户隔离
// ==========================================

pub mod error;
pub mod etl_load_repo;
pub mod etl_load_repo_impl;
pub mod import_run_repo;
pub mod import_run_repo_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use etl_load_repo::{EtlLoadRepository, LoadOutput, TenantRowCounts};
pub use etl_load_repo_impl::EtlLoadRepositoryImpl;
pub use import_run_repo::ImportRunRepository;
pub use import_run_repo_impl::ImportRunRepositoryImpl;
