// ==========================================
// 档案目录树导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供目录树持久化契约及其实现,屏蔽存储细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod enrichment_repo;
pub mod error;
pub mod import_run_repo;
pub mod memory_tree_repo;
pub mod tree_repo;
pub mod tree_repo_impl;

// 重导出核心仓储
pub use enrichment_repo::EnrichmentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_run_repo::ImportRunRepository;
pub use memory_tree_repo::InMemoryCatalogTreeRepository;
pub use tree_repo::CatalogTreeRepository;
pub use tree_repo_impl::SqliteCatalogTreeRepository;
