// ==========================================
// 档案目录树导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 流程: 外部表格 → 字段映射 → 层级重建 → 落库/增强 → 嵌套集重算
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录/层级/目录节点
pub mod domain;

// 数据仓储层 - 目录树/导入运行/增强数据
pub mod repository;

// 引擎层 - 嵌套集重算
pub mod engine;

// 导入层 - 映射、层级、落库编排
pub mod importer;

// 配置层 - 全局配置与映射方案
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    DuplicateLegacyIdPolicy, HierarchyPlan, ImportOptions, ImportSummary, MappingRule, RunStatus,
    SourceRow, SourceTable, TargetRecord, TreeNode, ROOT_NODE_ID,
};

pub use engine::{NestedSetRebuilder, RebuildError, RebuildReport};

pub use importer::{
    CancellationFlag, CatalogImporter, CatalogImporterImpl, FieldMapper, HierarchyBuilder,
    ImportError, ImportResult, RecordIssue, TreePersister,
};

pub use repository::{CatalogTreeRepository, RepositoryError, SqliteCatalogTreeRepository};

pub use config::{ConfigManager, MappingProfile};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "档案目录树导入系统";
