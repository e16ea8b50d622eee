// ==========================================
// 档案目录树导入系统 - 领域模型层
// ==========================================
// 职责: 定义导入链路上的实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod hierarchy;
pub mod import;
pub mod mapping;
pub mod tree;
pub mod types;

// 重导出核心类型
pub use hierarchy::{DuplicateLegacyId, HierarchyNode, HierarchyPlan};
pub use import::{EnrichmentStats, ImportOptions, ImportRun, ImportSummary};
pub use mapping::{MappingRule, SourceRow, SourceTable, TargetRecord};
pub use tree::{NestedInterval, TreeNode, ROOT_NODE_ID};
pub use types::{DuplicateLegacyIdPolicy, RunStatus};
