// ==========================================
// 档案目录树导入系统 - 引擎层
// ==========================================
// 职责: 整棵目录树级别的算法（嵌套集重算）
// 红线: Engine 不拼 SQL, 只通过持久化契约读写
// ==========================================

pub mod error;
pub mod nested_set;

// 重导出核心引擎
pub use error::{RebuildError, RebuildResult};
pub use nested_set::{NestedSetRebuilder, RebuildReport};
