// ==========================================
// 档案目录树导入系统 - 引擎层错误类型
// ==========================================
// 重算失败为致命错误：部分重算会破坏整棵树的区间包含关系，
// 只能整体重试，不能断点续做
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("目录树为空，找不到根节点")]
    EmptyTree,

    #[error("存在无法从根节点到达的节点（疑似父子环）: {0:?}")]
    UnreachableNodes(Vec<i64>),

    #[error("读取目录树失败: {0}")]
    LoadFailed(#[source] RepositoryError),

    #[error("写入区间失败: {0}")]
    WriteFailed(#[source] RepositoryError),
}

/// Result 类型别名
pub type RebuildResult<T> = Result<T, RebuildError>;
