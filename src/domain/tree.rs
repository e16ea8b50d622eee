// ==========================================
// 档案目录树导入系统 - 目录树节点
// ==========================================
// 嵌套集模型: 后代区间严格落在祖先区间内
// 新建节点 lft/rgt 为 (0,0)，重算后才有效
// ==========================================

use serde::{Deserialize, Serialize};

/// 目录根节点 ID
pub const ROOT_NODE_ID: i64 = 1;

// ==========================================
// TreeNode - 持久化节点
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub lft: i64,
    pub rgt: i64,
}

impl TreeNode {
    /// 区间是否严格包含另一节点
    pub fn contains(&self, other: &TreeNode) -> bool {
        self.lft < other.lft && other.lft < other.rgt && other.rgt < self.rgt
    }
}

// ==========================================
// NestedInterval - 重算产出的区间
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedInterval {
    pub node_id: i64,
    pub lft: i64,
    pub rgt: i64,
}
