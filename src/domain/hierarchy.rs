// ==========================================
// 档案目录树导入系统 - 层级相关实体
// ==========================================
// 生命周期: 仅限单次导入运行
// ==========================================

use crate::domain::mapping::TargetRecord;
use serde::{Deserialize, Serialize};

/// 合成 legacyId 前缀（源记录缺少 legacyId 时按行位置生成）
pub const SYNTHETIC_LEGACY_ID_PREFIX: &str = "record_";

// ==========================================
// HierarchyNode - 层级节点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub legacy_id: String,
    pub parent_legacy_id: Option<String>,
    pub record: TargetRecord,
    pub source_index: usize, // 在映射结果序列中的位置（0 起）
}

// ==========================================
// DuplicateLegacyId - 同批次重复 legacyId
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLegacyId {
    pub legacy_id: String,
    pub kept_index: usize,
    pub dropped_index: usize,
}

// ==========================================
// HierarchyPlan - 层级构建结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyPlan {
    /// 处理顺序（父在子前）
    pub nodes: Vec<HierarchyNode>,

    /// 被丢弃的重复记录
    pub duplicates: Vec<DuplicateLegacyId>,

    /// parentId 在本批次中不存在的记录: (legacyId, parentLegacyId)
    pub dangling_parents: Vec<(String, String)>,

    /// 自闭合环的入口节点（其父节点在处理时尚未创建）
    pub cycle_entries: Vec<String>,
}

impl HierarchyPlan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// legacyId 在处理顺序中的位置
    pub fn position_of(&self, legacy_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.legacy_id == legacy_id)
    }
}
