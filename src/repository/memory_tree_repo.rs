// ==========================================
// 档案目录树导入系统 - 内存版目录树 Repository
// ==========================================
// 用途: 预览 / 算法级测试，不依赖数据库
// 行为与 SQLite 实现一致（父节点必须存在）
// ==========================================

use crate::domain::mapping::TargetRecord;
use crate::domain::tree::{NestedInterval, TreeNode, ROOT_NODE_ID};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::tree_repo::CatalogTreeRepository;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<i64, TreeNode>,
    records: HashMap<i64, TargetRecord>,
    keymap: HashMap<(String, String), i64>,
    next_id: i64,
}

// ==========================================
// InMemoryCatalogTreeRepository
// ==========================================
#[derive(Debug)]
pub struct InMemoryCatalogTreeRepository {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryCatalogTreeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalogTreeRepository {
    /// 创建仅含根节点 (1,2) 的目录树
    pub fn new() -> Self {
        let mut state = MemoryState {
            next_id: ROOT_NODE_ID + 1,
            ..Default::default()
        };
        state.nodes.insert(
            ROOT_NODE_ID,
            TreeNode {
                id: ROOT_NODE_ID,
                parent_id: None,
                lft: 1,
                rgt: 2,
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    /// 直接放入一个节点（用于构造已有树/异常树）
    pub fn insert_node(&self, node: TreeNode) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        state.next_id = state.next_id.max(node.id + 1);
        state.nodes.insert(node.id, node);
        Ok(())
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn not_found(node_id: i64) -> RepositoryError {
        RepositoryError::NotFound {
            entity: "catalog_node".to_string(),
            id: node_id.to_string(),
        }
    }
}

impl CatalogTreeRepository for InMemoryCatalogTreeRepository {
    fn create_node(&self, parent_id: i64) -> RepositoryResult<i64> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&parent_id) {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "父节点不存在: {}",
                parent_id
            )));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            id,
            TreeNode {
                id,
                parent_id: Some(parent_id),
                lft: 0,
                rgt: 0,
            },
        );
        Ok(id)
    }

    fn update_interval(&self, node_id: i64, lft: i64, rgt: i64) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| Self::not_found(node_id))?;
        node.lft = lft;
        node.rgt = rgt;
        Ok(())
    }

    fn update_parent(&self, node_id: i64, parent_id: i64) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&parent_id) {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "父节点不存在: {}",
                parent_id
            )));
        }
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| Self::not_found(node_id))?;
        node.parent_id = Some(parent_id);
        Ok(())
    }

    fn find_node(&self, node_id: i64) -> RepositoryResult<Option<TreeNode>> {
        Ok(self.lock()?.nodes.get(&node_id).copied())
    }

    fn list_nodes(&self) -> RepositoryResult<Vec<TreeNode>> {
        Ok(self.lock()?.nodes.values().copied().collect())
    }

    fn save_record(&self, node_id: i64, record: &TargetRecord) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&node_id) {
            return Err(Self::not_found(node_id));
        }
        state.records.insert(node_id, record.clone());
        Ok(())
    }

    fn find_record(&self, node_id: i64) -> RepositoryResult<Option<TargetRecord>> {
        Ok(self.lock()?.records.get(&node_id).cloned())
    }

    fn find_keymap(&self, source_name: &str, legacy_id: &str) -> RepositoryResult<Option<i64>> {
        let state = self.lock()?;
        Ok(state
            .keymap
            .get(&(source_name.to_string(), legacy_id.to_string()))
            .copied())
    }

    fn save_keymap(&self, source_name: &str, legacy_id: &str, node_id: i64) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        state
            .keymap
            .insert((source_name.to_string(), legacy_id.to_string()), node_id);
        Ok(())
    }

    /// 同一把锁内先校验再写入，失败时不留下部分结果
    fn create_node_with_record(
        &self,
        parent_id: i64,
        record: &TargetRecord,
        source_name: &str,
        legacy_id: &str,
    ) -> RepositoryResult<i64> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&parent_id) {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "父节点不存在: {}",
                parent_id
            )));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.nodes.insert(
            id,
            TreeNode {
                id,
                parent_id: Some(parent_id),
                lft: 0,
                rgt: 0,
            },
        );
        state.records.insert(id, record.clone());
        state
            .keymap
            .insert((source_name.to_string(), legacy_id.to_string()), id);
        Ok(id)
    }

    fn update_node_with_record(
        &self,
        node_id: i64,
        parent_id: Option<i64>,
        record: &TargetRecord,
    ) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        if let Some(parent_id) = parent_id {
            if !state.nodes.contains_key(&parent_id) {
                return Err(RepositoryError::ForeignKeyViolation(format!(
                    "父节点不存在: {}",
                    parent_id
                )));
            }
        }
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| Self::not_found(node_id))?;
        if let Some(parent_id) = parent_id {
            node.parent_id = Some(parent_id);
        }
        state.records.insert(node_id, record.clone());
        Ok(())
    }

    /// 先校验全部节点存在再写入，失败时不留下部分结果
    fn apply_intervals(&self, intervals: &[NestedInterval]) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        if let Some(missing) = intervals
            .iter()
            .find(|i| !state.nodes.contains_key(&i.node_id))
        {
            return Err(Self::not_found(missing.node_id));
        }
        for interval in intervals {
            if let Some(node) = state.nodes.get_mut(&interval.node_id) {
                node.lft = interval.lft;
                node.rgt = interval.rgt;
            }
        }
        Ok(())
    }
}
