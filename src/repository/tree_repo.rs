// ==========================================
// 档案目录树导入系统 - 目录树持久化契约
// ==========================================
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约束: 每个方法自身是原子的
// ==========================================

use crate::domain::mapping::TargetRecord;
use crate::domain::tree::{NestedInterval, TreeNode};
use crate::repository::error::RepositoryResult;

// ==========================================
// CatalogTreeRepository Trait
// ==========================================
// 用途: Tree Persister / Nested Set Rebuilder 所需的存储接口
// 实现者: SqliteCatalogTreeRepository, InMemoryCatalogTreeRepository
pub trait CatalogTreeRepository: Send + Sync {
    /// 创建节点（lft = rgt = 0）
    ///
    /// # 返回
    /// - Ok(i64): 新节点 ID
    fn create_node(&self, parent_id: i64) -> RepositoryResult<i64>;

    /// 更新节点区间
    fn update_interval(&self, node_id: i64, lft: i64, rgt: i64) -> RepositoryResult<()>;

    /// 更新节点父节点
    fn update_parent(&self, node_id: i64, parent_id: i64) -> RepositoryResult<()>;

    /// 按 ID 查询节点
    fn find_node(&self, node_id: i64) -> RepositoryResult<Option<TreeNode>>;

    /// 列出整棵目标树的全部节点（按 ID 升序）
    fn list_nodes(&self) -> RepositoryResult<Vec<TreeNode>>;

    /// 保存节点描述字段（覆盖写）
    fn save_record(&self, node_id: i64, record: &TargetRecord) -> RepositoryResult<()>;

    /// 读取节点描述字段
    fn find_record(&self, node_id: i64) -> RepositoryResult<Option<TargetRecord>>;

    /// 按来源 legacyId 查询已导入节点
    fn find_keymap(&self, source_name: &str, legacy_id: &str) -> RepositoryResult<Option<i64>>;

    /// 登记 legacyId → 节点 ID（已存在则覆盖）
    fn save_keymap(&self, source_name: &str, legacy_id: &str, node_id: i64) -> RepositoryResult<()>;

    /// 建节点 + 写描述字段 + 登记 keymap，整体成功或整体不生效
    ///
    /// # 返回
    /// - Ok(i64): 新节点 ID
    fn create_node_with_record(
        &self,
        parent_id: i64,
        record: &TargetRecord,
        source_name: &str,
        legacy_id: &str,
    ) -> RepositoryResult<i64>;

    /// 改挂（parent_id 为 None 时保持原父节点）+ 覆盖描述字段，整体成功或整体不生效
    fn update_node_with_record(
        &self,
        node_id: i64,
        parent_id: Option<i64>,
        record: &TargetRecord,
    ) -> RepositoryResult<()>;

    /// 批量写入区间
    ///
    /// 默认逐条调用 update_interval；支持事务的实现应覆写为整体提交
    fn apply_intervals(&self, intervals: &[NestedInterval]) -> RepositoryResult<()> {
        for interval in intervals {
            self.update_interval(interval.node_id, interval.lft, interval.rgt)?;
        }
        Ok(())
    }
}
