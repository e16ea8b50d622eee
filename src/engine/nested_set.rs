// ==========================================
// 档案目录树导入系统 - 嵌套集重算引擎
// ==========================================
// 职责: 一次性重算整棵目标树的 lft/rgt
// 输入: 全部节点（不止本批次新建的子树）
// 输出: 每个节点的 (lft, rgt)，满足 P.lft < C.lft < C.rgt < P.rgt
// ==========================================
// 红线: 每次导入运行最多调用一次，不可逐条调用
// 红线: 子节点按内部 ID 升序遍历，保证结果可复现
// ==========================================

use crate::domain::tree::{NestedInterval, TreeNode};
use crate::engine::error::{RebuildError, RebuildResult};
use crate::repository::CatalogTreeRepository;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// 重算结果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildReport {
    pub node_count: usize,
    pub root_count: usize,
    pub max_rgt: i64,
}

// 显式栈帧：Enter 分配 lft，Exit 分配 rgt
enum Frame {
    Enter(i64),
    Exit { node_id: i64, lft: i64 },
}

// ==========================================
// NestedSetRebuilder - 嵌套集重算引擎
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct NestedSetRebuilder;

impl NestedSetRebuilder {
    pub fn new() -> Self {
        Self
    }

    /// 重算并写回整棵树
    ///
    /// # 返回
    /// - Ok(RebuildReport): 重算完成，区间已整体写回
    /// - Err(RebuildError): 致命错误，调用方需整体重试
    #[instrument(skip(self, repo))]
    pub fn rebuild<R>(&self, repo: &R) -> RebuildResult<RebuildReport>
    where
        R: CatalogTreeRepository + ?Sized,
    {
        let nodes = repo.list_nodes().map_err(RebuildError::LoadFailed)?;
        debug!(node_count = nodes.len(), "目录树加载完成");

        let (intervals, root_count) = Self::compute_with_roots(&nodes)?;
        repo.apply_intervals(&intervals)
            .map_err(RebuildError::WriteFailed)?;

        let report = RebuildReport {
            node_count: intervals.len(),
            root_count,
            max_rgt: intervals.iter().map(|i| i.rgt).max().unwrap_or(0),
        };
        info!(
            node_count = report.node_count,
            root_count = report.root_count,
            max_rgt = report.max_rgt,
            "嵌套集重算完成"
        );
        Ok(report)
    }

    /// 纯计算：不读写存储
    pub fn compute(nodes: &[TreeNode]) -> RebuildResult<Vec<NestedInterval>> {
        Self::compute_with_roots(nodes).map(|(intervals, _)| intervals)
    }

    fn compute_with_roots(nodes: &[TreeNode]) -> RebuildResult<(Vec<NestedInterval>, usize)> {
        if nodes.is_empty() {
            return Err(RebuildError::EmptyTree);
        }

        let ids: HashSet<i64> = nodes.iter().map(|n| n.id).collect();

        // 子节点表：按 ID 升序插入，保证稳定顺序
        let mut sorted: Vec<&TreeNode> = nodes.iter().collect();
        sorted.sort_by_key(|n| n.id);

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut roots: BTreeSet<i64> = BTreeSet::new();
        for node in &sorted {
            match node.parent_id {
                Some(parent_id) if parent_id != node.id && ids.contains(&parent_id) => {
                    children.entry(parent_id).or_default().push(node.id);
                }
                Some(parent_id) if parent_id == node.id => {
                    // 自引用节点无法到达，留给下方不可达检查
                }
                Some(parent_id) => {
                    warn!(node_id = node.id, parent_id, "父节点不存在，按根节点处理");
                    roots.insert(node.id);
                }
                None => {
                    roots.insert(node.id);
                }
            }
        }

        if roots.is_empty() {
            return Err(RebuildError::EmptyTree);
        }

        let mut intervals = Vec::with_capacity(nodes.len());
        let mut visited: HashSet<i64> = HashSet::with_capacity(nodes.len());
        let mut counter: i64 = 1;

        for root_id in &roots {
            let mut stack = vec![Frame::Enter(*root_id)];
            while let Some(frame) = stack.pop() {
                match frame {
                    Frame::Enter(node_id) => {
                        if !visited.insert(node_id) {
                            continue;
                        }
                        let lft = counter;
                        counter += 1;
                        stack.push(Frame::Exit { node_id, lft });
                        if let Some(kids) = children.get(&node_id) {
                            // 逆序入栈，出栈即为 ID 升序
                            for kid in kids.iter().rev() {
                                stack.push(Frame::Enter(*kid));
                            }
                        }
                    }
                    Frame::Exit { node_id, lft } => {
                        intervals.push(NestedInterval {
                            node_id,
                            lft,
                            rgt: counter,
                        });
                        counter += 1;
                    }
                }
            }
        }

        if visited.len() != ids.len() {
            let mut unreachable: Vec<i64> = ids.difference(&visited).copied().collect();
            unreachable.sort_unstable();
            return Err(RebuildError::UnreachableNodes(unreachable));
        }

        Ok((intervals, roots.len()))
    }
}
