// ==========================================
// 档案目录树导入系统 - 层级重建
// ==========================================
// 职责: 由 legacyId / parentId 推导处理顺序（父在子前）
// 输入: 一个批次的全部映射结果（有序）
// 输出: HierarchyPlan（每个 legacyId 恰好出现一次）
// ==========================================
// 红线: 显式栈 + visited 集合，不用递归
// 红线: 环不报错，只记录入口节点，由持久化阶段挂到默认父节点
// ==========================================

use crate::domain::hierarchy::{
    DuplicateLegacyId, HierarchyNode, HierarchyPlan, SYNTHETIC_LEGACY_ID_PREFIX,
};
use crate::domain::mapping::TargetRecord;
use crate::domain::types::DuplicateLegacyIdPolicy;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

// ==========================================
// HierarchyBuilder - 层级重建器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyBuilder {
    policy: DuplicateLegacyIdPolicy,
}

impl HierarchyBuilder {
    pub fn new(policy: DuplicateLegacyIdPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicateLegacyIdPolicy {
        self.policy
    }

    /// 构建处理顺序
    pub fn build(&self, records: &[TargetRecord]) -> HierarchyPlan {
        let mut plan = HierarchyPlan::default();

        // ===== 1. 去重，建立 legacyId → 槽位 =====
        let mut slots: Vec<Option<HierarchyNode>> = Vec::with_capacity(records.len());
        let mut by_legacy_id: HashMap<String, usize> = HashMap::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let legacy_id = record
                .legacy_id()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}{}", SYNTHETIC_LEGACY_ID_PREFIX, index));
            let node = HierarchyNode {
                parent_legacy_id: record.parent_legacy_id().map(str::to_string),
                legacy_id: legacy_id.clone(),
                record: record.clone(),
                source_index: index,
            };

            match by_legacy_id.get(&legacy_id).copied() {
                None => {
                    by_legacy_id.insert(legacy_id, slots.len());
                    slots.push(Some(node));
                }
                Some(existing_slot) => {
                    let existing_index = slots[existing_slot]
                        .as_ref()
                        .map(|n| n.source_index)
                        .unwrap_or(index);
                    let duplicate = match self.policy {
                        DuplicateLegacyIdPolicy::Override => {
                            slots[existing_slot] = None;
                            by_legacy_id.insert(legacy_id.clone(), slots.len());
                            slots.push(Some(node));
                            DuplicateLegacyId {
                                legacy_id,
                                kept_index: index,
                                dropped_index: existing_index,
                            }
                        }
                        DuplicateLegacyIdPolicy::Reject => DuplicateLegacyId {
                            legacy_id,
                            kept_index: existing_index,
                            dropped_index: index,
                        },
                    };
                    warn!(
                        legacy_id = %duplicate.legacy_id,
                        kept = duplicate.kept_index,
                        dropped = duplicate.dropped_index,
                        policy = %self.policy,
                        "同批次 legacyId 重复"
                    );
                    plan.duplicates.push(duplicate);
                }
            }
        }

        // 存活槽位（输入顺序）
        let live: Vec<usize> = (0..slots.len()).filter(|s| slots[*s].is_some()).collect();

        // ===== 2. 子节点表 + 根节点 =====
        let mut parent_slot: HashMap<usize, usize> = HashMap::new();
        let mut children_of: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut roots: Vec<usize> = Vec::new();

        for &slot in &live {
            let Some(node) = slots[slot].as_ref() else {
                continue;
            };
            match node.parent_legacy_id.as_deref() {
                None => roots.push(slot),
                Some(parent) => match by_legacy_id.get(parent) {
                    Some(&p) => {
                        parent_slot.insert(slot, p);
                        children_of.entry(p).or_default().push(slot);
                    }
                    None => {
                        debug!(
                            legacy_id = %node.legacy_id,
                            parent_legacy_id = %parent,
                            "父节点不在本批次"
                        );
                        plan.dangling_parents
                            .push((node.legacy_id.clone(), parent.to_string()));
                        roots.push(slot);
                    }
                },
            }
        }

        // ===== 3. 从根节点深度优先（先序）=====
        let mut visited: HashSet<usize> = HashSet::with_capacity(live.len());
        let mut order: Vec<usize> = Vec::with_capacity(live.len());

        for &root in &roots {
            Self::traverse(root, &children_of, &mut visited, &mut order);
        }

        // ===== 4. 自闭合环：沿父链上溯找到入口，再从入口遍历 =====
        for &slot in &live {
            if visited.contains(&slot) {
                continue;
            }

            let mut seen: HashSet<usize> = HashSet::new();
            let mut entry = slot;
            while seen.insert(entry) {
                match parent_slot.get(&entry) {
                    Some(&p) if !visited.contains(&p) => entry = p,
                    _ => break,
                }
            }

            if let Some(node) = slots[entry].as_ref() {
                warn!(legacy_id = %node.legacy_id, "检测到层级环，入口节点将挂到默认父节点");
                plan.cycle_entries.push(node.legacy_id.clone());
            }
            Self::traverse(entry, &children_of, &mut visited, &mut order);
        }

        // ===== 5. 按顺序取出节点 =====
        plan.nodes = order
            .into_iter()
            .filter_map(|slot| slots[slot].take())
            .collect();

        info!(
            input = records.len(),
            planned = plan.nodes.len(),
            duplicates = plan.duplicates.len(),
            dangling = plan.dangling_parents.len(),
            cycles = plan.cycle_entries.len(),
            "层级重建完成"
        );
        plan
    }

    // 显式栈先序遍历；子节点按输入顺序出栈
    fn traverse(
        start: usize,
        children_of: &HashMap<usize, Vec<usize>>,
        visited: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) {
        let mut stack = vec![start];
        while let Some(slot) = stack.pop() {
            if !visited.insert(slot) {
                continue;
            }
            order.push(slot);
            if let Some(kids) = children_of.get(&slot) {
                for kid in kids.iter().rev() {
                    if !visited.contains(kid) {
                        stack.push(*kid);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(legacy_id: &str, parent: &str) -> TargetRecord {
        let mut r = TargetRecord::new();
        if !legacy_id.is_empty() {
            r.insert("legacyId", legacy_id);
        }
        if !parent.is_empty() {
            r.insert("parentId", parent);
        }
        r.insert("title", format!("T-{}", legacy_id));
        r
    }

    fn ids(plan: &HierarchyPlan) -> Vec<&str> {
        plan.nodes.iter().map(|n| n.legacy_id.as_str()).collect()
    }

    #[test]
    fn test_children_before_parents_in_input_are_reordered() {
        let records = vec![rec("C", "B"), rec("B", "A"), rec("A", "")];
        let plan = HierarchyBuilder::default().build(&records);

        assert_eq!(ids(&plan), vec!["A", "B", "C"]);
        assert!(plan.cycle_entries.is_empty());
        assert!(plan.dangling_parents.is_empty());
    }

    #[test]
    fn test_preorder_with_children_in_input_order() {
        let records = vec![
            rec("A", ""),
            rec("A2", "A"),
            rec("B", ""),
            rec("A1", "A"),
            rec("A2x", "A2"),
        ];
        let plan = HierarchyBuilder::default().build(&records);
        assert_eq!(ids(&plan), vec!["A", "A2", "A2x", "A1", "B"]);
    }

    #[test]
    fn test_two_node_cycle_terminates() {
        let records = vec![rec("X", "Y"), rec("Y", "X")];
        let plan = HierarchyBuilder::default().build(&records);

        assert_eq!(plan.len(), 2);
        let mut seen = ids(&plan);
        seen.sort();
        assert_eq!(seen, vec!["X", "Y"]);
        assert_eq!(plan.cycle_entries.len(), 1);
    }

    #[test]
    fn test_cycle_descendants_follow_their_parents() {
        // X <-> Y 成环，Z 挂在 Y 下
        let records = vec![rec("Z", "Y"), rec("X", "Y"), rec("Y", "X")];
        let plan = HierarchyBuilder::default().build(&records);

        assert_eq!(plan.len(), 3);
        let y = plan.position_of("Y").unwrap();
        let z = plan.position_of("Z").unwrap();
        assert!(y < z);
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let records = vec![rec("S", "S")];
        let plan = HierarchyBuilder::default().build(&records);
        assert_eq!(ids(&plan), vec!["S"]);
        assert_eq!(plan.cycle_entries, vec!["S".to_string()]);
    }

    #[test]
    fn test_dangling_parent_is_a_root() {
        let records = vec![rec("A", "EXT-1"), rec("B", "A")];
        let plan = HierarchyBuilder::default().build(&records);

        assert_eq!(ids(&plan), vec!["A", "B"]);
        assert_eq!(
            plan.dangling_parents,
            vec![("A".to_string(), "EXT-1".to_string())]
        );
    }

    #[test]
    fn test_synthetic_legacy_id_from_position() {
        let records = vec![rec("", ""), rec("B", "record_0")];
        let plan = HierarchyBuilder::default().build(&records);
        assert_eq!(ids(&plan), vec!["record_0", "B"]);
    }

    #[test]
    fn test_duplicate_override_keeps_last() {
        let mut second = rec("A", "");
        second.insert("title", "second");
        let records = vec![rec("A", ""), rec("B", "A"), second];
        let plan = HierarchyBuilder::new(DuplicateLegacyIdPolicy::Override).build(&records);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.nodes[0].record.get("title"), Some("second"));
        assert_eq!(ids(&plan), vec!["A", "B"]);
        assert_eq!(
            plan.duplicates,
            vec![DuplicateLegacyId {
                legacy_id: "A".to_string(),
                kept_index: 2,
                dropped_index: 0,
            }]
        );
    }

    #[test]
    fn test_duplicate_reject_keeps_first() {
        let mut second = rec("A", "");
        second.insert("title", "second");
        let records = vec![rec("A", ""), second];
        let plan = HierarchyBuilder::new(DuplicateLegacyIdPolicy::Reject).build(&records);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.nodes[0].record.get("title"), Some("T-A"));
        assert_eq!(plan.duplicates[0].kept_index, 0);
        assert_eq!(plan.duplicates[0].dropped_index, 1);
    }

    #[test]
    fn test_every_acyclic_edge_is_parent_first() {
        // 逆序输入的多叉树
        let mut records = Vec::new();
        for i in (1..200).rev() {
            records.push(rec(&format!("N{}", i), &format!("N{}", i / 3)));
        }
        records.push(rec("N0", ""));

        let plan = HierarchyBuilder::default().build(&records);
        assert_eq!(plan.len(), 200);
        for node in &plan.nodes {
            if let Some(parent) = node.parent_legacy_id.as_deref() {
                if node.legacy_id == "N0" {
                    continue;
                }
                assert!(plan.position_of(parent).unwrap() < plan.position_of(&node.legacy_id).unwrap());
            }
        }
    }
}
