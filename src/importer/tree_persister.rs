// ==========================================
// 档案目录树导入系统 - 目录树落库
// ==========================================
// 职责: 按层级顺序逐个创建/更新节点，维护 legacyId → 节点 ID
// 父节点解析顺序:
//   1. 本次运行的 ReferenceMap
//   2. 父节点不在本批次时，查历史 keymap
//   3. 默认父节点
// ==========================================
// 红线: 新建节点 lft=rgt=0，区间由重算引擎统一写入
// 红线: 单条记录失败只计数，不中断导入
// ==========================================

use crate::domain::hierarchy::{HierarchyNode, HierarchyPlan};
use crate::domain::import::{ImportOptions, ImportSummary};
use crate::importer::cancellation::CancellationFlag;
use crate::importer::enrichment::EnrichmentDispatcher;
use crate::importer::error::RecordIssue;
use crate::repository::{CatalogTreeRepository, RepositoryResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

// ==========================================
// ReferenceMap - 运行内 legacyId → 节点 ID
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ReferenceMap {
    ids: HashMap<String, i64>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, legacy_id: &str) -> Option<i64> {
        self.ids.get(legacy_id).copied()
    }

    pub fn register(&mut self, legacy_id: impl Into<String>, node_id: i64) {
        self.ids.insert(legacy_id.into(), node_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// 落库阶段结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Completed,
    /// 在第 processed 个节点之后收到取消
    Cancelled { processed: usize },
}

// 单节点结果
enum NodeAction {
    Created(i64),
    Updated(i64),
}

// ==========================================
// TreePersister - 目录树落库
// ==========================================
pub struct TreePersister<'a, R>
where
    R: CatalogTreeRepository + ?Sized,
{
    repo: &'a R,
    options: &'a ImportOptions,
    enrichment: Option<&'a EnrichmentDispatcher>,
}

impl<'a, R> TreePersister<'a, R>
where
    R: CatalogTreeRepository + ?Sized,
{
    pub fn new(repo: &'a R, options: &'a ImportOptions) -> Self {
        Self {
            repo,
            options,
            enrichment: None,
        }
    }

    pub fn with_enrichment(mut self, dispatcher: &'a EnrichmentDispatcher) -> Self {
        self.enrichment = Some(dispatcher);
        self
    }

    /// 按计划顺序落库
    ///
    /// 计数与非致命错误写入 summary；每个节点之前检查取消标志
    pub fn persist(
        &self,
        plan: &HierarchyPlan,
        refs: &mut ReferenceMap,
        summary: &mut ImportSummary,
        cancel: &CancellationFlag,
    ) -> PersistOutcome {
        let in_batch: HashSet<&str> = plan.nodes.iter().map(|n| n.legacy_id.as_str()).collect();

        for (processed, node) in plan.nodes.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(processed, remaining = plan.len() - processed, "收到取消请求，停止落库");
                return PersistOutcome::Cancelled { processed };
            }

            let parent_id = self.resolve_parent(node, &in_batch, refs, summary);
            match self.persist_node(node, parent_id, refs, summary) {
                Ok(NodeAction::Created(node_id)) => {
                    summary.created += 1;
                    self.enrich(node_id, node, summary);
                }
                Ok(NodeAction::Updated(node_id)) => {
                    summary.updated += 1;
                    self.enrich(node_id, node, summary);
                }
                Err(e) => {
                    warn!(legacy_id = %node.legacy_id, error = %e, "节点落库失败");
                    let issue = RecordIssue::Persistence {
                        legacy_id: node.legacy_id.clone(),
                        message: e.to_string(),
                    };
                    summary.push_error(issue.to_string());
                }
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            errors = summary.error_count(),
            "目录树落库完成"
        );
        PersistOutcome::Completed
    }

    fn resolve_parent(
        &self,
        node: &HierarchyNode,
        in_batch: &HashSet<&str>,
        refs: &ReferenceMap,
        summary: &mut ImportSummary,
    ) -> i64 {
        let default_parent = self.options.default_parent_id;
        let Some(parent_legacy_id) = node.parent_legacy_id.as_deref() else {
            return default_parent;
        };

        if let Some(parent_id) = refs.get(parent_legacy_id) {
            return parent_id;
        }

        if in_batch.contains(parent_legacy_id) {
            // 父节点在本批次但尚未创建：环入口，或父节点落库失败
            let issue = RecordIssue::HierarchyCycleOrOrphan {
                legacy_id: node.legacy_id.clone(),
                parent_legacy_id: parent_legacy_id.to_string(),
            };
            warn!(legacy_id = %node.legacy_id, parent_legacy_id, "父节点尚未创建，挂到默认父节点");
            summary.push_error(issue.to_string());
            return default_parent;
        }

        match self
            .repo
            .find_keymap(&self.options.keymap_source_name, parent_legacy_id)
        {
            Ok(Some(parent_id)) => {
                debug!(legacy_id = %node.legacy_id, parent_legacy_id, parent_id, "父节点命中历史 keymap");
                parent_id
            }
            Ok(None) => {
                debug!(legacy_id = %node.legacy_id, parent_legacy_id, "父节点未导入过，挂到默认父节点");
                default_parent
            }
            Err(e) => {
                warn!(legacy_id = %node.legacy_id, error = %e, "keymap 查询失败，挂到默认父节点");
                default_parent
            }
        }
    }

    fn persist_node(
        &self,
        node: &HierarchyNode,
        parent_id: i64,
        refs: &mut ReferenceMap,
        summary: &mut ImportSummary,
    ) -> RepositoryResult<NodeAction> {
        let source = self.options.keymap_source_name.as_str();

        if self.options.update_existing {
            if let Some(existing_id) = self.repo.find_keymap(source, &node.legacy_id)? {
                if self.repo.find_node(existing_id)?.is_some() {
                    let new_parent = if self.is_self_or_descendant(parent_id, existing_id)? {
                        let issue = RecordIssue::ReparentWouldCycle {
                            legacy_id: node.legacy_id.clone(),
                            node_id: existing_id,
                            parent_id,
                        };
                        warn!(legacy_id = %node.legacy_id, existing_id, parent_id, "改挂会形成环，保持原父节点");
                        summary.push_error(issue.to_string());
                        None
                    } else {
                        Some(parent_id)
                    };
                    // 改挂与覆盖描述同一事务，失败时节点保持原状
                    self.repo
                        .update_node_with_record(existing_id, new_parent, &node.record)?;
                    refs.register(node.legacy_id.clone(), existing_id);
                    debug!(legacy_id = %node.legacy_id, node_id = existing_id, parent_id, "节点已更新");
                    return Ok(NodeAction::Updated(existing_id));
                }
            }
        }

        // 建节点、描述、keymap 同一事务，失败时不留下孤立节点
        let node_id = self
            .repo
            .create_node_with_record(parent_id, &node.record, source, &node.legacy_id)?;
        refs.register(node.legacy_id.clone(), node_id);
        debug!(legacy_id = %node.legacy_id, node_id, parent_id, "节点已创建");
        Ok(NodeAction::Created(node_id))
    }

    // candidate 是否为 ancestor 本身或其后代（沿父链上溯）
    fn is_self_or_descendant(&self, candidate: i64, ancestor: i64) -> RepositoryResult<bool> {
        let mut seen = HashSet::new();
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                break;
            }
            current = self.repo.find_node(id)?.and_then(|n| n.parent_id);
        }
        Ok(false)
    }

    fn enrich(&self, node_id: i64, node: &HierarchyNode, summary: &mut ImportSummary) {
        if let Some(dispatcher) = self.enrichment {
            dispatcher.dispatch(node_id, &node.record, summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::TargetRecord;
    use crate::domain::tree::ROOT_NODE_ID;
    use crate::domain::types::DuplicateLegacyIdPolicy;
    use crate::importer::hierarchy_builder::HierarchyBuilder;
    use crate::repository::InMemoryCatalogTreeRepository;

    fn rec(legacy_id: &str, parent: &str) -> TargetRecord {
        let mut r = TargetRecord::new();
        r.insert("legacyId", legacy_id);
        if !parent.is_empty() {
            r.insert("parentId", parent);
        }
        r
    }

    fn plan(records: &[TargetRecord]) -> HierarchyPlan {
        HierarchyBuilder::new(DuplicateLegacyIdPolicy::Override).build(records)
    }

    fn parent_of(repo: &InMemoryCatalogTreeRepository, node_id: i64) -> Option<i64> {
        parent_of_in(repo, node_id)
    }

    fn parent_of_in<R: CatalogTreeRepository>(repo: &R, node_id: i64) -> Option<i64> {
        repo.find_node(node_id).unwrap().unwrap().parent_id
    }

    #[test]
    fn test_chain_is_linked_through_reference_map() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions::default();
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");

        let outcome = TreePersister::new(&repo, &options).persist(
            &plan(&[rec("C", "B"), rec("A", ""), rec("B", "A")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(outcome, PersistOutcome::Completed);
        assert_eq!(summary.created, 3);
        assert_eq!(summary.error_count(), 0);

        let (a, b, c) = (
            refs.get("A").unwrap(),
            refs.get("B").unwrap(),
            refs.get("C").unwrap(),
        );
        assert_eq!(parent_of(&repo, a), Some(ROOT_NODE_ID));
        assert_eq!(parent_of(&repo, b), Some(a));
        assert_eq!(parent_of(&repo, c), Some(b));

        let created = repo.find_node(c).unwrap().unwrap();
        assert_eq!((created.lft, created.rgt), (0, 0));
        assert_eq!(repo.find_keymap("migration", "C").unwrap(), Some(c));
    }

    #[test]
    fn test_cycle_entry_falls_back_to_default_parent() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions::default();
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");

        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("X", "Y"), rec("Y", "X")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(summary.created, 2);
        assert_eq!(summary.error_count(), 1);
        let (x, y) = (refs.get("X").unwrap(), refs.get("Y").unwrap());
        assert_eq!(parent_of(&repo, x), Some(ROOT_NODE_ID));
        assert_eq!(parent_of(&repo, y), Some(x));
    }

    #[test]
    fn test_external_parent_resolved_from_keymap() {
        let repo = InMemoryCatalogTreeRepository::new();
        let earlier = repo.create_node(ROOT_NODE_ID).unwrap();
        repo.save_keymap("migration", "FONDS-1", earlier).unwrap();

        let options = ImportOptions::default();
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");
        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("S1", "FONDS-1"), rec("S2", "UNKNOWN")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(parent_of(&repo, refs.get("S1").unwrap()), Some(earlier));
        assert_eq!(parent_of(&repo, refs.get("S2").unwrap()), Some(ROOT_NODE_ID));
        assert_eq!(summary.error_count(), 0);
    }

    #[test]
    fn test_persistence_error_is_counted_and_skipped() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions {
            default_parent_id: 999, // 不存在
            ..ImportOptions::default()
        };
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");
        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("A", ""), rec("B", "A")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        // A 落库失败；B 找不到已创建的父节点，再退回默认父节点也失败
        assert_eq!(summary.created, 0);
        assert_eq!(summary.error_count(), 3);
        assert!(refs.is_empty());
    }

    // 指定 legacyId 的原子写入失败，其余委托给内存实现
    struct RejectingRepository {
        inner: InMemoryCatalogTreeRepository,
        rejected: &'static str,
    }

    impl RejectingRepository {
        fn rejection(&self) -> crate::repository::RepositoryError {
            crate::repository::RepositoryError::DatabaseQueryError(format!(
                "record rejected: {}",
                self.rejected
            ))
        }
    }

    impl CatalogTreeRepository for RejectingRepository {
        fn create_node(&self, parent_id: i64) -> RepositoryResult<i64> {
            self.inner.create_node(parent_id)
        }
        fn update_interval(&self, node_id: i64, lft: i64, rgt: i64) -> RepositoryResult<()> {
            self.inner.update_interval(node_id, lft, rgt)
        }
        fn update_parent(&self, node_id: i64, parent_id: i64) -> RepositoryResult<()> {
            self.inner.update_parent(node_id, parent_id)
        }
        fn find_node(&self, node_id: i64) -> RepositoryResult<Option<crate::domain::tree::TreeNode>> {
            self.inner.find_node(node_id)
        }
        fn list_nodes(&self) -> RepositoryResult<Vec<crate::domain::tree::TreeNode>> {
            self.inner.list_nodes()
        }
        fn save_record(&self, node_id: i64, record: &TargetRecord) -> RepositoryResult<()> {
            if record.legacy_id() == Some(self.rejected) {
                return Err(self.rejection());
            }
            self.inner.save_record(node_id, record)
        }
        fn find_record(&self, node_id: i64) -> RepositoryResult<Option<TargetRecord>> {
            self.inner.find_record(node_id)
        }
        fn find_keymap(&self, source_name: &str, legacy_id: &str) -> RepositoryResult<Option<i64>> {
            self.inner.find_keymap(source_name, legacy_id)
        }
        fn save_keymap(&self, source_name: &str, legacy_id: &str, node_id: i64) -> RepositoryResult<()> {
            self.inner.save_keymap(source_name, legacy_id, node_id)
        }
        fn create_node_with_record(
            &self,
            parent_id: i64,
            record: &TargetRecord,
            source_name: &str,
            legacy_id: &str,
        ) -> RepositoryResult<i64> {
            if legacy_id == self.rejected {
                return Err(self.rejection());
            }
            self.inner
                .create_node_with_record(parent_id, record, source_name, legacy_id)
        }
        fn update_node_with_record(
            &self,
            node_id: i64,
            parent_id: Option<i64>,
            record: &TargetRecord,
        ) -> RepositoryResult<()> {
            if record.legacy_id() == Some(self.rejected) {
                return Err(self.rejection());
            }
            self.inner.update_node_with_record(node_id, parent_id, record)
        }
    }

    #[test]
    fn test_failed_record_write_leaves_no_orphan_node() {
        let repo = RejectingRepository {
            inner: InMemoryCatalogTreeRepository::new(),
            rejected: "A",
        };
        let options = ImportOptions::default();
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");

        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("A", ""), rec("B", "A")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        // 树中节点 = 根 + 计入 created 的节点，且每个都有描述
        let nodes = repo.list_nodes().unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(nodes.len(), 1 + summary.created);
        for node in nodes.iter().filter(|n| n.id != ROOT_NODE_ID) {
            assert!(repo.find_record(node.id).unwrap().is_some());
        }
        assert_eq!(refs.get("A"), None);
        assert_eq!(repo.find_keymap("migration", "A").unwrap(), None);
        // A 落库失败 + B 退回默认父节点
        assert_eq!(summary.error_count(), 2);
        assert_eq!(parent_of_in(&repo, refs.get("B").unwrap()), Some(ROOT_NODE_ID));
    }

    #[test]
    fn test_failed_update_keeps_original_parent() {
        let repo = RejectingRepository {
            inner: InMemoryCatalogTreeRepository::new(),
            rejected: "B",
        };
        let a = repo.inner.create_node(ROOT_NODE_ID).unwrap();
        let b = repo.inner.create_node(ROOT_NODE_ID).unwrap();
        repo.inner.save_keymap("migration", "A", a).unwrap();
        repo.inner.save_keymap("migration", "B", b).unwrap();

        let options = ImportOptions {
            update_existing: true,
            ..ImportOptions::default()
        };
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");
        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("B", "A")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(summary.updated, 0);
        assert_eq!(summary.error_count(), 1);
        assert_eq!(parent_of_in(&repo, b), Some(ROOT_NODE_ID));
    }

    #[test]
    fn test_update_existing_reparents_instead_of_creating() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions::default();
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("first");
        let persister = TreePersister::new(&repo, &options);
        persister.persist(
            &plan(&[rec("A", ""), rec("B", "")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );
        let (a, b) = (refs.get("A").unwrap(), refs.get("B").unwrap());

        let options = ImportOptions {
            update_existing: true,
            ..ImportOptions::default()
        };
        let mut moved = rec("B", "A");
        moved.insert("title", "moved");
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("second");
        TreePersister::new(&repo, &options).persist(
            &plan(&[moved]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(summary.created, 0);
        assert_eq!(summary.updated, 1);
        assert_eq!(refs.get("B"), Some(b));
        assert_eq!(parent_of(&repo, b), Some(a));
        assert_eq!(
            repo.find_record(b).unwrap().unwrap().get("title"),
            Some("moved")
        );
    }

    #[test]
    fn test_update_existing_refuses_to_reparent_under_descendant() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions {
            update_existing: true,
            ..ImportOptions::default()
        };
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("first");
        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("A", ""), rec("B", "A")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );
        let (a, b) = (refs.get("A").unwrap(), refs.get("B").unwrap());

        // 第二次运行把 A 挂到 B 下
        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("second");
        TreePersister::new(&repo, &options).persist(
            &plan(&[rec("A", "B")]),
            &mut refs,
            &mut summary,
            &CancellationFlag::new(),
        );

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.error_count(), 1);
        assert_eq!(parent_of(&repo, a), Some(ROOT_NODE_ID));
        assert_eq!(parent_of(&repo, b), Some(a));
    }

    #[test]
    fn test_cancellation_stops_between_nodes() {
        let repo = InMemoryCatalogTreeRepository::new();
        let options = ImportOptions::default();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let mut refs = ReferenceMap::new();
        let mut summary = ImportSummary::new("run");
        let outcome = TreePersister::new(&repo, &options).persist(
            &plan(&[rec("A", "")]),
            &mut refs,
            &mut summary,
            &cancel,
        );

        assert_eq!(outcome, PersistOutcome::Cancelled { processed: 0 });
        assert_eq!(summary.created, 0);
        assert_eq!(repo.list_nodes().unwrap().len(), 1);
    }
}
