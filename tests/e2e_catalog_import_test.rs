// ==========================================
// 目录树导入端到端测试（SQLite）
// ==========================================
// 测试目标: 映射 → 层级 → 落库/增强 → 重算 → 运行记录
// ==========================================


use catalog_import::config::{config_keys, ConfigManager, ImportConfigReader, MappingProfile};
use catalog_import::domain::{
    DuplicateLegacyIdPolicy, ImportOptions, MappingRule, RunStatus, TreeNode, ROOT_NODE_ID,
};
use catalog_import::importer::{CancellationFlag, CatalogImporter, CatalogImporterImpl};
use catalog_import::logging;
use catalog_import::repository::{
    CatalogTreeRepository, EnrichmentRepository, ImportRunRepository,
    SqliteCatalogTreeRepository,
};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use test_helpers::{
    basic_profile, check_nested_set, create_test_db, index_nodes, is_ancestor, shared_connection,
    table,
};

struct Fixture {
    _tmp: tempfile::NamedTempFile,
    conn: Arc<Mutex<Connection>>,
    importer: CatalogImporterImpl<SqliteCatalogTreeRepository>,
}

impl Fixture {
    fn new() -> Self {
        logging::init_test();
        let (tmp, db_path) = create_test_db().unwrap();
        let conn = shared_connection(&db_path);
        let importer = CatalogImporterImpl::from_connection(conn.clone());
        Self {
            _tmp: tmp,
            conn,
            importer,
        }
    }

    fn repo(&self) -> &SqliteCatalogTreeRepository {
        self.importer.tree_repository()
    }

    fn node_of(&self, legacy_id: &str) -> TreeNode {
        let source = ImportOptions::default().keymap_source_name;
        let node_id = self
            .repo()
            .find_keymap(&source, legacy_id)
            .unwrap()
            .unwrap_or_else(|| panic!("{legacy_id} 未落库"));
        self.repo().find_node(node_id).unwrap().unwrap()
    }

    fn nodes(&self) -> Vec<TreeNode> {
        self.repo().list_nodes().unwrap()
    }

    async fn import(
        &self,
        rows: &[&[&str]],
        options: &ImportOptions,
    ) -> catalog_import::ImportSummary {
        self.importer
            .import_table(
                table(&["ID", "Parent", "Title"], rows),
                &basic_profile(),
                options,
                &CancellationFlag::new(),
            )
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_chain_under_fresh_root() {
    let fx = Fixture::new();

    let summary = fx
        .import(
            &[&["A", "", "Fonds A"], &["B", "A", "Series B"], &["C", "B", "File C"]],
            &ImportOptions::default(),
        )
        .await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 3);
    assert!(summary.errors.is_empty());
    assert!(summary.rebuilt);

    let root = fx.repo().find_node(ROOT_NODE_ID).unwrap().unwrap();
    let (a, b, c) = (fx.node_of("A"), fx.node_of("B"), fx.node_of("C"));
    assert_eq!((root.lft, root.rgt), (1, 8));
    assert_eq!((a.lft, a.rgt), (2, 7));
    assert_eq!((b.lft, b.rgt), (3, 6));
    assert_eq!((c.lft, c.rgt), (4, 5));

    let record = fx.repo().find_record(b.id).unwrap().unwrap();
    assert_eq!(record.get("title"), Some("Series B"));
}

#[tokio::test]
async fn test_children_before_parents_in_input_still_nest() {
    let fx = Fixture::new();

    let summary = fx
        .import(
            &[
                &["C", "B", "c"],
                &["D", "A", "d"],
                &["B", "A", "b"],
                &["A", "", "a"],
            ],
            &ImportOptions::default(),
        )
        .await;

    assert_eq!(summary.created, 4);
    assert!(summary.errors.is_empty());

    let nodes = fx.nodes();
    check_nested_set(&nodes).unwrap();
    let by_id = index_nodes(&nodes);
    let (a, b, c, d) = (fx.node_of("A"), fx.node_of("B"), fx.node_of("C"), fx.node_of("D"));
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(c.parent_id, Some(b.id));
    assert_eq!(d.parent_id, Some(a.id));
    assert!(is_ancestor(&by_id, a.id, c.id));
}

#[tokio::test]
async fn test_two_node_cycle_is_imported_once_each() {
    let fx = Fixture::new();

    let summary = fx
        .import(&[&["A", "B", "a"], &["B", "A", "b"]], &ImportOptions::default())
        .await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.error_count(), 1);
    assert!(summary.errors[0].contains("环"));

    let nodes = fx.nodes();
    assert_eq!(nodes.len(), 3);
    check_nested_set(&nodes).unwrap();

    // 环入口挂到根，另一个挂到环入口下
    let (a, b) = (fx.node_of("A"), fx.node_of("B"));
    let attached_to_root = [a, b]
        .iter()
        .filter(|n| n.parent_id == Some(ROOT_NODE_ID))
        .count();
    assert_eq!(attached_to_root, 1);
}

#[tokio::test]
async fn test_parent_from_previous_run_is_found_through_keymap() {
    let fx = Fixture::new();
    fx.import(&[&["A", "", "a"]], &ImportOptions::default()).await;

    let summary = fx
        .import(&[&["B", "A", "b"], &["X", "NOWHERE", "x"]], &ImportOptions::default())
        .await;

    assert_eq!(summary.created, 2);
    assert!(summary.errors.is_empty());
    let (a, b, x) = (fx.node_of("A"), fx.node_of("B"), fx.node_of("X"));
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(x.parent_id, Some(ROOT_NODE_ID));
    check_nested_set(&fx.nodes()).unwrap();
}

#[tokio::test]
async fn test_custom_default_parent() {
    let fx = Fixture::new();
    fx.import(&[&["HOLDER", "", "holder"]], &ImportOptions::default()).await;
    let holder = fx.node_of("HOLDER");

    let options = ImportOptions {
        default_parent_id: holder.id,
        ..ImportOptions::default()
    };
    fx.import(&[&["A", "", "a"], &["B", "A", "b"]], &options).await;

    let nodes = fx.nodes();
    check_nested_set(&nodes).unwrap();
    let by_id = index_nodes(&nodes);
    assert_eq!(fx.node_of("A").parent_id, Some(holder.id));
    assert!(is_ancestor(&by_id, holder.id, fx.node_of("B").id));
}

#[tokio::test]
async fn test_update_existing_reparents_and_overwrites() {
    let fx = Fixture::new();
    fx.import(
        &[&["A", "", "a"], &["B", "A", "b"], &["C", "A", "c v1"]],
        &ImportOptions::default(),
    )
    .await;
    let before = fx.nodes().len();

    let options = ImportOptions {
        update_existing: true,
        ..ImportOptions::default()
    };
    let summary = fx.import(&[&["C", "B", "c v2"]], &options).await;

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(fx.nodes().len(), before);

    let (b, c) = (fx.node_of("B"), fx.node_of("C"));
    assert_eq!(c.parent_id, Some(b.id));
    assert!(b.contains(&c));
    assert_eq!(
        fx.repo().find_record(c.id).unwrap().unwrap().get("title"),
        Some("c v2")
    );
    check_nested_set(&fx.nodes()).unwrap();
}

#[tokio::test]
async fn test_update_existing_refuses_to_move_node_under_descendant() {
    let fx = Fixture::new();
    fx.import(&[&["A", "", "a"], &["B", "A", "b"]], &ImportOptions::default())
        .await;

    let options = ImportOptions {
        update_existing: true,
        ..ImportOptions::default()
    };
    let summary = fx.import(&[&["A", "B", "a moved"]], &options).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.error_count(), 1);
    assert_eq!(fx.node_of("A").parent_id, Some(ROOT_NODE_ID));
    check_nested_set(&fx.nodes()).unwrap();
}

// 标题含 marker 的描述写入被拒绝
fn reject_titles_containing(fx: &Fixture, marker: &str) {
    let conn = fx.conn.lock().unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_insert BEFORE INSERT ON node_record
         WHEN NEW.record_json LIKE '%{marker}%'
         BEGIN SELECT RAISE(ABORT, 'record rejected'); END;
         CREATE TRIGGER reject_update BEFORE UPDATE ON node_record
         WHEN NEW.record_json LIKE '%{marker}%'
         BEGIN SELECT RAISE(ABORT, 'record rejected'); END;"
    ))
    .unwrap();
}

#[tokio::test]
async fn test_rejected_record_leaves_no_orphan_node() {
    let fx = Fixture::new();
    reject_titles_containing(&fx, "Broken");

    let summary = fx
        .import(
            &[&["A", "", "Broken A"], &["B", "A", "Series B"]],
            &ImportOptions::default(),
        )
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.errors.len(), 2);

    // 树中节点 = 根 + created，每个非根节点都有描述和 keymap
    let nodes = fx.nodes();
    assert_eq!(nodes.len(), 1 + summary.created);
    for node in nodes.iter().filter(|n| n.id != ROOT_NODE_ID) {
        assert!(fx.repo().find_record(node.id).unwrap().is_some());
    }
    let source = ImportOptions::default().keymap_source_name;
    assert_eq!(fx.repo().find_keymap(&source, "A").unwrap(), None);
    assert_eq!(fx.node_of("B").parent_id, Some(ROOT_NODE_ID));
    check_nested_set(&nodes).unwrap();
}

#[tokio::test]
async fn test_rejected_update_keeps_node_in_place() {
    let fx = Fixture::new();
    fx.import(
        &[&["A", "", "Fonds A"], &["B", "", "Series B"]],
        &ImportOptions::default(),
    )
    .await;
    reject_titles_containing(&fx, "Broken");

    let options = ImportOptions {
        update_existing: true,
        ..ImportOptions::default()
    };
    let summary = fx.import(&[&["B", "A", "Broken B"]], &options).await;

    assert_eq!(summary.updated, 0);
    assert_eq!(summary.errors.len(), 1);
    let b = fx.node_of("B");
    assert_eq!(b.parent_id, Some(ROOT_NODE_ID));
    let record = fx.repo().find_record(b.id).unwrap().unwrap();
    assert_eq!(record.get("title"), Some("Series B"));
}

#[tokio::test]
async fn test_without_update_existing_reimport_creates_new_nodes() {
    let fx = Fixture::new();
    fx.import(&[&["A", "", "a"]], &ImportOptions::default()).await;
    let first = fx.node_of("A");

    let summary = fx.import(&[&["A", "", "a again"]], &ImportOptions::default()).await;

    assert_eq!(summary.created, 1);
    assert_eq!(fx.nodes().len(), 3);
    // keymap 指向最新节点
    assert_ne!(fx.node_of("A").id, first.id);
}

#[tokio::test]
async fn test_duplicate_policy_from_config() {
    let fx = Fixture::new();
    let config = ConfigManager::from_connection(fx.conn.clone()).unwrap();
    config
        .set_global_config_value(config_keys::DUPLICATE_LEGACY_ID_POLICY, "reject")
        .unwrap();

    let options = ImportOptions::from_config(&config).await.unwrap();
    assert_eq!(options.duplicate_policy, DuplicateLegacyIdPolicy::Reject);

    let summary = fx
        .import(&[&["A", "", "first"], &["A", "", "second"]], &options)
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.error_count(), 1);
    let a = fx.node_of("A");
    assert_eq!(
        fx.repo().find_record(a.id).unwrap().unwrap().get("title"),
        Some("first")
    );
}

#[tokio::test]
async fn test_default_duplicate_policy_keeps_last() {
    let fx = Fixture::new();

    let summary = fx
        .import(
            &[&["A", "", "first"], &["A", "", "second"]],
            &ImportOptions::default(),
        )
        .await;

    assert_eq!(summary.created, 1);
    let a = fx.node_of("A");
    assert_eq!(
        fx.repo().find_record(a.id).unwrap().unwrap().get("title"),
        Some("second")
    );
}

#[tokio::test]
async fn test_cancelled_run_creates_nothing_and_is_recorded() {
    let fx = Fixture::new();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let summary = fx
        .importer
        .import_table(
            table(&["ID", "Parent", "Title"], &[&["A", "", "a"]]),
            &basic_profile(),
            &ImportOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.created, 0);
    assert!(!summary.rebuilt);
    assert_eq!(fx.nodes().len(), 1);

    let run = ImportRunRepository::from_connection(fx.conn.clone())
        .find_by_id(&summary.run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let fx = Fixture::new();
    let options = ImportOptions {
        dry_run: true,
        ..ImportOptions::default()
    };

    let summary = fx.import(&[&["A", "", "a"], &["B", "A", "b"]], &options).await;

    assert_eq!(summary.status, RunStatus::DryRun);
    assert_eq!(summary.planned, 2);
    assert_eq!(fx.nodes().len(), 1);
    let runs = ImportRunRepository::from_connection(fx.conn.clone())
        .list_recent(10)
        .unwrap();
    assert!(runs.is_empty());
}

#[tokio::test]
async fn test_completed_run_is_recorded() {
    let fx = Fixture::new();
    let options = ImportOptions {
        file_name: Some("catalog.csv".to_string()),
        ..ImportOptions::default()
    };

    let summary = fx
        .import(&[&["A", "", "a"], &["", "", ""], &["B", "A", "b"]], &options)
        .await;

    let run = ImportRunRepository::from_connection(fx.conn.clone())
        .find_by_id(&summary.run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.file_name.as_deref(), Some("catalog.csv"));
    assert_eq!(run.total_rows, 3);
    assert_eq!(run.created, 2);
    assert_eq!(run.skipped, 1);
    assert_eq!(run.error_count, 0);
    assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn test_enrichment_failures_do_not_block_nodes() {
    let fx = Fixture::new();
    let mut rules = basic_profile().rules;
    rules.push(MappingRule::direct("Security", "extSecurityClassification"));
    rules.push(MappingRule::direct("Rights", "extRightsStatement"));
    let profile = MappingProfile::new("enriched", rules);

    let summary = fx
        .importer
        .import_table(
            table(
                &["ID", "Parent", "Title", "Security", "Rights"],
                &[
                    &["A", "", "a", "Confidential", "Open access"],
                    &["B", "A", "b", "ultra", ""],
                    &["C", "A", "c", "", ""],
                ],
            ),
            &profile,
            &ImportOptions::default(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 3);
    assert_eq!(summary.error_count(), 1);

    let security = &summary.enrichment["security_classification"];
    assert_eq!((security.applied, security.failed), (1, 1));
    let rights = &summary.enrichment["rights"];
    assert_eq!((rights.applied, rights.failed), (1, 0));
    assert!(!summary.enrichment.contains_key("provenance"));

    let enrichment_repo = EnrichmentRepository::from_connection(fx.conn.clone());
    let a = fx.node_of("A");
    assert_eq!(
        enrichment_repo.find_security_classification(a.id).unwrap(),
        Some((3, "Confidential".to_string()))
    );
    assert_eq!(enrichment_repo.count_for_node(a.id).unwrap(), (1, 0));
    assert_eq!(
        enrichment_repo
            .find_security_classification(fx.node_of("B").id)
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_import_from_csv_file_with_profile_from_config() {
    let fx = Fixture::new();
    let config = ConfigManager::from_connection(fx.conn.clone()).unwrap();
    config.save_mapping_profile(&basic_profile()).unwrap();

    let profile = config.get_mapping_profile("basic").await.unwrap().unwrap();
    assert_eq!(profile, basic_profile());

    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "ID,Parent,Title\nA,,Fonds\nB,A,\"Series, one\"\n").unwrap();
    file.flush().unwrap();

    let summary = fx
        .importer
        .import_from_file(
            file.path(),
            &profile,
            &ImportOptions::default(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.created, 2);
    let b = fx.node_of("B");
    assert_eq!(
        fx.repo().find_record(b.id).unwrap().unwrap().get("title"),
        Some("Series, one")
    );

    let run = ImportRunRepository::from_connection(fx.conn.clone())
        .find_by_id(&summary.run_id)
        .unwrap()
        .unwrap();
    let expected_name = file.path().file_name().unwrap().to_str().unwrap();
    assert_eq!(run.file_name.as_deref(), Some(expected_name));
}

#[tokio::test]
async fn test_batch_import_continues_after_bad_file() {
    let fx = Fixture::new();
    let mut good = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(good, "ID,Parent,Title\nA,,a\n").unwrap();
    good.flush().unwrap();
    let missing = good.path().with_file_name("does_not_exist.csv");

    let results = fx
        .importer
        .batch_import(
            vec![missing, good.path().to_path_buf()],
            &basic_profile(),
            &ImportOptions::default(),
            &CancellationFlag::new(),
        )
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().unwrap().created, 1);
}

#[tokio::test]
async fn test_many_imports_keep_tree_valid() {
    let fx = Fixture::new();

    // 每批挂到上一批的叶子下
    let mut last_leaf = String::new();
    for batch in 0..5 {
        let ids: Vec<String> = (0..4).map(|i| format!("B{batch}N{i}")).collect();
        let rows: Vec<Vec<String>> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let parent = if i == 0 { last_leaf.clone() } else { ids[i - 1].clone() };
                vec![id.clone(), parent, format!("title {id}")]
            })
            .collect();
        let row_refs: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| r.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();

        let summary = fx.import(&slices, &ImportOptions::default()).await;
        assert_eq!(summary.created, 4);
        assert!(summary.errors.is_empty());
        last_leaf = ids[3].clone();
    }

    let nodes = fx.nodes();
    assert_eq!(nodes.len(), 21);
    check_nested_set(&nodes).unwrap();

    let depths: HashMap<i64, i64> = nodes.iter().map(|n| (n.id, n.rgt - n.lft)).collect();
    let deepest = fx.node_of("B4N3");
    assert_eq!(depths[&deepest.id], 1);
    let by_id = index_nodes(&nodes);
    assert!(is_ancestor(&by_id, fx.node_of("B0N0").id, deepest.id));
}
