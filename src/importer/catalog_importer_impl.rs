// ==========================================
// 档案目录树导入系统 - 目录树导入器实现
// ==========================================
// 职责: 整合导入流程，从规范化表格到目录树
// 流程: 映射 → 层级重建 → 逐节点落库(+增强) → 嵌套集重算 → 运行记录
// ==========================================
// 红线: 嵌套集重算每次运行只调用一次，且在全部节点创建之后
// 红线: 重算失败是致命错误，但调用方仍能拿到汇总
// ==========================================

use crate::config::MappingProfile;
use crate::domain::import::{ImportOptions, ImportRun, ImportSummary};
use crate::domain::mapping::SourceTable;
use crate::domain::types::RunStatus;
use crate::engine::NestedSetRebuilder;
use crate::importer::cancellation::CancellationFlag;
use crate::importer::catalog_importer_trait::{CatalogImporter, FileParser};
use crate::importer::enrichment::EnrichmentDispatcher;
use crate::importer::error::{ImportError, ImportResult, RecordIssue};
use crate::importer::field_mapper::{FieldMapper, MappingOutcome};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::hierarchy_builder::HierarchyBuilder;
use crate::importer::tree_persister::{PersistOutcome, ReferenceMap, TreePersister};
use crate::repository::{
    CatalogTreeRepository, EnrichmentRepository, ImportRunRepository, SqliteCatalogTreeRepository,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// CatalogImporterImpl - 目录树导入器实现
// ==========================================
pub struct CatalogImporterImpl<R>
where
    R: CatalogTreeRepository,
{
    // 数据访问层
    tree_repo: Arc<R>,
    run_repo: Option<ImportRunRepository>,

    // 导入组件
    file_parser: Box<dyn FileParser>,
    enrichment: EnrichmentDispatcher,
    rebuilder: NestedSetRebuilder,
}

impl<R> CatalogImporterImpl<R>
where
    R: CatalogTreeRepository,
{
    /// 创建导入器（无运行记录、无增强器）
    pub fn new(tree_repo: Arc<R>) -> Self {
        Self {
            tree_repo,
            run_repo: None,
            file_parser: Box::new(UniversalFileParser),
            enrichment: EnrichmentDispatcher::new(),
            rebuilder: NestedSetRebuilder::new(),
        }
    }

    pub fn with_run_repository(mut self, run_repo: ImportRunRepository) -> Self {
        self.run_repo = Some(run_repo);
        self
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentDispatcher) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_file_parser(mut self, file_parser: Box<dyn FileParser>) -> Self {
        self.file_parser = file_parser;
        self
    }

    pub fn tree_repository(&self) -> &R {
        &self.tree_repo
    }

    /// 只做映射（含 limit 截断），不落库
    pub fn map_table(
        &self,
        table: &SourceTable,
        profile: &MappingProfile,
        limit: Option<usize>,
    ) -> ImportResult<MappingOutcome> {
        let mapper = FieldMapper::new(&profile.rules);
        if mapper.rule_count() == 0 {
            return Err(ImportError::EmptyProfile(profile.name.clone()));
        }

        let mut outcome = mapper.map_table(table);
        if let Some(limit) = limit {
            if outcome.records.len() > limit {
                debug!(limit, mapped = outcome.records.len(), "按 limit 截断映射结果");
                outcome.records.truncate(limit);
            }
        }
        Ok(outcome)
    }

    // 写运行记录；失败只告警，不影响导入结果
    fn record_run(&self, summary: &ImportSummary, options: &ImportOptions, started_at: DateTime<Utc>) {
        let Some(run_repo) = &self.run_repo else {
            return;
        };
        if summary.status == RunStatus::DryRun {
            return;
        }

        let result = ImportRun::from_summary(summary, options.file_name.clone(), started_at)
            .map_err(ImportError::from)
            .and_then(|run| run_repo.insert(&run).map_err(ImportError::from));
        if let Err(e) = result {
            warn!(run_id = %summary.run_id, error = %e, "运行记录写入失败");
        }
    }

    fn finish(
        &self,
        mut summary: ImportSummary,
        status: RunStatus,
        options: &ImportOptions,
        start: Instant,
        started_at: DateTime<Utc>,
    ) -> ImportSummary {
        summary.status = status;
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        self.record_run(&summary, options, started_at);

        info!(
            run_id = %summary.run_id,
            status = %summary.status,
            total = summary.total_rows,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            errors = summary.error_count(),
            elapsed_ms = summary.elapsed_ms,
            "目录树导入结束"
        );
        summary
    }
}

impl CatalogImporterImpl<SqliteCatalogTreeRepository> {
    /// 基于同一个 SQLite 连接装配完整导入器（运行记录 + 三个参考增强器）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        let tree_repo = Arc::new(SqliteCatalogTreeRepository::from_connection(conn.clone()));
        let enrichment_repo = Arc::new(EnrichmentRepository::from_connection(conn.clone()));

        Self::new(tree_repo)
            .with_run_repository(ImportRunRepository::from_connection(conn))
            .with_enrichment(EnrichmentDispatcher::with_sqlite_enrichers(enrichment_repo))
    }
}

#[async_trait::async_trait]
impl<R> CatalogImporter for CatalogImporterImpl<R>
where
    R: CatalogTreeRepository + 'static,
{
    #[instrument(skip_all, fields(run_id, profile = %profile.name))]
    async fn import_table(
        &self,
        table: SourceTable,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> ImportResult<ImportSummary> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut summary = ImportSummary::new(run_id.clone());
        summary.total_rows = table.len();
        info!(
            run_id = %run_id,
            rows = table.len(),
            dry_run = options.dry_run,
            default_parent_id = options.default_parent_id,
            "开始导入目录树"
        );

        // === 阶段 1: 字段映射 ===
        debug!("阶段 1: 字段映射");
        let outcome = self.map_table(&table, profile, options.limit)?;
        summary.mapped = outcome.records.len();
        summary.skipped += outcome.skipped;
        for issue in &outcome.issues {
            summary.push_error(issue.to_string());
        }
        info!(mapped = summary.mapped, skipped = outcome.skipped, "字段映射完成");

        // === 阶段 2: 层级重建 ===
        debug!("阶段 2: 层级重建");
        let plan = HierarchyBuilder::new(options.duplicate_policy).build(&outcome.records);
        summary.planned = plan.len();
        summary.skipped += plan.duplicates.len();
        for dup in &plan.duplicates {
            let issue = RecordIssue::DuplicateLegacyId {
                legacy_id: dup.legacy_id.clone(),
                kept: dup.kept_index + 1,
                dropped: dup.dropped_index + 1,
            };
            summary.push_error(issue.to_string());
        }

        if options.dry_run {
            info!(planned = summary.planned, "试运行：不落库");
            return Ok(self.finish(summary, RunStatus::DryRun, options, start, started_at));
        }

        // === 阶段 3: 逐节点落库 + 增强 ===
        debug!("阶段 3: 逐节点落库");
        let mut refs = ReferenceMap::new();
        let persister = TreePersister::new(self.tree_repo.as_ref(), options)
            .with_enrichment(&self.enrichment);
        let persisted = persister.persist(&plan, &mut refs, &mut summary, cancel);

        if let PersistOutcome::Cancelled { processed } = persisted {
            warn!(processed, "导入已取消，目录树未重算");
            return Ok(self.finish(summary, RunStatus::Cancelled, options, start, started_at));
        }
        if cancel.is_cancelled() {
            warn!("重算前收到取消请求，目录树未重算");
            return Ok(self.finish(summary, RunStatus::Cancelled, options, start, started_at));
        }

        // === 阶段 4: 嵌套集整树重算 ===
        debug!("阶段 4: 嵌套集重算");
        match self.rebuilder.rebuild(self.tree_repo.as_ref()) {
            Ok(report) => {
                summary.rebuilt = true;
                debug!(node_count = report.node_count, max_rgt = report.max_rgt, "重算结果");
            }
            Err(source) => {
                error!(run_id = %run_id, error = %source, "嵌套集重算失败，运行需整体重试");
                summary.push_error(source.to_string());
                let summary = self.finish(summary, RunStatus::Failed, options, start, started_at);
                return Err(ImportError::RebuildFailed {
                    summary: Box::new(summary),
                    source,
                });
            }
        }

        Ok(self.finish(summary, RunStatus::Completed, options, start, started_at))
    }

    #[instrument(skip(self, profile, options, cancel), fields(file = %file_path.display()))]
    async fn import_from_file(
        &self,
        file_path: &Path,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> ImportResult<ImportSummary> {
        // === 步骤 0: 解析文件 ===
        let table = self.file_parser.parse(file_path).map_err(|e| {
            error!(error = %e, "文件解析失败");
            e
        })?;
        info!(rows = table.len(), columns = table.headers.len(), "文件解析完成");

        let mut options = options.clone();
        if options.file_name.is_none() {
            options.file_name = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string);
        }

        self.import_table(table, profile, &options, cancel).await
    }

    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> Vec<Result<ImportSummary, String>> {
        let total = file_paths.len();
        info!(total, "开始批量导入");

        let mut results = Vec::with_capacity(total);
        for (idx, path) in file_paths.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(done = idx, total, "批量导入已取消，剩余文件不再开始");
                break;
            }

            let mut file_options = options.clone();
            file_options.file_name = None;
            let result = self
                .import_from_file(&path, profile, &file_options, cancel)
                .await
                .map_err(|e| format!("{}: {}", path.display(), e));
            if let Err(e) = &result {
                warn!(error = %e, "文件导入失败，继续下一个");
            }
            results.push(result);
        }

        let success = results.iter().filter(|r| r.is_ok()).count();
        info!(total, success, failed = results.len() - success, "批量导入完成");
        results
    }
}
