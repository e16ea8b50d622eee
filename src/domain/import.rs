// ==========================================
// 档案目录树导入系统 - 导入运行实体
// ==========================================
// ImportOptions: 单次运行参数（配置 + 调用方覆写）
// ImportSummary: 交给调用方的运行汇总
// ImportRun:     落库的运行记录（对齐 import_run 表）
// ==========================================

use crate::domain::tree::ROOT_NODE_ID;
use crate::domain::types::{DuplicateLegacyIdPolicy, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 默认 keymap 来源名
pub const DEFAULT_KEYMAP_SOURCE: &str = "migration";

// ==========================================
// ImportOptions - 运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// 默认挂载父节点（父节点无法解析时使用）
    pub default_parent_id: i64,

    /// 同批次重复 legacyId 处理策略
    pub duplicate_policy: DuplicateLegacyIdPolicy,

    /// keymap 已存在时是否更新已有节点（否则新建）
    pub update_existing: bool,

    /// keymap 来源名
    pub keymap_source_name: String,

    /// 仅映射与排序，不落库
    pub dry_run: bool,

    /// 只导入前 N 条映射结果
    pub limit: Option<usize>,

    /// 源文件名（仅用于运行记录）
    pub file_name: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_parent_id: ROOT_NODE_ID,
            duplicate_policy: DuplicateLegacyIdPolicy::default(),
            update_existing: false,
            keymap_source_name: DEFAULT_KEYMAP_SOURCE.to_string(),
            dry_run: false,
            limit: None,
            file_name: None,
        }
    }
}

// ==========================================
// EnrichmentStats - 单个增强器计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub applied: usize,
    pub failed: usize,
}

// ==========================================
// ImportSummary - 运行汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub total_rows: usize,  // 输入行数
    pub mapped: usize,      // 映射出字段的记录数
    pub planned: usize,     // 进入处理顺序的记录数
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub enrichment: BTreeMap<String, EnrichmentStats>,
    pub rebuilt: bool,
    pub elapsed_ms: u64,
}

impl ImportSummary {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Completed,
            total_rows: 0,
            mapped: 0,
            planned: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            errors: Vec::new(),
            enrichment: BTreeMap::new(),
            rebuilt: false,
            elapsed_ms: 0,
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// 取（或创建）增强器计数
    pub fn enrichment_stats_mut(&mut self, name: &str) -> &mut EnrichmentStats {
        self.enrichment.entry(name.to_string()).or_default()
    }
}

// ==========================================
// ImportRun - 运行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub run_id: String,
    pub file_name: Option<String>,
    pub status: RunStatus,
    pub total_rows: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
    pub error_count: i64,
    pub errors_json: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: i64,
}

impl ImportRun {
    pub fn from_summary(
        summary: &ImportSummary,
        file_name: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            run_id: summary.run_id.clone(),
            file_name,
            status: summary.status,
            total_rows: summary.total_rows as i64,
            created: summary.created as i64,
            updated: summary.updated as i64,
            skipped: summary.skipped as i64,
            error_count: summary.errors.len() as i64,
            errors_json: serde_json::to_string(&summary.errors)?,
            started_at,
            completed_at: Some(Utc::now()),
            elapsed_ms: summary.elapsed_ms as i64,
        })
    }
}
