// ==========================================
// 档案目录树导入系统 - 增强分发
// ==========================================
// 职责: 节点创建/更新后，把记录交给已注册的增强器
// 适用性: 增强器静态声明自己消费的字段（ext 前缀），不做 schema 探测
// 红线: 单个增强器失败只影响自己的计数，不中断导入
// ==========================================

use crate::domain::import::ImportSummary;
use crate::domain::mapping::TargetRecord;
use crate::importer::error::{EnrichmentError, RecordIssue};
use crate::repository::EnrichmentRepository;
use std::sync::Arc;
use tracing::{debug, warn};

/// 增强字段保留前缀
pub const ENRICHMENT_FIELD_PREFIX: &str = "ext";

// ==========================================
// Enricher Trait
// ==========================================
// 实现者: SecurityClassificationEnricher, RightsEnricher, ProvenanceEnricher
pub trait Enricher: Send + Sync {
    /// 计数用名称
    fn name(&self) -> &str;

    /// 消费的记录字段
    fn consumed_fields(&self) -> &'static [&'static str];

    /// 记录中是否有本增强器需要的非空字段
    fn applies_to(&self, record: &TargetRecord) -> bool {
        self.consumed_fields()
            .iter()
            .any(|field| record.get_non_empty(field).is_some())
    }

    /// 执行增强（只读访问记录与节点 ID）
    fn enrich(&self, node_id: i64, record: &TargetRecord) -> Result<(), EnrichmentError>;
}

// ==========================================
// EnrichmentDispatcher - 增强分发器
// ==========================================
#[derive(Default)]
pub struct EnrichmentDispatcher {
    enrichers: Vec<Box<dyn Enricher>>,
}

impl EnrichmentDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册三个参考增强器（写入 SQLite 增强表）
    pub fn with_sqlite_enrichers(repo: Arc<EnrichmentRepository>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Box::new(SecurityClassificationEnricher::new(repo.clone())));
        dispatcher.register(Box::new(RightsEnricher::new(repo.clone())));
        dispatcher.register(Box::new(ProvenanceEnricher::new(repo)));
        dispatcher
    }

    pub fn register(&mut self, enricher: Box<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.enrichers.iter().map(|e| e.name()).collect()
    }

    /// 对单个节点分发；计数与错误消息写入运行汇总
    pub fn dispatch(&self, node_id: i64, record: &TargetRecord, summary: &mut ImportSummary) {
        for enricher in &self.enrichers {
            if !enricher.applies_to(record) {
                continue;
            }

            match enricher.enrich(node_id, record) {
                Ok(()) => {
                    debug!(enricher = enricher.name(), node_id, "增强完成");
                    summary.enrichment_stats_mut(enricher.name()).applied += 1;
                }
                Err(e) => {
                    warn!(enricher = enricher.name(), node_id, error = %e, "增强失败");
                    summary.enrichment_stats_mut(enricher.name()).failed += 1;
                    let issue = RecordIssue::Enrichment {
                        enricher: enricher.name().to_string(),
                        node_id,
                        message: e.to_string(),
                    };
                    summary.push_error(issue.to_string());
                }
            }
        }
    }
}

// ==========================================
// 密级
// ==========================================
pub struct SecurityClassificationEnricher {
    repo: Arc<EnrichmentRepository>,
}

impl SecurityClassificationEnricher {
    pub const FIELD: &'static str = "extSecurityClassification";

    pub fn new(repo: Arc<EnrichmentRepository>) -> Self {
        Self { repo }
    }

    /// 密级名称 → (等级, 规范名)
    pub fn parse_level(raw: &str) -> Option<(i32, &'static str)> {
        let normalized = raw
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ");
        let level = match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "public" | "unclassified" | "1" => (1, "Public"),
            "internal" | "restricted" | "2" => (2, "Internal"),
            "confidential" | "3" => (3, "Confidential"),
            "secret" | "4" => (4, "Secret"),
            "top secret" | "5" => (5, "Top Secret"),
            _ => return None,
        };
        Some(level)
    }
}

impl Enricher for SecurityClassificationEnricher {
    fn name(&self) -> &str {
        "security_classification"
    }

    fn consumed_fields(&self) -> &'static [&'static str] {
        &[Self::FIELD]
    }

    fn enrich(&self, node_id: i64, record: &TargetRecord) -> Result<(), EnrichmentError> {
        let raw = record.get_non_empty(Self::FIELD).unwrap_or("");
        let (level, label) = Self::parse_level(raw).ok_or_else(|| EnrichmentError::InvalidValue {
            field: Self::FIELD.to_string(),
            value: raw.to_string(),
        })?;
        self.repo.upsert_security_classification(node_id, level, label)?;
        Ok(())
    }
}

// ==========================================
// 权利声明
// ==========================================
pub struct RightsEnricher {
    repo: Arc<EnrichmentRepository>,
}

impl RightsEnricher {
    pub const BASIS: &'static str = "extRightsBasis";
    pub const STATEMENT: &'static str = "extRightsStatement";
    pub const HOLDER: &'static str = "extRightsHolder";

    pub fn new(repo: Arc<EnrichmentRepository>) -> Self {
        Self { repo }
    }
}

impl Enricher for RightsEnricher {
    fn name(&self) -> &str {
        "rights"
    }

    fn consumed_fields(&self) -> &'static [&'static str] {
        &[Self::BASIS, Self::STATEMENT, Self::HOLDER]
    }

    fn enrich(&self, node_id: i64, record: &TargetRecord) -> Result<(), EnrichmentError> {
        self.repo.insert_rights(
            node_id,
            record.get_non_empty(Self::BASIS),
            record.get_non_empty(Self::STATEMENT),
            record.get_non_empty(Self::HOLDER),
        )?;
        Ok(())
    }
}

// ==========================================
// 来源沿革
// ==========================================
pub struct ProvenanceEnricher {
    repo: Arc<EnrichmentRepository>,
}

impl ProvenanceEnricher {
    pub const HISTORY: &'static str = "extProvenanceHistory";
    pub const EVENT_DATES: &'static str = "extProvenanceEventDates";
    pub const AGENT: &'static str = "extProvenanceAgent";

    pub fn new(repo: Arc<EnrichmentRepository>) -> Self {
        Self { repo }
    }
}

impl Enricher for ProvenanceEnricher {
    fn name(&self) -> &str {
        "provenance"
    }

    fn consumed_fields(&self) -> &'static [&'static str] {
        &[Self::HISTORY, Self::EVENT_DATES, Self::AGENT]
    }

    fn enrich(&self, node_id: i64, record: &TargetRecord) -> Result<(), EnrichmentError> {
        self.repo.insert_provenance(
            node_id,
            record.get_non_empty(Self::HISTORY),
            record.get_non_empty(Self::EVENT_DATES),
            record.get_non_empty(Self::AGENT),
        )?;
        Ok(())
    }
}
