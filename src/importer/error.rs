// ==========================================
// 档案目录树导入系统 - 导入模块错误类型
// ==========================================
// ImportError: 运行级错误（运行未开始，或嵌套集重算失败）
// RecordIssue: 记录级问题（就地恢复，只进入汇总消息列表）
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::import::ImportSummary;
use crate::engine::RebuildError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv/.json）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("JSON 解析失败: {0}")]
    JsonParseError(String),

    #[error("源数据缺少表头")]
    MissingHeaders,

    // ===== 映射方案错误 =====
    #[error("映射方案解析失败: {0}")]
    ProfileParseError(String),

    #[error("映射方案不存在: {0}")]
    MappingProfileNotFound(String),

    #[error("映射方案没有启用的规则: {0}")]
    EmptyProfile(String),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 持久化错误 =====
    #[error("数据库错误: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 致命错误 =====
    #[error("嵌套集重算失败，运行 {} 需整体重试: {source}", summary.run_id)]
    RebuildFailed {
        summary: Box<ImportSummary>,
        #[source]
        source: RebuildError,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 致命错误仍携带的运行汇总
    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportError::RebuildFailed { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::JsonParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

// ==========================================
// RecordIssue - 记录级问题（非致命）
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordIssue {
    #[error("映射: 源列不存在: {field}")]
    MissingSourceField { field: String },

    #[error("层级: legacyId 重复 {legacy_id}（保留记录 #{kept}, 丢弃记录 #{dropped}）")]
    DuplicateLegacyId {
        legacy_id: String,
        kept: usize,
        dropped: usize,
    },

    #[error("层级: {legacy_id} 的父节点 {parent_legacy_id} 尚未创建（环或父节点落库失败），挂到默认父节点")]
    HierarchyCycleOrOrphan {
        legacy_id: String,
        parent_legacy_id: String,
    },

    #[error("层级: {legacy_id}（节点 {node_id}）改挂到 {parent_id} 会形成环，保持原父节点")]
    ReparentWouldCycle {
        legacy_id: String,
        node_id: i64,
        parent_id: i64,
    },

    #[error("持久化: {legacy_id}: {message}")]
    Persistence { legacy_id: String, message: String },

    #[error("增强[{enricher}]: 节点 {node_id}: {message}")]
    Enrichment {
        enricher: String,
        node_id: i64,
        message: String,
    },
}

// ==========================================
// EnrichmentError - 增强器错误（按增强器隔离）
// ==========================================
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("字段 {field} 的值无法识别: {value}")]
    InvalidValue { field: String, value: String },

    #[error("增强数据写入失败: {0}")]
    Repository(#[from] RepositoryError),
}
