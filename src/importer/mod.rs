// ==========================================
// 档案目录树导入系统 - 导入层
// ==========================================
// 职责: 外部表格 → 目录树
// 阶段: 字段映射 → 层级重建 → 落库(+增强) → 嵌套集重算
// 支持: CSV, Excel, JSON
// ==========================================

// 模块声明
pub mod cancellation;
pub mod catalog_importer_impl;
pub mod catalog_importer_trait;
pub mod csv_export;
pub mod enrichment;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod hierarchy_builder;
pub mod transform;
pub mod tree_persister;

// 重导出核心类型
pub use cancellation::CancellationFlag;
pub use catalog_importer_impl::CatalogImporterImpl;
pub use enrichment::{
    Enricher, EnrichmentDispatcher, ProvenanceEnricher, RightsEnricher,
    SecurityClassificationEnricher,
};
pub use error::{EnrichmentError, ImportError, ImportResult, RecordIssue};
pub use field_mapper::{FieldMapper, MappingOutcome};
pub use file_parser::{CsvParser, ExcelParser, JsonParser, UniversalFileParser};
pub use hierarchy_builder::HierarchyBuilder;
pub use transform::Transform;
pub use tree_persister::{PersistOutcome, ReferenceMap, TreePersister};

// 重导出 Trait 接口
pub use catalog_importer_trait::{CatalogImporter, FileParser};
