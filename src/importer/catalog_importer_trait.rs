// ==========================================
// 档案目录树导入系统 - 导入 Trait
// ==========================================
// 职责: 定义导入接口（不包含实现）
// ==========================================

use crate::config::MappingProfile;
use crate::domain::import::{ImportOptions, ImportSummary};
use crate::domain::mapping::SourceTable;
use crate::importer::cancellation::CancellationFlag;
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

// ==========================================
// CatalogImporter Trait
// ==========================================
// 用途: 目录树导入主接口
// 实现者: CatalogImporterImpl
#[async_trait]
pub trait CatalogImporter: Send + Sync {
    /// 导入一张规范化表格
    ///
    /// # 参数
    /// - table: 规范化输入 {headers, rows}
    /// - profile: 映射方案
    /// - options: 运行参数
    /// - cancel: 取消标志（节点之间、重算之前检查）
    ///
    /// # 返回
    /// - Ok(ImportSummary): 运行汇总（含已取消、试运行）
    /// - Err(ImportError::RebuildFailed): 嵌套集重算失败，错误中仍带汇总
    /// - Err: 运行开始前的错误（方案为空等）
    ///
    /// # 导入流程（4 个阶段）
    /// 1. 字段映射
    /// 2. 层级重建（处理顺序）
    /// 3. 逐节点落库 + 增强分发
    /// 4. 嵌套集整树重算（每次运行一次）
    async fn import_table(
        &self,
        table: SourceTable,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> ImportResult<ImportSummary>;

    /// 从文件导入（按扩展名选择解析器）
    ///
    /// # 参数
    /// - file_path: .csv / .tsv / .xlsx / .xls / .json
    async fn import_from_file(
        &self,
        file_path: &Path,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> ImportResult<ImportSummary>;

    /// 批量导入多个文件
    ///
    /// # 说明
    /// - 目标树相同的运行不能并发，因此逐个文件顺序执行
    /// - 单个文件失败不影响后续文件
    /// - 取消后剩余文件不再开始
    async fn batch_import(
        &self,
        file_paths: Vec<PathBuf>,
        profile: &MappingProfile,
        options: &ImportOptions,
        cancel: &CancellationFlag,
    ) -> Vec<Result<ImportSummary, String>>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 外部格式 → 规范化表格
// 实现者: CsvParser, ExcelParser, JsonParser
pub trait FileParser: Send + Sync {
    /// 解析文件为规范化表格
    ///
    /// # 返回
    /// - Ok(SourceTable): 表头 + 行（已去除首尾空白，跳过全空行）
    /// - Err: 文件读取错误、格式错误
    fn parse(&self, file_path: &Path) -> ImportResult<SourceTable>;
}
