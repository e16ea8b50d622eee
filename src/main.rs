// ==========================================
// 档案目录树导入系统 - 命令行入口
// ==========================================
// 用法:
//   catalog-import <file> --profile <json文件|方案名> [--db <path>]
//                  [--parent <id>] [--policy override|reject]
//                  [--update-existing] [--dry-run] [--limit N]
//                  [--export <csv>]
// 输出: 运行汇总（JSON）
// ==========================================

use anyhow::{anyhow, Context, Result};
use catalog_import::config::{ConfigManager, ImportConfigReader, MappingProfile};
use catalog_import::db::{default_db_path, init_schema, open_sqlite_connection};
use catalog_import::domain::{DuplicateLegacyIdPolicy, ImportOptions};
use catalog_import::importer::{
    csv_export, CancellationFlag, CatalogImporter, CatalogImporterImpl, FileParser, ImportError,
    UniversalFileParser,
};
use catalog_import::logging;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[command(name = "catalog-import", version, about = "档案目录树导入")]
struct Cli {
    /// 输入文件（.csv / .xlsx / .xls）
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// 映射方案：JSON 文件路径或已保存的方案名
    #[arg(long, value_name = "PROFILE")]
    profile: String,
    /// 数据库路径（默认用户数据目录）
    #[arg(long = "db", value_name = "PATH")]
    db_path: Option<String>,
    /// 默认父节点 ID
    #[arg(long, value_name = "ID")]
    parent: Option<i64>,
    /// legacyId 重复策略: override | reject
    #[arg(long, value_name = "POLICY")]
    policy: Option<DuplicateLegacyIdPolicy>,
    /// 已导入过的 legacyId 改为更新原节点
    #[arg(long)]
    update_existing: bool,
    /// 只映射和校验，不写库
    #[arg(long)]
    dry_run: bool,
    /// 最多处理的行数
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
    /// 映射结果另存为 CSV
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,
}

// 先按文件路径读取，不存在时按方案名从配置读取
async fn load_profile(config: &ConfigManager, profile_ref: &str) -> Result<MappingProfile> {
    let path = Path::new(profile_ref);
    if path.is_file() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取映射方案失败: {}", path.display()))?;
        let fallback = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("profile");
        return MappingProfile::from_json(&raw, fallback)
            .map_err(|e| ImportError::ProfileParseError(e.to_string()).into());
    }

    config
        .get_mapping_profile(profile_ref)
        .await?
        .ok_or_else(|| ImportError::MappingProfileNotFound(profile_ref.to_string()).into())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();

    tracing::info!("==================================================");
    tracing::info!("档案目录树导入系统 v{}", catalog_import::VERSION);
    tracing::info!("==================================================");

    // 数据库
    let db_path = cli.db_path.clone().unwrap_or_else(default_db_path);
    tracing::info!("使用数据库: {}", db_path);
    let conn = open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn).context("初始化数据库 schema 失败")?;
    let conn = Arc::new(Mutex::new(conn));

    // 配置 + 命令行覆写
    let config = ConfigManager::from_connection(conn.clone())?;
    let mut options = ImportOptions::from_config(&config).await?;
    if let Some(parent) = cli.parent {
        options.default_parent_id = parent;
    }
    if let Some(policy) = cli.policy {
        options.duplicate_policy = policy;
    }
    options.update_existing |= cli.update_existing;
    options.dry_run = cli.dry_run;
    options.limit = cli.limit;
    options.file_name = cli
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);

    let profile = load_profile(&config, &cli.profile).await?;
    let table = UniversalFileParser.parse(&cli.file)?;
    let importer = CatalogImporterImpl::from_connection(conn);

    if let Some(export_path) = &cli.export {
        let outcome = importer.map_table(&table, &profile, options.limit)?;
        csv_export::export_to_file(&outcome.records, export_path)?;
    }

    // Ctrl-C → 取消（节点之间生效）
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("收到 Ctrl-C，导入将在当前节点完成后停止");
                cancel.cancel();
            }
        });
    }

    match importer.import_table(table, &profile, &options, &cancel).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(ImportError::RebuildFailed { summary, source }) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Err(anyhow!(source).context("嵌套集重算失败，请修复目录树后整体重试"))
        }
        Err(e) => Err(e.into()),
    }
}
