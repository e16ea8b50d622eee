// ==========================================
// 档案目录树导入系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 / busy_timeout）
// - 统一建库脚本，保证根节点存在
// ==========================================

use crate::domain::tree::ROOT_NODE_ID;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 默认数据库文件名
pub const DEFAULT_DB_FILE_NAME: &str = "catalog_import.db";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 默认数据库路径（用户数据目录下，取不到时退回当前目录）
pub fn default_db_path() -> String {
    let base = dirs::data_local_dir()
        .map(|dir| dir.join("catalog-import"))
        .unwrap_or_else(|| PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&base) {
        tracing::warn!(error = %e, dir = %base.display(), "无法创建数据目录，使用当前目录");
        return DEFAULT_DB_FILE_NAME.to_string();
    }

    base.join(DEFAULT_DB_FILE_NAME).to_string_lossy().to_string()
}

/// 初始化数据库 schema（幂等）
///
/// 根节点 (id=1, parent=NULL, lft=1, rgt=2) 不存在时自动创建
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS catalog_node (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER REFERENCES catalog_node(id),
            lft INTEGER NOT NULL DEFAULT 0,
            rgt INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_catalog_node_parent ON catalog_node(parent_id);
        CREATE INDEX IF NOT EXISTS idx_catalog_node_lft_rgt ON catalog_node(lft, rgt);

        CREATE TABLE IF NOT EXISTS node_record (
            node_id INTEGER PRIMARY KEY REFERENCES catalog_node(id) ON DELETE CASCADE,
            record_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keymap (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_id INTEGER NOT NULL REFERENCES catalog_node(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            UNIQUE(source_name, source_id)
        );

        CREATE TABLE IF NOT EXISTS import_run (
            run_id TEXT PRIMARY KEY,
            file_name TEXT,
            status TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            created INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            error_count INTEGER NOT NULL,
            errors_json TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            elapsed_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS security_classification (
            node_id INTEGER PRIMARY KEY REFERENCES catalog_node(id) ON DELETE CASCADE,
            clearance_level INTEGER NOT NULL,
            label TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rights_statement (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL REFERENCES catalog_node(id) ON DELETE CASCADE,
            basis TEXT,
            statement TEXT,
            rights_holder TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS provenance_event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id INTEGER NOT NULL REFERENCES catalog_node(id) ON DELETE CASCADE,
            history TEXT,
            event_dates TEXT,
            agent_name TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )?;

    let has_root: Option<i64> = conn
        .query_row(
            "SELECT id FROM catalog_node WHERE id = ?1",
            params![ROOT_NODE_ID],
            |row| row.get(0),
        )
        .optional()?;
    if has_root.is_none() {
        conn.execute(
            "INSERT INTO catalog_node (id, parent_id, lft, rgt) VALUES (?1, NULL, 1, 2)",
            params![ROOT_NODE_ID],
        )?;
    }

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
