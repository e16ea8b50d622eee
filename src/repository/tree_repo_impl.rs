// ==========================================
// 档案目录树导入系统 - 目录树 Repository 实现
// ==========================================
// 职责: 实现目录树持久化契约（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 表: catalog_node / node_record / keymap
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::mapping::TargetRecord;
use crate::domain::tree::{NestedInterval, TreeNode};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::tree_repo::CatalogTreeRepository;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// SqliteCatalogTreeRepository
// ==========================================
pub struct SqliteCatalogTreeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogTreeRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl CatalogTreeRepository for SqliteCatalogTreeRepository {
    fn create_node(&self, parent_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        insert_node(&conn, parent_id)
    }

    fn update_interval(&self, node_id: i64, lft: i64, rgt: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE catalog_node SET lft = ?2, rgt = ?3 WHERE id = ?1",
            params![node_id, lft, rgt],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "catalog_node".to_string(),
                id: node_id.to_string(),
            });
        }
        Ok(())
    }

    fn update_parent(&self, node_id: i64, parent_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        set_parent(&conn, node_id, parent_id)
    }

    fn find_node(&self, node_id: i64) -> RepositoryResult<Option<TreeNode>> {
        let conn = self.get_conn()?;
        let node = conn
            .query_row(
                "SELECT id, parent_id, lft, rgt FROM catalog_node WHERE id = ?1",
                params![node_id],
                |row| {
                    Ok(TreeNode {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        lft: row.get(2)?,
                        rgt: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(node)
    }

    fn list_nodes(&self) -> RepositoryResult<Vec<TreeNode>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, parent_id, lft, rgt FROM catalog_node ORDER BY id")?;

        let nodes = stmt
            .query_map([], |row| {
                Ok(TreeNode {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    lft: row.get(2)?,
                    rgt: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    fn save_record(&self, node_id: i64, record: &TargetRecord) -> RepositoryResult<()> {
        let record_json = serde_json::to_string(record)?;
        let conn = self.get_conn()?;
        upsert_record(&conn, node_id, &record_json)
    }

    fn find_record(&self, node_id: i64) -> RepositoryResult<Option<TargetRecord>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT record_json FROM node_record WHERE node_id = ?1",
                params![node_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn find_keymap(&self, source_name: &str, legacy_id: &str) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;
        let target: Option<i64> = conn
            .query_row(
                "SELECT target_id FROM keymap WHERE source_name = ?1 AND source_id = ?2",
                params![source_name, legacy_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    fn save_keymap(&self, source_name: &str, legacy_id: &str, node_id: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        upsert_keymap(&conn, source_name, legacy_id, node_id)
    }

    /// 单事务：任一步失败整体回滚，不留下无描述的节点
    fn create_node_with_record(
        &self,
        parent_id: i64,
        record: &TargetRecord,
        source_name: &str,
        legacy_id: &str,
    ) -> RepositoryResult<i64> {
        let record_json = serde_json::to_string(record)?;
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let node_id = insert_node(&tx, parent_id)?;
        upsert_record(&tx, node_id, &record_json)?;
        upsert_keymap(&tx, source_name, legacy_id, node_id)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(node_id)
    }

    fn update_node_with_record(
        &self,
        node_id: i64,
        parent_id: Option<i64>,
        record: &TargetRecord,
    ) -> RepositoryResult<()> {
        let record_json = serde_json::to_string(record)?;
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        if let Some(parent_id) = parent_id {
            set_parent(&tx, node_id, parent_id)?;
        }
        upsert_record(&tx, node_id, &record_json)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    /// 事务化批量写入区间：任一失败整体回滚
    fn apply_intervals(&self, intervals: &[NestedInterval]) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        {
            let mut stmt = tx.prepare("UPDATE catalog_node SET lft = ?2, rgt = ?3 WHERE id = ?1")?;
            for interval in intervals {
                let affected = stmt.execute(params![interval.node_id, interval.lft, interval.rgt])?;
                if affected == 0 {
                    return Err(RepositoryError::NotFound {
                        entity: "catalog_node".to_string(),
                        id: interval.node_id.to_string(),
                    });
                }
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }
}

// ==========================================
// 单条写语句（供单步方法与事务方法共用）
// ==========================================

fn insert_node(conn: &Connection, parent_id: i64) -> RepositoryResult<i64> {
    conn.execute(
        r#"
        INSERT INTO catalog_node (parent_id, lft, rgt, created_at)
        VALUES (?1, 0, 0, ?2)
        "#,
        params![parent_id, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn set_parent(conn: &Connection, node_id: i64, parent_id: i64) -> RepositoryResult<()> {
    let affected = conn.execute(
        "UPDATE catalog_node SET parent_id = ?2 WHERE id = ?1",
        params![node_id, parent_id],
    )?;
    if affected == 0 {
        return Err(RepositoryError::NotFound {
            entity: "catalog_node".to_string(),
            id: node_id.to_string(),
        });
    }
    Ok(())
}

fn upsert_record(conn: &Connection, node_id: i64, record_json: &str) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO node_record (node_id, record_json, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(node_id) DO UPDATE SET
            record_json = excluded.record_json,
            updated_at = excluded.updated_at
        "#,
        params![node_id, record_json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_keymap(
    conn: &Connection,
    source_name: &str,
    legacy_id: &str,
    node_id: i64,
) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO keymap (source_name, source_id, target_id, created_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(source_name, source_id) DO UPDATE SET
            target_id = excluded.target_id
        "#,
        params![source_name, legacy_id, node_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
