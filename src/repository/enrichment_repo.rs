// ==========================================
// 档案目录树导入系统 - 增强元数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（字段解释在增强器里完成）
// 表: security_classification / rights_statement / provenance_event
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct EnrichmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EnrichmentRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或更新密级
    pub fn upsert_security_classification(
        &self,
        node_id: i64,
        clearance_level: i32,
        label: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO security_classification (node_id, clearance_level, label, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(node_id) DO UPDATE SET
                clearance_level = excluded.clearance_level,
                label = excluded.label,
                updated_at = excluded.updated_at
            "#,
            params![node_id, clearance_level, label, now],
        )?;
        Ok(())
    }

    /// 查询密级
    pub fn find_security_classification(&self, node_id: i64) -> RepositoryResult<Option<(i32, String)>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT clearance_level, label FROM security_classification WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// 写入权利声明
    pub fn insert_rights(
        &self,
        node_id: i64,
        basis: Option<&str>,
        statement: Option<&str>,
        rights_holder: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO rights_statement (node_id, basis, statement, rights_holder, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![node_id, basis, statement, rights_holder, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 写入来源沿革
    pub fn insert_provenance(
        &self,
        node_id: i64,
        history: Option<&str>,
        event_dates: Option<&str>,
        agent_name: Option<&str>,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO provenance_event (node_id, history, event_dates, agent_name, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![node_id, history, event_dates, agent_name, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 统计指定节点的增强记录数: (rights, provenance)
    pub fn count_for_node(&self, node_id: i64) -> RepositoryResult<(i64, i64)> {
        let conn = self.get_conn()?;
        let rights: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rights_statement WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )?;
        let provenance: i64 = conn.query_row(
            "SELECT COUNT(*) FROM provenance_event WHERE node_id = ?1",
            params![node_id],
            |row| row.get(0),
        )?;
        Ok((rights, provenance))
    }
}
