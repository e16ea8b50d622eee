// ==========================================
// 档案目录树导入系统 - 导入运行记录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 表: import_run
// ==========================================

use crate::domain::import::ImportRun;
use crate::domain::types::RunStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

fn parse_run_status(raw: &str) -> RunStatus {
    match raw.trim() {
        "COMPLETED" => RunStatus::Completed,
        "CANCELLED" => RunStatus::Cancelled,
        "DRY_RUN" => RunStatus::DryRun,
        _ => RunStatus::Failed,
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<ImportRun> {
    let status_raw: String = row.get(2)?;
    let started_raw: String = row.get(9)?;
    let completed_raw: Option<String> = row.get(10)?;
    Ok(ImportRun {
        run_id: row.get(0)?,
        file_name: row.get(1)?,
        status: parse_run_status(&status_raw),
        total_rows: row.get(3)?,
        created: row.get(4)?,
        updated: row.get(5)?,
        skipped: row.get(6)?,
        error_count: row.get(7)?,
        errors_json: row.get(8)?,
        started_at: parse_timestamp(&started_raw),
        completed_at: completed_raw.as_deref().map(parse_timestamp),
        elapsed_ms: row.get(11)?,
    })
}

// ==========================================
// ImportRunRepository - 运行记录仓储
// ==========================================
pub struct ImportRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入运行记录
    pub fn insert(&self, run: &ImportRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_run (
                run_id, file_name, status, total_rows, created, updated, skipped,
                error_count, errors_json, started_at, completed_at, elapsed_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                run.run_id,
                run.file_name,
                run.status.to_db_str(),
                run.total_rows,
                run.created,
                run.updated,
                run.skipped,
                run.error_count,
                run.errors_json,
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.elapsed_ms,
            ],
        )?;
        Ok(())
    }

    /// 按运行 ID 查询
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ImportRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                r#"
                SELECT run_id, file_name, status, total_rows, created, updated, skipped,
                       error_count, errors_json, started_at, completed_at, elapsed_ms
                FROM import_run
                WHERE run_id = ?1
                "#,
                params![run_id],
                map_run_row,
            )
            .optional()?;
        Ok(run)
    }

    /// 最近的运行记录（按开始时间倒序）
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<ImportRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, file_name, status, total_rows, created, updated, skipped,
                   error_count, errors_json, started_at, completed_at, elapsed_ms
            FROM import_run
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )?;

        let runs = stmt
            .query_map(params![limit as i64], map_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
