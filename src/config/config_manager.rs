// ==========================================
// 档案目录树导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::mapping_profile::MappingProfile;
use crate::db::open_sqlite_connection;
use crate::domain::tree::ROOT_NODE_ID;
use crate::domain::types::DuplicateLegacyIdPolicy;
use crate::domain::import::DEFAULT_KEYMAP_SOURCE;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    // 读取配置，缺省或空白时回落到默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ImportResult<String> {
        let value = self
            .get_config_value(key)
            .map_err(|e| ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 保存映射方案（config_kv: mapping_profile/{name}）
    pub fn save_mapping_profile(&self, profile: &MappingProfile) -> RepositoryResult<()> {
        let key = format!("{}{}", config_keys::MAPPING_PROFILE_PREFIX, profile.name.trim());
        let raw = serde_json::to_string(profile)?;
        self.set_global_config_value(&key, &raw)
    }

    /// 已保存的映射方案名称（按名称排序）
    pub fn list_mapping_profiles(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key FROM config_kv WHERE scope_id = 'global' AND key LIKE ?1 ORDER BY key",
        )?;
        let pattern = format!("{}%", config_keys::MAPPING_PROFILE_PREFIX);
        let names = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(config_keys::MAPPING_PROFILE_PREFIX)
                    .map(str::to_string)
            })
            .collect();
        Ok(names)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_default_parent_id(&self) -> ImportResult<i64> {
        let key = config_keys::DEFAULT_PARENT_ID;
        let value = self.get_config_or_default(key, &ROOT_NODE_ID.to_string())?;
        value
            .parse::<i64>()
            .map_err(|e| ImportError::ConfigValueError {
                key: key.to_string(),
                value: value.clone(),
                message: e.to_string(),
            })
    }

    async fn get_duplicate_legacy_id_policy(&self) -> ImportResult<DuplicateLegacyIdPolicy> {
        let key = config_keys::DUPLICATE_LEGACY_ID_POLICY;
        let value = self.get_config_or_default(key, "override")?;
        value
            .parse::<DuplicateLegacyIdPolicy>()
            .map_err(|message| ImportError::ConfigValueError {
                key: key.to_string(),
                value: value.clone(),
                message,
            })
    }

    async fn get_update_existing(&self) -> ImportResult<bool> {
        let value = self.get_config_or_default(config_keys::UPDATE_EXISTING, "false")?;
        Ok(matches!(
            value.to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ))
    }

    async fn get_keymap_source_name(&self) -> ImportResult<String> {
        self.get_config_or_default(config_keys::KEYMAP_SOURCE_NAME, DEFAULT_KEYMAP_SOURCE)
    }

    async fn get_mapping_profile(&self, name: &str) -> ImportResult<Option<MappingProfile>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let key = format!("{}{}", config_keys::MAPPING_PROFILE_PREFIX, name);
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let profile = MappingProfile::from_json(&raw, name)
            .map_err(|e| ImportError::ProfileParseError(format!("{}: {}", name, e)))?;
        Ok(Some(profile))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 挂载
    pub const DEFAULT_PARENT_ID: &str = "import.default_parent_id";

    // 层级重建
    pub const DUPLICATE_LEGACY_ID_POLICY: &str = "import.duplicate_legacy_id_policy";

    // 重复导入
    pub const UPDATE_EXISTING: &str = "import.update_existing";
    pub const KEYMAP_SOURCE_NAME: &str = "import.keymap_source_name";

    // 映射方案 (JSON)，完整 key = 前缀 + 方案名
    pub const MAPPING_PROFILE_PREFIX: &str = "mapping_profile/";
}
