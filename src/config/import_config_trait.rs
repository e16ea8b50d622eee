// ==========================================
// 档案目录树导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::mapping_profile::MappingProfile;
use crate::domain::import::ImportOptions;
use crate::domain::types::DuplicateLegacyIdPolicy;
use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取默认父节点 ID（批次根节点与孤儿节点挂载点）
    ///
    /// # 默认值
    /// - 1（目录根节点）
    async fn get_default_parent_id(&self) -> ImportResult<i64>;

    /// 获取 legacyId 重复处理策略
    ///
    /// # 默认值
    /// - override（后写覆盖）
    async fn get_duplicate_legacy_id_policy(&self) -> ImportResult<DuplicateLegacyIdPolicy>;

    /// 是否更新已导入过的节点（按 keymap 命中）
    ///
    /// # 默认值
    /// - false
    async fn get_update_existing(&self) -> ImportResult<bool>;

    /// keymap 来源名
    ///
    /// # 默认值
    /// - "migration"
    async fn get_keymap_source_name(&self) -> ImportResult<String>;

    /// 按名称读取映射方案
    ///
    /// # 返回
    /// - Some(MappingProfile): 已保存的方案
    /// - None: 方案不存在
    async fn get_mapping_profile(&self, name: &str) -> ImportResult<Option<MappingProfile>>;
}

impl ImportOptions {
    /// 从配置读取运行参数（调用方可在此基础上逐项覆盖）
    pub async fn from_config<C>(config: &C) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        Ok(Self {
            default_parent_id: config.get_default_parent_id().await?,
            duplicate_policy: config.get_duplicate_legacy_id_policy().await?,
            update_existing: config.get_update_existing().await?,
            keymap_source_name: config.get_keymap_source_name().await?,
            ..Self::default()
        })
    }
}
