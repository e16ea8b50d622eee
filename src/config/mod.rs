// ==========================================
// 档案目录树导入系统 - 配置层
// ==========================================
// 职责: 导入参数与映射方案的读取/保存
// 存储: config_kv 表 (key-value + scope)
// ==========================================

pub mod config_manager;
pub mod import_config_trait;
pub mod mapping_profile;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::ImportConfigReader;
pub use mapping_profile::MappingProfile;
