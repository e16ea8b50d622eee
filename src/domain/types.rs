// ==========================================
// 档案目录树导入系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 同批次 legacyId 重复处理策略
// ==========================================
// Override: 后写覆盖（保持历史行为）
// Reject:   先到先得，后续重复记录丢弃
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLegacyIdPolicy {
    #[default]
    Override,
    Reject,
}

impl fmt::Display for DuplicateLegacyIdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateLegacyIdPolicy::Override => write!(f, "override"),
            DuplicateLegacyIdPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for DuplicateLegacyIdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "override" | "last_write_wins" => Ok(DuplicateLegacyIdPolicy::Override),
            "reject" | "first_write_wins" => Ok(DuplicateLegacyIdPolicy::Reject),
            other => Err(format!("未知的重复 legacyId 策略: {}", other)),
        }
    }
}

// ==========================================
// 导入运行状态
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed, // 全部阶段完成（含嵌套集重算）
    Cancelled, // 重算前被取消，树处于"未重算"状态
    Failed,    // 嵌套集重算失败
    DryRun,    // 仅映射与排序，不落库
}

impl RunStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "COMPLETED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Failed => "FAILED",
            RunStatus::DryRun => "DRY_RUN",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "Reject".parse::<DuplicateLegacyIdPolicy>().unwrap(),
            DuplicateLegacyIdPolicy::Reject
        );
        assert_eq!(
            " override ".parse::<DuplicateLegacyIdPolicy>().unwrap(),
            DuplicateLegacyIdPolicy::Override
        );
        assert!("merge".parse::<DuplicateLegacyIdPolicy>().is_err());
    }

    #[test]
    fn test_run_status_serde_matches_db_str() {
        let json = serde_json::to_string(&RunStatus::DryRun).unwrap();
        assert_eq!(json, "\"DRY_RUN\"");
        assert_eq!(RunStatus::Cancelled.to_string(), "CANCELLED");
    }
}
