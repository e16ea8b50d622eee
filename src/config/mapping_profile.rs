use crate::domain::mapping::MappingRule;
use serde::{Deserialize, Serialize};

/// 映射方案（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='mapping_profile/{name}'）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingProfile {
    /// 方案名称（用于选择/引用）
    pub name: String,

    /// 说明（可选）
    #[serde(default)]
    pub description: Option<String>,

    /// 有序规则列表（顺序有语义）
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

// 兼容两种 JSON 形态：完整对象 / 裸规则数组
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileDocument {
    Profile(MappingProfile),
    Rules(Vec<MappingRule>),
}

impl MappingProfile {
    pub fn new(name: impl Into<String>, rules: Vec<MappingRule>) -> Self {
        Self {
            name: name.into(),
            description: None,
            rules,
        }
    }

    /// 解析方案 JSON；裸数组形态以 fallback_name 命名
    pub fn from_json(raw: &str, fallback_name: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<ProfileDocument>(raw)? {
            ProfileDocument::Profile(profile) => Ok(profile),
            ProfileDocument::Rules(rules) => Ok(Self::new(fallback_name, rules)),
        }
    }

    /// 启用的规则（保持顺序）
    pub fn included_rules(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter().filter(|r| r.include)
    }

    /// 启用规则引用的源列名（去重，保持首次出现顺序）
    pub fn source_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for rule in self.included_rules() {
            let field = rule.source_field.as_str();
            if !field.is_empty() && !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }
}
