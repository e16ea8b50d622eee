// ==========================================
// 档案目录树导入系统 - 映射相关实体
// ==========================================
// SourceTable:  外部格式适配器产出的规范化表格 {headers, rows}
// MappingRule:  映射方案中的一条规则（顺序有语义）
// TargetRecord: 单行映射结果（目标字段 → 值）
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// legacyId 的候选键（按优先级）
pub const LEGACY_ID_KEYS: [&str; 3] = ["legacyId", "LegacyId", "identifier"];

/// parentId 的候选键（按优先级）
pub const PARENT_ID_KEYS: [&str; 3] = ["parentId", "ParentId", "parent_id"];

/// 默认拼接符号
pub const DEFAULT_CONCAT_SYMBOL: &str = "|";

// ==========================================
// SourceTable - 规范化输入
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 列名 → 列位置索引
    ///
    /// 同名列只取第一次出现的位置
    pub fn header_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.headers.len());
        for (pos, header) in self.headers.iter().enumerate() {
            index.entry(header.as_str()).or_insert(pos);
        }
        index
    }
}

// ==========================================
// SourceRow - 按列名寻址的单行视图
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct SourceRow<'a> {
    index: &'a HashMap<&'a str, usize>,
    values: &'a [String],
}

impl<'a> SourceRow<'a> {
    pub fn new(index: &'a HashMap<&'a str, usize>, values: &'a [String]) -> Self {
        Self { index, values }
    }

    /// 按列名取值（列不存在或行长度不足时返回 None）
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.index
            .get(column)
            .and_then(|pos| self.values.get(*pos))
            .map(|v| v.as_str())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }
}

// ==========================================
// MappingRule - 映射规则
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    /// 源列名
    #[serde(default)]
    pub source_field: String,

    /// 目标字段名
    pub target_field: String,

    /// 常量值（空值兜底，或 concat_constant 时作为前缀）
    #[serde(default)]
    pub constant_value: String,

    /// 目标字段已有值时是否追加
    #[serde(default)]
    pub concatenate: bool,

    /// 常量是否拼接到源值之前
    #[serde(default)]
    pub concat_constant: bool,

    /// 追加时使用的分隔符（"\n" 两字符转义会被还原为换行）
    #[serde(default)]
    pub concat_symbol: Option<String>,

    /// 值转换名称（如 normalizePath）
    #[serde(default)]
    pub transform: Option<String>,

    /// 值转换参数
    #[serde(default)]
    pub transform_options: serde_json::Map<String, serde_json::Value>,

    /// 是否启用
    #[serde(default)]
    pub include: bool,
}

impl MappingRule {
    /// 快捷构造：启用的一对一映射
    pub fn direct(source_field: &str, target_field: &str) -> Self {
        Self {
            source_field: source_field.to_string(),
            target_field: target_field.to_string(),
            include: true,
            ..Default::default()
        }
    }

    /// 实际生效的拼接符号
    pub fn effective_concat_symbol(&self) -> String {
        match self.concat_symbol.as_deref() {
            None | Some("") => DEFAULT_CONCAT_SYMBOL.to_string(),
            Some(symbol) => symbol.replace("\\n", "\n"),
        }
    }
}

// ==========================================
// TargetRecord - 映射结果
// ==========================================
// 有序映射，保证同输入同方案下序列化结果逐字节一致
// 字段遍历按字段名字典序，与写入先后无关
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetRecord {
    fields: BTreeMap<String, String>,
}

impl TargetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|v| v.as_str())
    }

    /// 取非空（去空白后）值
    pub fn get_non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    /// 按顺序取第一个非空值
    pub fn first_non_empty(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get_non_empty(key))
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut String> {
        self.fields.get_mut(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn legacy_id(&self) -> Option<&str> {
        self.first_non_empty(&LEGACY_ID_KEYS)
    }

    pub fn parent_legacy_id(&self) -> Option<&str> {
        self.first_non_empty(&PARENT_ID_KEYS)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TargetRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
