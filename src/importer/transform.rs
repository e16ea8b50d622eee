// ==========================================
// 档案目录树导入系统 - 值转换
// ==========================================
// 职责: 映射规则上的命名转换（无副作用，纯函数）
// 未知转换名: 原值透传，由调用方告警
// ==========================================

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;

/// truncate 默认长度
pub const DEFAULT_TRUNCATE_LENGTH: usize = 255;

/// replaceEmpty 默认替换值
pub const DEFAULT_EMPTY_REPLACEMENT: &str = "Unknown";

// 多值单元格自动识别的分隔符（按优先级）
const MULTI_VALUE_DELIMITERS: [&str; 4] = ["|", ";", "\n", ","];

// ==========================================
// TransformKind - 转换名称
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Trim,
    Uppercase,
    Lowercase,
    Titlecase,
    NormalizeWhitespace,
    StripHtml,
    Truncate,
    Append,
    Prepend,
    DefaultIfEmpty,
    ReplaceEmpty,
    MapLevel,
    MapBoolean,
    MapEntityType,
    FirstValue,
    NormalizePath,
    Basename,
    Replace,
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim() {
            "trim" => TransformKind::Trim,
            "uppercase" => TransformKind::Uppercase,
            "lowercase" => TransformKind::Lowercase,
            "titlecase" => TransformKind::Titlecase,
            "normalizeWhitespace" => TransformKind::NormalizeWhitespace,
            "stripHtml" => TransformKind::StripHtml,
            "truncate" => TransformKind::Truncate,
            "append" => TransformKind::Append,
            "prepend" => TransformKind::Prepend,
            "defaultIfEmpty" => TransformKind::DefaultIfEmpty,
            "replaceEmpty" => TransformKind::ReplaceEmpty,
            "mapLevel" => TransformKind::MapLevel,
            "mapBoolean" => TransformKind::MapBoolean,
            "mapEntityType" => TransformKind::MapEntityType,
            "firstValue" => TransformKind::FirstValue,
            "normalizePath" => TransformKind::NormalizePath,
            "basename" => TransformKind::Basename,
            "replace" => TransformKind::Replace,
            other => return Err(format!("未知的值转换: {}", other)),
        };
        Ok(kind)
    }
}

// ==========================================
// Transform - 已解析参数的转换
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Trim,
    Uppercase,
    Lowercase,
    Titlecase,
    NormalizeWhitespace,
    StripHtml,
    Truncate { length: usize },
    Append { suffix: String },
    Prepend { prefix: String },
    DefaultIfEmpty { default: String },
    ReplaceEmpty { replacement: String },
    MapLevel,
    MapBoolean,
    MapEntityType,
    FirstValue { delimiter: Option<String> },
    NormalizePath,
    Basename,
    Replace { mappings: HashMap<String, String> },
    /// 未识别的转换名（原值透传）
    Unknown(String),
}

impl Transform {
    /// 由规则上的转换名与参数构造
    pub fn from_rule(name: &str, options: &Map<String, Value>) -> Self {
        let kind = match name.parse::<TransformKind>() {
            Ok(kind) => kind,
            Err(_) => return Transform::Unknown(name.trim().to_string()),
        };

        match kind {
            TransformKind::Trim => Transform::Trim,
            TransformKind::Uppercase => Transform::Uppercase,
            TransformKind::Lowercase => Transform::Lowercase,
            TransformKind::Titlecase => Transform::Titlecase,
            TransformKind::NormalizeWhitespace => Transform::NormalizeWhitespace,
            TransformKind::StripHtml => Transform::StripHtml,
            TransformKind::Truncate => Transform::Truncate {
                length: option_string(options, "length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(DEFAULT_TRUNCATE_LENGTH),
            },
            TransformKind::Append => Transform::Append {
                suffix: option_string(options, "suffix").unwrap_or_default(),
            },
            TransformKind::Prepend => Transform::Prepend {
                prefix: option_string(options, "prefix").unwrap_or_default(),
            },
            TransformKind::DefaultIfEmpty => Transform::DefaultIfEmpty {
                default: option_string(options, "default").unwrap_or_default(),
            },
            TransformKind::ReplaceEmpty => Transform::ReplaceEmpty {
                replacement: option_string(options, "replacement")
                    .unwrap_or_else(|| DEFAULT_EMPTY_REPLACEMENT.to_string()),
            },
            TransformKind::MapLevel => Transform::MapLevel,
            TransformKind::MapBoolean => Transform::MapBoolean,
            TransformKind::MapEntityType => Transform::MapEntityType,
            TransformKind::FirstValue => Transform::FirstValue {
                delimiter: option_string(options, "delimiter").filter(|d| !d.is_empty()),
            },
            TransformKind::NormalizePath => Transform::NormalizePath,
            TransformKind::Basename => Transform::Basename,
            TransformKind::Replace => Transform::Replace {
                mappings: options
                    .get("mappings")
                    .and_then(Value::as_object)
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| {
                                scalar_to_string(v).map(|v| (k.trim().to_lowercase(), v))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Transform::Unknown(_))
    }

    /// 执行转换
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Trim => value.trim().to_string(),
            Transform::Uppercase => value.to_uppercase(),
            Transform::Lowercase => value.to_lowercase(),
            Transform::Titlecase => titlecase(value),
            Transform::NormalizeWhitespace => value.split_whitespace().collect::<Vec<_>>().join(" "),
            Transform::StripHtml => strip_html(value),
            Transform::Truncate { length } => truncate(value, *length),
            Transform::Append { suffix } => format!("{}{}", value, suffix),
            Transform::Prepend { prefix } => format!("{}{}", prefix, value),
            Transform::DefaultIfEmpty { default } => or_if_empty(value, default),
            Transform::ReplaceEmpty { replacement } => or_if_empty(value, replacement),
            Transform::MapLevel => map_level(value),
            Transform::MapBoolean => {
                if map_boolean(value) {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            Transform::MapEntityType => map_entity_type(value).to_string(),
            Transform::FirstValue { delimiter } => first_value(value, delimiter.as_deref()),
            Transform::NormalizePath => normalize_path(value),
            Transform::Basename => basename(value),
            Transform::Replace { mappings } => mappings
                .get(&value.trim().to_lowercase())
                .cloned()
                .unwrap_or_else(|| value.to_string()),
            Transform::Unknown(_) => value.to_string(),
        }
    }
}

// ===== 参数读取 =====

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn option_string(options: &Map<String, Value>, key: &str) -> Option<String> {
    options.get(key).and_then(scalar_to_string)
}

// ===== 文本 =====

fn or_if_empty(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn titlecase(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_alphanumeric() || ch == '\'' {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn strip_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

// 超长截断并以 "..." 结尾（总长度不超过 length 个字符）
fn truncate(value: &str, length: usize) -> String {
    if value.chars().count() <= length {
        return value.to_string();
    }
    let keep = length.saturating_sub(3);
    let mut out: String = value.chars().take(keep).collect();
    out.push_str("...");
    out
}

// ===== 词表映射 =====

fn map_level(value: &str) -> String {
    let mapped = match value.trim().to_lowercase().as_str() {
        "collection" => "Collection",
        "fonds" => "Fonds",
        "subfonds" | "sub-fonds" => "Sub-fonds",
        "recordgrp" | "record group" => "Record group",
        "subgrp" | "sub-group" => "Sub-group",
        "series" => "Series",
        "subseries" | "sub-series" => "Sub-series",
        "file" => "File",
        "item" | "piece" => "Item",
        "otherlevel" | "part" => "Part",
        "class" => "Class",
        "object" | "work" | "artwork" | "artifact" | "specimen" => "Item",
        "volume" | "issue" => "Item",
        _ => return upper_first(value),
    };
    mapped.to_string()
}

fn upper_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn map_boolean(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "true" | "1" | "y" | "on" | "published" | "public" | "active" | "enabled"
    )
}

fn map_entity_type(value: &str) -> &'static str {
    match value.trim().to_lowercase().as_str() {
        "organisation" | "organization" | "corporate" | "company" | "institution" | "corp" => {
            "corporate_body"
        }
        "family" | "group" => "family",
        _ => "person",
    }
}

// ===== 多值 =====

fn first_value(value: &str, delimiter: Option<&str>) -> String {
    let delimiter = delimiter.or_else(|| {
        MULTI_VALUE_DELIMITERS
            .iter()
            .copied()
            .find(|d| value.contains(d))
    });

    match delimiter {
        Some(d) => value
            .split(d)
            .map(str::trim)
            .find(|part| !part.is_empty())
            .unwrap_or("")
            .to_string(),
        None => value.to_string(),
    }
}

// ===== 路径 =====

fn normalize_path(value: &str) -> String {
    let replaced = value.replace('\\', "/");

    let mut collapsed = String::with_capacity(replaced.len());
    let mut prev_slash = false;
    for ch in replaced.chars() {
        if ch == '/' {
            if !prev_slash {
                collapsed.push(ch);
            }
            prev_slash = true;
        } else {
            collapsed.push(ch);
            prev_slash = false;
        }
    }

    let mut rest = collapsed.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

fn basename(value: &str) -> String {
    let normalized = normalize_path(value);
    normalized
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .to_string()
}
