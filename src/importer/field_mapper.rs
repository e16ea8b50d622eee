// ==========================================
// 档案目录树导入系统 - 字段映射器实现
// ==========================================
// 职责: 源行 → 目标记录（按映射方案的有序规则）
// 红线: 同输入同方案 → 逐字节相同的输出
// 红线: 不感知层级，不落库
// ==========================================

use crate::domain::mapping::{MappingRule, SourceRow, SourceTable, TargetRecord};
use crate::importer::error::RecordIssue;
use crate::importer::transform::Transform;
use std::collections::HashMap;
use tracing::{debug, warn};

// 预编译的规则：转换与拼接符号只解析一次
#[derive(Debug, Clone)]
struct CompiledRule {
    source_field: String,
    target_field: String,
    constant_value: String,
    concatenate: bool,
    concat_constant: bool,
    concat_symbol: String,
    transform: Option<Transform>,
}

impl CompiledRule {
    fn compile(rule: &MappingRule) -> Self {
        let transform = rule
            .transform
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Transform::from_rule(name, &rule.transform_options));

        if let Some(Transform::Unknown(name)) = &transform {
            warn!(
                transform = %name,
                target_field = %rule.target_field,
                "未知的值转换，按原值透传"
            );
        }

        Self {
            source_field: rule.source_field.trim().to_string(),
            target_field: rule.target_field.trim().to_string(),
            constant_value: rule.constant_value.clone(),
            concatenate: rule.concatenate,
            concat_constant: rule.concat_constant,
            concat_symbol: rule.effective_concat_symbol(),
            transform,
        }
    }

    // 单条规则对单行的取值（空串表示本规则无产出）
    fn evaluate(&self, row: &SourceRow<'_>) -> String {
        let candidate = if self.source_field.is_empty() {
            ""
        } else {
            row.get(&self.source_field).map(str::trim).unwrap_or("")
        };

        let candidate = match &self.transform {
            Some(transform) => transform.apply(candidate),
            None => candidate.to_string(),
        };

        if !self.constant_value.is_empty() {
            if self.concat_constant {
                return format!("{}{}", self.constant_value, candidate);
            }
            if candidate.is_empty() {
                return self.constant_value.clone();
            }
        }
        candidate
    }
}

/// 整表映射结果
#[derive(Debug, Clone, Default)]
pub struct MappingOutcome {
    /// 有字段产出的记录（保持源行顺序）
    pub records: Vec<TargetRecord>,

    /// 无任何字段产出而丢弃的行数
    pub skipped: usize,

    /// 非致命问题（缺失的源列，每个表头集合只报一次）
    pub issues: Vec<RecordIssue>,
}

// ==========================================
// FieldMapper - 字段映射器
// ==========================================
#[derive(Debug, Clone)]
pub struct FieldMapper {
    rules: Vec<CompiledRule>,
}

impl FieldMapper {
    /// 按方案规则构造（只保留 include=true 且目标字段非空的规则，顺序不变）
    pub fn new(rules: &[MappingRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| rule.include && !rule.target_field.trim().is_empty())
            .map(CompiledRule::compile)
            .collect::<Vec<_>>();
        debug!(rule_count = rules.len(), "映射规则编译完成");
        Self { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 映射单行
    pub fn map_row(&self, row: &SourceRow<'_>) -> TargetRecord {
        let mut record = TargetRecord::new();

        for rule in &self.rules {
            let value = rule.evaluate(row);
            if value.is_empty() {
                continue;
            }

            match record.get_mut(&rule.target_field) {
                Some(existing) if !existing.is_empty() => {
                    if rule.concatenate {
                        existing.push_str(&rule.concat_symbol);
                        existing.push_str(&value);
                    }
                    // 非拼接规则：先到先得
                }
                _ => record.insert(rule.target_field.clone(), value),
            }
        }

        record
    }

    /// 方案引用了、但表头中不存在的源列（去重，保持规则顺序）
    pub fn missing_source_fields(&self, header_index: &HashMap<&str, usize>) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for rule in &self.rules {
            if rule.source_field.is_empty() || header_index.contains_key(rule.source_field.as_str()) {
                continue;
            }
            if !missing.contains(&rule.source_field) {
                missing.push(rule.source_field.clone());
            }
        }
        missing
    }

    /// 映射整张表
    pub fn map_table(&self, table: &SourceTable) -> MappingOutcome {
        let header_index = table.header_index();
        let mut outcome = MappingOutcome::default();

        for field in self.missing_source_fields(&header_index) {
            warn!(source_field = %field, "源列不存在，按空值处理");
            outcome.issues.push(RecordIssue::MissingSourceField { field });
        }

        outcome.records.reserve(table.len());
        for (row_idx, values) in table.rows.iter().enumerate() {
            let row = SourceRow::new(&header_index, values);
            let record = self.map_row(&row);
            if record.is_empty() {
                debug!(row = row_idx + 1, "行无任何映射产出，跳过");
                outcome.skipped += 1;
                continue;
            }
            outcome.records.push(record);
        }

        outcome
    }
}
