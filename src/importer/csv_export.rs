// ==========================================
// 档案目录树导入系统 - 映射结果导出
// ==========================================
// 用途: 试运行时导出映射结果，供人工核对方案
// 列: 全部记录字段的并集，按记录先后追加；单条记录内按字段名字典序
// ==========================================

use crate::domain::mapping::TargetRecord;
use crate::importer::error::ImportResult;
use csv::Writer;
use std::io::Write;
use std::path::Path;

/// 导出列（字段并集）
///
/// 记录按先后贡献新列，同一条记录内的新列按字段名字典序排列
pub fn export_columns(records: &[TargetRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for field in record.field_names() {
            if !columns.iter().any(|c| c == field) {
                columns.push(field.clone());
            }
        }
    }
    columns
}

/// 写出到任意 Writer
pub fn write_records<W: Write>(records: &[TargetRecord], out: W) -> ImportResult<()> {
    let columns = export_columns(records);
    let mut writer = Writer::from_writer(out);

    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| record.get(c).unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

/// 写出到文件（覆盖）
pub fn export_to_file(records: &[TargetRecord], path: &Path) -> ImportResult<usize> {
    let file = std::fs::File::create(path)?;
    write_records(records, file)?;
    tracing::info!(path = %path.display(), rows = records.len(), "映射结果已导出");
    Ok(records.len())
}
