// ==========================================
// 档案目录树导入系统 - 文件解析器实现
// ==========================================
// 支持: CSV/TSV (.csv/.tsv/.txt) / Excel (.xlsx/.xls/.xlsm/.ods) / JSON (.json)
// 输出: SourceTable {headers, rows}
// ==========================================

use crate::domain::mapping::SourceTable;
use crate::importer::catalog_importer_trait::FileParser;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use serde_json::Value;
use std::fs;
use std::path::Path;

// 自动识别的分隔符
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// 去空白并跳过全空行
fn push_row(rows: &mut Vec<Vec<String>>, values: Vec<String>) {
    if values.iter().all(|v| v.is_empty()) {
        return;
    }
    rows.push(values);
}

// ==========================================
// CSV Parser 实现
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser {
    /// 指定分隔符；None 时按首行自动识别
    pub delimiter: Option<u8>,
}

impl CsvParser {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
        }
    }

    /// 按首行（引号外）出现次数最多的候选分隔符识别，默认逗号
    pub fn detect_delimiter(content: &str) -> u8 {
        let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

        let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
        let mut in_quotes = false;
        for byte in first_line.bytes() {
            if byte == b'"' {
                in_quotes = !in_quotes;
                continue;
            }
            if in_quotes {
                continue;
            }
            if let Some(pos) = CANDIDATE_DELIMITERS.iter().position(|d| *d == byte) {
                counts[pos] += 1;
            }
        }

        let mut best = 0;
        for (pos, count) in counts.iter().enumerate() {
            if *count > counts[best] {
                best = pos;
            }
        }
        CANDIDATE_DELIMITERS[best]
    }

    /// 解析 CSV 文本
    pub fn parse_str(&self, content: &str) -> ImportResult<SourceTable> {
        let content = content.trim_start_matches('\u{feff}');
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| Self::detect_delimiter(content));

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .from_reader(content.as_bytes());

        // 读取表头
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeaders);
        }

        // 读取所有行
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            push_row(&mut rows, record.iter().map(|v| v.trim().to_string()).collect());
        }

        Ok(SourceTable::new(headers, rows))
    }
}

impl FileParser for CsvParser {
    fn parse(&self, file_path: &Path) -> ImportResult<SourceTable> {
        ensure_exists(file_path)?;
        let content = fs::read_to_string(file_path)?;
        self.parse_str(&content)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ExcelParser {
    /// 指定工作表；None 时读取第一个
    pub sheet_name: Option<String>,
}

impl ExcelParser {
    pub fn with_sheet(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: Some(sheet_name.into()),
        }
    }
}

impl FileParser for ExcelParser {
    fn parse(&self, file_path: &Path) -> ImportResult<SourceTable> {
        ensure_exists(file_path)?;

        let mut workbook = open_workbook_auto(file_path)?;

        let sheet_name = match &self.sheet_name {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?,
        };
        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows.next().ok_or(ImportError::MissingHeaders)?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        // 读取数据行
        let mut rows = Vec::new();
        for data_row in sheet_rows {
            push_row(
                &mut rows,
                data_row
                    .iter()
                    .map(|cell| cell.to_string().trim().to_string())
                    .collect(),
            );
        }

        Ok(SourceTable::new(headers, rows))
    }
}

// ==========================================
// JSON Parser 实现
// ==========================================
// 两种形态:
// - {"headers": [...], "rows": [[...], ...]}
// - [{"列": "值", ...}, ...]（表头为各对象键的并集，按首次出现顺序）
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

impl JsonParser {
    pub fn parse_str(&self, content: &str) -> ImportResult<SourceTable> {
        let document: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;

        match document {
            Value::Object(obj) => {
                let headers: Vec<String> = obj
                    .get("headers")
                    .and_then(Value::as_array)
                    .ok_or(ImportError::MissingHeaders)?
                    .iter()
                    .map(cell_to_string)
                    .collect();

                let mut rows = Vec::new();
                for row in obj.get("rows").and_then(Value::as_array).into_iter().flatten() {
                    let values = row.as_array().ok_or_else(|| {
                        ImportError::JsonParseError("rows 中的每一行必须是数组".to_string())
                    })?;
                    push_row(&mut rows, values.iter().map(cell_to_string).collect());
                }
                Ok(SourceTable::new(headers, rows))
            }
            Value::Array(items) => {
                let mut headers: Vec<String> = Vec::new();
                for item in &items {
                    let obj = item.as_object().ok_or_else(|| {
                        ImportError::JsonParseError("数组元素必须是对象".to_string())
                    })?;
                    for key in obj.keys() {
                        if !headers.iter().any(|h| h == key) {
                            headers.push(key.clone());
                        }
                    }
                }
                if headers.is_empty() {
                    return Err(ImportError::MissingHeaders);
                }

                let mut rows = Vec::new();
                for item in &items {
                    let values = headers
                        .iter()
                        .map(|h| item.get(h).map(cell_to_string).unwrap_or_default())
                        .collect();
                    push_row(&mut rows, values);
                }
                Ok(SourceTable::new(headers, rows))
            }
            _ => Err(ImportError::JsonParseError(
                "顶层必须是对象或数组".to_string(),
            )),
        }
    }
}

impl FileParser for JsonParser {
    fn parse(&self, file_path: &Path) -> ImportResult<SourceTable> {
        ensure_exists(file_path)?;
        let content = fs::read_to_string(file_path)?;
        self.parse_str(&content)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, file_path: &Path) -> ImportResult<SourceTable> {
        match extension_of(file_path).as_str() {
            "csv" | "txt" => CsvParser::default().parse(file_path),
            "tsv" => CsvParser::with_delimiter(b'\t').parse(file_path),
            "xlsx" | "xls" | "xlsm" | "ods" => ExcelParser::default().parse(file_path),
            "json" => JsonParser.parse(file_path),
            ext => Err(ImportError::UnsupportedFormat(ext.to_string())),
        }
    }
}
