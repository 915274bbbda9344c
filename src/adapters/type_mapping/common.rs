// 共通型フォーマットロジック
//
// 複数の方言で共通するDataType → SQL型文字列の変換と、
// 型名の整形・列挙ラベルの解析を提供します。

use crate::core::schema::DataType;

/// 共通SQL型のフォーマット
///
/// 方言固有の変換が必要な場合は `None` を返します。
pub fn format_common_sql_type(data_type: &DataType) -> Option<String> {
    match data_type {
        DataType::SMALLINT => Some("SMALLINT".to_string()),
        DataType::BIGINT => Some("BIGINT".to_string()),
        DataType::FLOAT => Some("FLOAT".to_string()),
        DataType::DECIMAL { precision, scale } => Some(format!("DECIMAL({}, {})", precision, scale)),
        DataType::STRING { length } => Some(format!("VARCHAR({})", length)),
        DataType::CHAR { length } => Some(format!("CHAR({})", length)),
        DataType::TEXT => Some("TEXT".to_string()),
        DataType::DATE => Some("DATE".to_string()),
        DataType::Raw { sql } => Some(sql.clone()),
        _ => None,
    }
}

/// 型名と長さ・精度を組み合わせて大文字の型名を作る
///
/// 例: ("character varying", Some(255)) -> "CHARACTER VARYING(255)"
pub fn with_length(sql_type: &str, length: Option<u32>) -> String {
    match length {
        Some(length) => format!("{}({})", sql_type.to_uppercase(), length),
        None => sql_type.to_uppercase(),
    }
}

/// `enum('a','b')` 形式の型定義からラベルを取り出す
///
/// ラベル内の `''` は `'` に戻します。
pub fn parse_enum_labels(sql_type: &str) -> Option<Vec<String>> {
    let trimmed = sql_type.trim();
    if !trimmed.to_lowercase().starts_with("enum(") || !trimmed.ends_with(')') {
        return None;
    }
    let body = &trimmed[5..trimmed.len() - 1];
    Some(parse_quoted_list(body))
}

/// `'a', 'b', 'c'` 形式のリストを解析
pub fn parse_quoted_list(body: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quote) {
            ('\'', false) => in_quote = true,
            ('\'', true) => {
                if chars.peek() == Some(&'\'') {
                    current.push('\'');
                    chars.next();
                } else {
                    in_quote = false;
                    labels.push(std::mem::take(&mut current));
                }
            }
            ('\\', true) => {
                // MySQLのバックスラッシュエスケープ
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (_, true) => current.push(c),
            (_, false) => {}
        }
    }

    labels
}
