// MySQL用型マッパー

use super::common::{format_common_sql_type, parse_enum_labels};
use super::{TypeMapper, TypeMetadata, TypeRenderContext};
use crate::adapters::sql_quote::quote_literal;
use crate::core::config::Dialect;
use crate::core::schema::DataType;

/// MySQL用型マッパー
pub struct MySqlTypeMapper;

impl TypeMapper for MySqlTypeMapper {
    fn format_sql_type(&self, data_type: &DataType, _context: &TypeRenderContext<'_>) -> String {
        if let Some(sql) = format_common_sql_type(data_type) {
            return sql;
        }

        match data_type {
            DataType::INTEGER => "INT".to_string(),
            DataType::DOUBLE => "DOUBLE".to_string(),
            DataType::BOOLEAN => "TINYINT(1)".to_string(),
            DataType::DATETIME => "DATETIME".to_string(),
            DataType::UUID => "CHAR(36)".to_string(),
            DataType::JSON => "JSON".to_string(),
            DataType::BLOB => "BLOB".to_string(),
            // MySQLはインラインENUMで表現
            DataType::Enum { values } => format!(
                "ENUM({})",
                values
                    .iter()
                    .map(|v| quote_literal(Dialect::MySQL, v))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => "TEXT".to_string(),
        }
    }

    fn describe_sql_type(&self, sql_type: &str, metadata: &TypeMetadata) -> String {
        // COLUMN_TYPE（例: "varchar(255)", "int unsigned"）をそのまま大文字化
        // ENUMはラベルの大小文字を保ったまま "ENUM('a','b')" の形にする
        let labels = metadata
            .enum_values
            .clone()
            .or_else(|| parse_enum_labels(sql_type));
        match labels {
            Some(labels) => format!(
                "ENUM({})",
                labels
                    .iter()
                    .map(|v| quote_literal(Dialect::MySQL, v))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            None => sql_type.to_uppercase(),
        }
    }
}
