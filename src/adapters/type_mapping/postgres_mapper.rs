// PostgreSQL用型マッパー

use super::common::{format_common_sql_type, with_length};
use super::{TypeMapper, TypeMetadata, TypeRenderContext};
use crate::core::schema::DataType;

/// PostgreSQL用型マッパー
pub struct PostgresTypeMapper;

impl TypeMapper for PostgresTypeMapper {
    fn format_sql_type(&self, data_type: &DataType, context: &TypeRenderContext<'_>) -> String {
        if context.auto_increment {
            match data_type {
                DataType::SMALLINT => return "SMALLSERIAL".to_string(),
                DataType::INTEGER => return "SERIAL".to_string(),
                DataType::BIGINT => return "BIGSERIAL".to_string(),
                _ => {}
            }
        }

        if let Some(sql) = format_common_sql_type(data_type) {
            return sql;
        }

        match data_type {
            DataType::INTEGER => "INTEGER".to_string(),
            DataType::DOUBLE => "DOUBLE PRECISION".to_string(),
            DataType::BOOLEAN => "BOOLEAN".to_string(),
            DataType::DATETIME => "TIMESTAMP WITH TIME ZONE".to_string(),
            DataType::UUID => "UUID".to_string(),
            DataType::JSON => "JSON".to_string(),
            DataType::BLOB => "BYTEA".to_string(),
            // 列挙型は事前に作成した型を参照する
            DataType::Enum { .. } => context
                .enum_type
                .map(str::to_string)
                .unwrap_or_else(|| "TEXT".to_string()),
            _ => "TEXT".to_string(),
        }
    }

    fn describe_sql_type(&self, sql_type: &str, metadata: &TypeMetadata) -> String {
        match sql_type {
            "USER-DEFINED" => {
                if metadata.enum_values.is_some() {
                    "ENUM".to_string()
                } else {
                    metadata
                        .udt_name
                        .as_deref()
                        .unwrap_or(sql_type)
                        .to_uppercase()
                }
            }
            // 他の方言と同じ表記にそろえる
            "character varying" => with_length("VARCHAR", metadata.char_max_length),
            "character" => with_length("CHAR", metadata.char_max_length),
            "bit" | "bit varying" => with_length(sql_type, metadata.char_max_length),
            "numeric" => match (metadata.numeric_precision, metadata.numeric_scale) {
                (Some(precision), Some(scale)) => format!("NUMERIC({},{})", precision, scale),
                _ => "NUMERIC".to_string(),
            },
            _ => sql_type.to_uppercase(),
        }
    }
}
