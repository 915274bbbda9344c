// SQLite用型マッパー

use super::common::format_common_sql_type;
use super::{TypeMapper, TypeMetadata, TypeRenderContext};
use crate::core::schema::DataType;

/// SQLite用型マッパー
///
/// SQLiteは宣言された型名をそのまま保持するため、意味上の型名で宣言します。
/// 型アフィニティは宣言名から決まります。
pub struct SqliteTypeMapper;

impl TypeMapper for SqliteTypeMapper {
    fn format_sql_type(&self, data_type: &DataType, context: &TypeRenderContext<'_>) -> String {
        // AUTOINCREMENTは INTEGER PRIMARY KEY にしか付けられない
        if context.auto_increment && data_type.is_integer() {
            return "INTEGER".to_string();
        }

        if let Some(sql) = format_common_sql_type(data_type) {
            return sql;
        }

        match data_type {
            DataType::INTEGER => "INTEGER".to_string(),
            DataType::DOUBLE => "DOUBLE".to_string(),
            DataType::BOOLEAN => "BOOLEAN".to_string(),
            DataType::DATETIME => "DATETIME".to_string(),
            DataType::UUID => "CHAR(36)".to_string(),
            DataType::BLOB => "BLOB".to_string(),
            // 列挙型はTEXT + CHECK制約で表現（CHECKは生成側で付与）
            DataType::JSON | DataType::Enum { .. } => "TEXT".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn describe_sql_type(&self, sql_type: &str, metadata: &TypeMetadata) -> String {
        if metadata.enum_values.is_some() {
            return "ENUM".to_string();
        }
        sql_type.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::type_mapping::TypeMappingService;
    use crate::core::config::Dialect;

    use super::*;

    #[test]
    fn test_sqlite_types() {
        let service = TypeMappingService::new(Dialect::SQLite);
        assert_eq!(service.to_sql_type(&DataType::INTEGER), "INTEGER");
        assert_eq!(service.to_sql_type(&DataType::string()), "VARCHAR(255)");
        assert_eq!(service.to_sql_type(&DataType::DOUBLE), "DOUBLE");
        assert_eq!(service.to_sql_type(&DataType::JSON), "TEXT");
        assert_eq!(service.to_sql_type(&DataType::enumeration(["a"])), "TEXT");
    }

    #[test]
    fn test_sqlite_auto_increment_forces_integer() {
        let service = TypeMappingService::new(Dialect::SQLite);
        let context = TypeRenderContext {
            auto_increment: true,
            enum_type: None,
        };
        assert_eq!(service.to_sql_type_with(&DataType::BIGINT, &context), "INTEGER");
    }

    #[test]
    fn test_sqlite_describe() {
        let service = TypeMappingService::new(Dialect::SQLite);
        assert_eq!(
            service.describe_sql_type("varchar(255)", &TypeMetadata::default()),
            "VARCHAR(255)"
        );
        assert_eq!(
            service.describe_sql_type(
                "TEXT",
                &TypeMetadata {
                    enum_values: Some(vec!["a".to_string()]),
                    ..Default::default()
                }
            ),
            "ENUM"
        );
    }
}
