// 型カテゴリ分類
//
// カラム型を型カテゴリに分類します。
// PostgreSQLで型変更にUSING句が必要かどうかの判定に使用されます。

use super::schema::DataType;

/// 型カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// 数値型 (INTEGER, DECIMAL, FLOAT, DOUBLE)
    Numeric,
    /// 文字列型 (VARCHAR, TEXT, CHAR)
    String,
    /// 日時型 (DATE, TIMESTAMP)
    DateTime,
    /// バイナリ型 (BLOB)
    Binary,
    /// JSON型 (JSON, JSONB)
    Json,
    /// 真偽値型 (BOOLEAN)
    Boolean,
    /// UUID型 (UUID)
    Uuid,
    /// 列挙型
    Enum,
    /// その他（判定できない方言固有型）
    Other,
}

impl TypeCategory {
    /// DataTypeから型カテゴリを判定
    pub fn from_data_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::SMALLINT
            | DataType::INTEGER
            | DataType::BIGINT
            | DataType::DECIMAL { .. }
            | DataType::FLOAT
            | DataType::DOUBLE => TypeCategory::Numeric,

            DataType::STRING { .. } | DataType::CHAR { .. } | DataType::TEXT => {
                TypeCategory::String
            }

            DataType::DATE | DataType::DATETIME => TypeCategory::DateTime,
            DataType::BLOB => TypeCategory::Binary,
            DataType::JSON => TypeCategory::Json,
            DataType::BOOLEAN => TypeCategory::Boolean,
            DataType::UUID => TypeCategory::Uuid,
            DataType::Enum { .. } => TypeCategory::Enum,
            DataType::Raw { sql } => Self::from_sql_type(sql),
        }
    }

    /// カタログ上の型名（"character varying(255)", "int(11)" 等）から型カテゴリを判定
    pub fn from_sql_type(sql_type: &str) -> Self {
        let lower = sql_type.trim().to_lowercase();
        let base = lower
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or_default();

        match base {
            "smallint" | "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" | "decimal" | "numeric"
            | "real" | "float" | "float4" | "float8" | "double" => {
                // MySQLのTINYINT(1)は真偽値として扱う
                if lower == "tinyint(1)" {
                    TypeCategory::Boolean
                } else {
                    TypeCategory::Numeric
                }
            }
            "character" | "varchar" | "char" | "text" | "tinytext" | "mediumtext"
            | "longtext" | "bpchar" | "clob" => TypeCategory::String,
            "date" | "datetime" | "timestamp" | "timestamptz" | "time" | "timetz" => {
                TypeCategory::DateTime
            }
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary"
            | "varbinary" => TypeCategory::Binary,
            "json" | "jsonb" => TypeCategory::Json,
            "boolean" | "bool" => TypeCategory::Boolean,
            "uuid" => TypeCategory::Uuid,
            "enum" => TypeCategory::Enum,
            _ => TypeCategory::Other,
        }
    }

    /// 型変更時に明示的なキャストが必要かどうか
    ///
    /// PostgreSQLはカテゴリをまたぐ変換を暗黙に行わないため、
    /// カテゴリが異なる場合は `USING col::type` を付与します。
    pub fn requires_cast_to(&self, to: &Self) -> bool {
        self != to
    }
}
