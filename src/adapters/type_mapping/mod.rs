// 型マッピングサービス
//
// 方言に依存しない共通インターフェースで
// DataType -> SQL型文字列（DDL用）と、カタログ上の型 -> describeTable用の型名
// の変換を一元管理します。

pub mod common;
mod mysql_mapper;
mod postgres_mapper;
mod sqlite_mapper;

pub use mysql_mapper::MySqlTypeMapper;
pub use postgres_mapper::PostgresTypeMapper;
pub use sqlite_mapper::SqliteTypeMapper;

use crate::core::config::Dialect;
use crate::core::schema::DataType;

/// 型メタデータ
///
/// カタログから取得した型の追加情報を保持します。
#[derive(Debug, Clone, Default)]
pub struct TypeMetadata {
    /// 文字列型の最大長
    pub char_max_length: Option<u32>,
    /// 数値型の精度
    pub numeric_precision: Option<u32>,
    /// 数値型の小数点以下桁数
    pub numeric_scale: Option<u32>,
    /// ユーザー定義型名（PostgreSQLのENUM等）
    pub udt_name: Option<String>,
    /// ENUM値のリスト
    pub enum_values: Option<Vec<String>>,
}

/// 型のレンダリング文脈
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeRenderContext<'a> {
    /// 自動増分カラムか（PostgreSQLのSERIAL等）
    pub auto_increment: bool,
    /// 列挙型の型名（PostgreSQLのみ、クォート・スキーマ修飾済み）
    pub enum_type: Option<&'a str>,
}

/// 方言固有の型マッピング
pub trait TypeMapper: Send + Sync {
    /// DataTypeからSQL型文字列へ変換
    fn format_sql_type(&self, data_type: &DataType, context: &TypeRenderContext<'_>) -> String;

    /// カタログ上の型名から describeTable が返す型名へ変換
    ///
    /// # Arguments
    /// * `sql_type` - カタログから取得した型文字列
    /// * `metadata` - 追加メタデータ
    fn describe_sql_type(&self, sql_type: &str, metadata: &TypeMetadata) -> String;
}

/// 型マッピングサービス
///
/// 方言に依存しない共通インターフェースで型変換を提供します。
pub struct TypeMappingService {
    dialect: Dialect,
    mapper: Box<dyn TypeMapper>,
}

impl Clone for TypeMappingService {
    fn clone(&self) -> Self {
        Self::new(self.dialect)
    }
}

impl std::fmt::Debug for TypeMappingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMappingService")
            .field("dialect", &self.dialect)
            .finish()
    }
}

impl TypeMappingService {
    /// 新しいTypeMappingServiceを作成
    pub fn new(dialect: Dialect) -> Self {
        let mapper: Box<dyn TypeMapper> = match dialect {
            Dialect::PostgreSQL => Box::new(PostgresTypeMapper),
            Dialect::MySQL => Box::new(MySqlTypeMapper),
            Dialect::SQLite => Box::new(SqliteTypeMapper),
        };
        Self { dialect, mapper }
    }

    /// 方言を取得
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// DataType -> SQL型文字列
    pub fn to_sql_type(&self, data_type: &DataType) -> String {
        self.mapper
            .format_sql_type(data_type, &TypeRenderContext::default())
    }

    /// DataType -> SQL型文字列（文脈付き）
    pub fn to_sql_type_with(&self, data_type: &DataType, context: &TypeRenderContext<'_>) -> String {
        self.mapper.format_sql_type(data_type, context)
    }

    /// カタログ上の型 -> describeTable用の型名
    pub fn describe_sql_type(&self, sql_type: &str, metadata: &TypeMetadata) -> String {
        self.mapper.describe_sql_type(sql_type, metadata)
    }
}
