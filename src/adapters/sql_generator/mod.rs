// SQL生成アダプター
//
// カラム定義と観測状態から各データベース方言用のDDL文を生成するアダプター層。

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlite_table_recreator;

pub use mysql::MysqlSqlGenerator;
pub use postgres::PostgresSqlGenerator;
pub use sqlite::SqliteSqlGenerator;

use crate::adapters::sql_quote::{quote_columns, quote_identifier, quote_literal, quote_table};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::schema::{
    ColumnChange, ColumnDefinition, DefaultValue, ForeignKeyTarget, TableIdentifier,
};
use crate::core::snapshot::{ForeignKey, TableLayout, TableSnapshot};

/// 方言の能力
///
/// エンジンは方言名ではなくこの記述に従って実行戦略を選びます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// DDLをトランザクション内で実行できるか
    pub transactional_ddl: bool,
    /// ALTER COLUMN / MODIFY COLUMN でカラムを変更できるか
    pub native_alter_column: bool,
    /// 名前付きの列挙型を持つか
    pub native_enum: bool,
    /// スキーマ（名前空間）を持つか
    pub supports_schemas: bool,
    /// カラムコメントを持つか
    pub supports_column_comments: bool,
    /// テーブルを作り直さずに外部キーを追加・削除できるか
    pub alter_foreign_key_in_place: bool,
}

/// カラム変更の入力
///
/// 観測状態・現在の定義・目標定義・元の変更要求をまとめたもの。
#[derive(Debug, Clone, Copy)]
pub struct ColumnAlteration<'a> {
    /// テーブルの観測状態
    pub snapshot: &'a TableSnapshot,
    /// 対象カラム名
    pub column: &'a str,
    /// 観測状態から導出した現在の定義
    pub current: &'a ColumnDefinition,
    /// 変更適用後の目標定義
    pub target: &'a ColumnDefinition,
    /// 元の変更要求（どのプロパティが指定されたかの判定に使う）
    pub change: &'a ColumnChange,
}

impl ColumnAlteration<'_> {
    /// 型の変更が要求されているか
    pub fn changes_type(&self) -> bool {
        self.change.data_type.is_some()
    }

    /// NULL許可フラグが変わるか
    pub fn changes_nullability(&self) -> bool {
        self.current.allow_null != self.target.allow_null
    }

    /// デフォルト値の変更が要求されているか
    pub fn changes_default(&self) -> bool {
        self.change.touches_default()
    }

    /// 自動増分フラグが変わるか
    pub fn changes_auto_increment(&self) -> bool {
        self.current.auto_increment != self.target.auto_increment
    }

    /// プライマリキーフラグが変わるか
    pub fn changes_primary_key(&self) -> bool {
        self.current.primary_key != self.target.primary_key
    }

    /// ユニーク制約が変わるか
    pub fn changes_unique(&self) -> bool {
        self.current.unique != self.target.unique
    }

    /// コメントが変わるか
    pub fn changes_comment(&self) -> bool {
        self.change.comment.is_some() && self.current.comment != self.target.comment
    }

    /// 外部キーの変更が要求されているか
    pub fn changes_references(&self) -> bool {
        self.change.references.is_some()
    }

    /// プライマリキーの追加が既存の別カラムのプライマリキーと衝突するか
    pub fn check_primary_key_conflict(&self) -> Result<(), MigrationEngineError> {
        let pk = &self.snapshot.primary_key_columns;
        if self.target.primary_key
            && !self.current.primary_key
            && pk.iter().any(|c| c != self.column)
        {
            return Err(MigrationEngineError::conflict(
                self.snapshot.table.to_string(),
                self.column,
                format!("table already has a primary key on ({})", pk.join(", ")),
            ));
        }
        Ok(())
    }
}

/// SQLジェネレータートレイト
///
/// 各データベース方言用のSQLジェネレーターが実装すべきインターフェース。
pub trait SqlGenerator: Send + Sync {
    /// 方言
    fn dialect(&self) -> Dialect;

    /// 方言の能力
    fn capabilities(&self) -> DialectCapabilities;

    /// CREATE TABLE文（と付随する文）を生成
    fn generate_create_table(&self, layout: &TableLayout) -> Result<Vec<String>, MigrationEngineError>;

    /// ALTER TABLE ADD COLUMN文（と付随する文）を生成
    fn generate_add_column(
        &self,
        table: &TableIdentifier,
        column: &str,
        definition: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationEngineError>;

    /// カラム変更文を生成
    ///
    /// 要求されたプロパティだけを変更する最小の文の並びを返します。
    /// ネイティブのALTER COLUMNを持たない方言は `UnsupportedAlteration` を返します。
    fn generate_change_column(
        &self,
        alteration: &ColumnAlteration<'_>,
    ) -> Result<Vec<String>, MigrationEngineError>;

    /// ADD COLUMN ではなくテーブル再構築で追加する必要があるか
    fn add_column_requires_rebuild(&self, _definition: &ColumnDefinition) -> bool {
        false
    }

    /// カラムリネーム文を生成
    fn generate_rename_column(
        &self,
        table: &TableIdentifier,
        old_name: &str,
        new_name: &str,
    ) -> Vec<String> {
        let dialect = self.dialect();
        vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_table(dialect, table),
            quote_identifier(dialect, old_name),
            quote_identifier(dialect, new_name)
        )]
    }

    /// スキーマ作成文を生成
    ///
    /// スキーマを持たない方言は空のベクターを返します。
    fn generate_create_schema(&self, _schema: &str) -> Vec<String> {
        Vec::new()
    }
}

/// 方言に応じたSQLジェネレーターを作成
pub fn create_generator(dialect: Dialect) -> Box<dyn SqlGenerator> {
    match dialect {
        Dialect::PostgreSQL => Box::new(PostgresSqlGenerator::new()),
        Dialect::MySQL => Box::new(MysqlSqlGenerator::new()),
        Dialect::SQLite => Box::new(SqliteSqlGenerator::new()),
    }
}

/// デフォルト値をSQLリテラルとして出力
pub(crate) fn render_default(dialect: Dialect, value: &DefaultValue) -> String {
    match value {
        DefaultValue::Null => "NULL".to_string(),
        DefaultValue::Bool(b) => match (dialect, b) {
            (Dialect::SQLite, true) => "1".to_string(),
            (Dialect::SQLite, false) => "0".to_string(),
            (_, true) => "TRUE".to_string(),
            (_, false) => "FALSE".to_string(),
        },
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Float(f) => f.to_string(),
        DefaultValue::Text(s) => quote_literal(dialect, s),
        DefaultValue::Expression { expression } => expression.clone(),
    }
}

/// 列挙ラベルをカンマ区切りのリテラル列に整形
pub(crate) fn format_enum_values(dialect: Dialect, values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(dialect, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 外部キーの参照先句（REFERENCES ... ON DELETE ... ON UPDATE ...）を生成
///
/// 参照先スキーマが省略された場合は参照元テーブルのスキーマを使います。
pub(crate) fn format_references(
    dialect: Dialect,
    table: &TableIdentifier,
    target: &ForeignKeyTarget,
) -> String {
    let referenced = TableIdentifier {
        table_name: target.table.clone(),
        schema: target.schema.clone().or_else(|| table.schema.clone()),
    };
    let mut sql = format!(
        "REFERENCES {} ({})",
        quote_table(dialect, &referenced),
        quote_columns(dialect, std::slice::from_ref(&target.column))
    );
    if let Some(action) = target.on_delete {
        sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
    }
    if let Some(action) = target.on_update {
        sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
    }
    sql
}

/// 複数カラムの外部キー句（FOREIGN KEY (...) REFERENCES ...）を生成
pub(crate) fn format_composite_foreign_key(
    dialect: Dialect,
    table: &TableIdentifier,
    fk: &ForeignKey,
) -> String {
    let referenced = TableIdentifier {
        table_name: fk.referenced_table.clone(),
        schema: fk.referenced_schema.clone().or_else(|| table.schema.clone()),
    };
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_columns(dialect, &fk.columns),
        quote_table(dialect, &referenced),
        quote_columns(dialect, &fk.referenced_columns)
    );
    if let Some(action) = fk.on_delete {
        sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
    }
    if let Some(action) = fk.on_update {
        sql.push_str(&format!(" ON UPDATE {}", action.as_sql()));
    }
    sql
}

/// 定義自体の整合性を検証（作成系の操作で使用）
pub(crate) fn validate_definition(
    table: &TableIdentifier,
    column: &str,
    definition: &ColumnDefinition,
) -> Result<(), MigrationEngineError> {
    if let Some(values) = definition.data_type.enum_values() {
        if values.is_empty() {
            return Err(MigrationEngineError::InvalidDefinition {
                message: format!(
                    "column '{}' on '{}': an ENUM type needs at least one label",
                    column, table
                ),
            });
        }
    }
    if definition.auto_increment && !definition.data_type.is_integer() {
        return Err(MigrationEngineError::InvalidDefinition {
            message: format!(
                "column '{}' on '{}': auto_increment requires an integer type",
                column, table
            ),
        });
    }
    if definition.primary_key && definition.allow_null {
        return Err(MigrationEngineError::InvalidDefinition {
            message: format!(
                "column '{}' on '{}': a primary key column cannot allow NULL",
                column, table
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DataType, ReferentialAction};

    #[test]
    fn test_render_default() {
        assert_eq!(
            render_default(Dialect::PostgreSQL, &DefaultValue::text("it's")),
            "'it''s'"
        );
        assert_eq!(render_default(Dialect::PostgreSQL, &DefaultValue::Bool(true)), "TRUE");
        assert_eq!(render_default(Dialect::SQLite, &DefaultValue::Bool(false)), "0");
        assert_eq!(render_default(Dialect::MySQL, &DefaultValue::Integer(-5)), "-5");
        assert_eq!(render_default(Dialect::MySQL, &DefaultValue::Float(1.5)), "1.5");
        assert_eq!(
            render_default(
                Dialect::PostgreSQL,
                &DefaultValue::expression("CURRENT_TIMESTAMP")
            ),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_format_references() {
        let table = TableIdentifier::with_schema("users", "app");
        let target = ForeignKeyTarget::new("level", "id").on_delete(ReferentialAction::Cascade);
        assert_eq!(
            format_references(Dialect::PostgreSQL, &table, &target),
            r#"REFERENCES "app"."level" ("id") ON DELETE CASCADE"#
        );
    }

    #[test]
    fn test_validate_definition() {
        let table = TableIdentifier::new("users");
        assert!(validate_definition(
            &table,
            "id",
            &ColumnDefinition::new(DataType::INTEGER).primary_key().auto_increment()
        )
        .is_ok());
        assert!(validate_definition(
            &table,
            "name",
            &ColumnDefinition::new(DataType::TEXT).auto_increment()
        )
        .is_err());
        assert!(validate_definition(
            &table,
            "kind",
            &ColumnDefinition::new(DataType::Enum { values: vec![] })
        )
        .is_err());
    }

    #[test]
    fn test_create_generator_capabilities() {
        let postgres = create_generator(Dialect::PostgreSQL).capabilities();
        assert!(postgres.transactional_ddl);
        assert!(postgres.native_alter_column);
        assert!(postgres.native_enum);

        let mysql = create_generator(Dialect::MySQL).capabilities();
        assert!(!mysql.transactional_ddl);
        assert!(mysql.native_alter_column);

        let sqlite = create_generator(Dialect::SQLite).capabilities();
        assert!(sqlite.transactional_ddl);
        assert!(!sqlite.native_alter_column);
        assert!(!sqlite.alter_foreign_key_in_place);
    }
}
