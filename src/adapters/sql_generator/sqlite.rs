// SQLite用SQLジェネレーター
//
// カラム定義からSQLite用のDDL文を生成します。
// SQLiteはALTER COLUMNを持たないため、カラム変更はテーブル再構築で行います。
// コメントと列挙ラベルはカラム定義の行に埋め込み、sqlite_masterから復元します。

use crate::adapters::sql_generator::{
    format_composite_foreign_key, format_enum_values, format_references, render_default,
    validate_definition, ColumnAlteration, DialectCapabilities, SqlGenerator,
};
use crate::adapters::sql_quote::{quote_columns, quote_identifier_sqlite, quote_table};
use crate::adapters::type_mapping::{TypeMappingService, TypeRenderContext};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::schema::{ColumnDefinition, DataType, DefaultValue, TableIdentifier};
use crate::core::snapshot::TableLayout;

const DIALECT: Dialect = Dialect::SQLite;

/// SQLite用SQLジェネレーター
#[derive(Debug, Clone)]
pub struct SqliteSqlGenerator {
    type_mapping: TypeMappingService,
}

impl Default for SqliteSqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteSqlGenerator {
    /// 新しいSqliteSqlGeneratorを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(DIALECT),
        }
    }

    /// カラム定義のSQL文字列を生成
    ///
    /// 1カラム1行で出力される前提で、末尾にコメントを付けます。
    pub(crate) fn generate_column_definition(&self, column: &str, definition: &ColumnDefinition) -> String {
        let quoted_name = quote_identifier_sqlite(column);
        let mut parts = vec![
            quoted_name.clone(),
            self.type_mapping.to_sql_type_with(
                &definition.data_type,
                &TypeRenderContext {
                    auto_increment: definition.auto_increment,
                    enum_type: None,
                },
            ),
        ];

        if definition.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if definition.auto_increment {
                parts.push("AUTOINCREMENT".to_string());
            }
        }
        if !definition.allow_null {
            parts.push("NOT NULL".to_string());
        }
        if !definition.auto_increment {
            if let Some(default_value) = definition.effective_default() {
                parts.push(format!("DEFAULT {}", render_sqlite_default(default_value)));
            }
        }
        if definition.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(target) = &definition.references {
            // SQLiteの外部キーは同じデータベース内のテーブルのみ参照できる
            let local = TableIdentifier::new(String::new());
            parts.push(format_references(DIALECT, &local, target));
        }
        if let DataType::Enum { values } = &definition.data_type {
            parts.push(format!(
                "CHECK ({} IN ({}))",
                quoted_name,
                format_enum_values(DIALECT, values)
            ));
        }
        if let Some(comment) = &definition.comment {
            parts.push(format!("/* {} */", escape_comment(comment)));
        }

        parts.join(" ")
    }
}

/// ADD COLUMN で表現できない定義かどうか
///
/// UNIQUE・PRIMARY KEY はSQLiteの ADD COLUMN で指定できず、
/// コメント・列挙ラベル・外部キーは1カラム1行の形式を保つため再構築で追加します。
pub(crate) fn add_column_requires_rebuild(definition: &ColumnDefinition) -> bool {
    definition.unique
        || definition.primary_key
        || definition.comment.is_some()
        || definition.references.is_some()
        || matches!(definition.data_type, DataType::Enum { .. })
}

/// SQLite用のデフォルト値表現
///
/// 関数呼び出しなどの式は括弧で囲む必要があります。
fn render_sqlite_default(value: &DefaultValue) -> String {
    match value {
        DefaultValue::Expression { expression } => {
            let trimmed = expression.trim();
            let is_literal = trimmed.starts_with('\'')
                || trimmed.starts_with('(')
                || trimmed.parse::<f64>().is_ok()
                || matches!(
                    trimmed.to_uppercase().as_str(),
                    "NULL" | "TRUE" | "FALSE" | "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME"
                );
            if is_literal {
                trimmed.to_string()
            } else {
                format!("({})", trimmed)
            }
        }
        other => render_default(DIALECT, other),
    }
}

/// コメントを `/* */` 内に埋め込める形にエスケープ
pub(crate) fn escape_comment(comment: &str) -> String {
    comment
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("*/", "*\\/")
}

/// escape_comment の逆変換
pub(crate) fn unescape_comment(escaped: &str) -> String {
    let mut result = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

impl SqlGenerator for SqliteSqlGenerator {
    fn dialect(&self) -> Dialect {
        DIALECT
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            transactional_ddl: true,
            native_alter_column: false,
            native_enum: false,
            supports_schemas: false,
            supports_column_comments: false,
            alter_foreign_key_in_place: false,
        }
    }

    fn generate_create_table(&self, layout: &TableLayout) -> Result<Vec<String>, MigrationEngineError> {
        let table = &layout.table;
        let mut elements = Vec::new();

        for (name, definition) in &layout.columns {
            validate_definition(table, name, definition)?;
            elements.push(format!(
                "    {}",
                self.generate_column_definition(name, definition)
            ));
        }

        if !layout.composite_primary_key.is_empty() {
            elements.push(format!(
                "    PRIMARY KEY ({})",
                quote_columns(DIALECT, &layout.composite_primary_key)
            ));
        }
        for columns in &layout.composite_uniques {
            elements.push(format!("    UNIQUE ({})", quote_columns(DIALECT, columns)));
        }
        for fk in &layout.composite_foreign_keys {
            let local = TableIdentifier::new(String::new());
            elements.push(format!("    {}", format_composite_foreign_key(DIALECT, &local, fk)));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {}\n(\n{}\n)",
            quote_table(DIALECT, table),
            elements.join(",\n")
        )];
        statements.extend(layout.index_statements.iter().cloned());
        Ok(statements)
    }

    fn generate_add_column(
        &self,
        table: &TableIdentifier,
        column: &str,
        definition: &ColumnDefinition,
    ) -> Result<Vec<String>, MigrationEngineError> {
        validate_definition(table, column, definition)?;
        if add_column_requires_rebuild(definition) {
            return Err(MigrationEngineError::unsupported(
                DIALECT,
                format!(
                    "ADD COLUMN cannot declare '{}' with its constraints; the table must be rebuilt",
                    column
                ),
            ));
        }

        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_table(DIALECT, table),
            self.generate_column_definition(column, definition)
        )])
    }

    fn generate_change_column(
        &self,
        alteration: &ColumnAlteration<'_>,
    ) -> Result<Vec<String>, MigrationEngineError> {
        Err(MigrationEngineError::unsupported(
            DIALECT,
            format!(
                "ALTER COLUMN is not available for '{}'; the table must be rebuilt",
                alteration.column
            ),
        ))
    }

    fn add_column_requires_rebuild(&self, definition: &ColumnDefinition) -> bool {
        add_column_requires_rebuild(definition)
    }
}
