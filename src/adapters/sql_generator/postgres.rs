// PostgreSQL用SQLジェネレーター
//
// カラム定義と観測状態からPostgreSQL用のDDL文を生成します。

use crate::adapters::sql_generator::{
    format_composite_foreign_key, format_enum_values, format_references, render_default,
    validate_definition, ColumnAlteration, DialectCapabilities, SqlGenerator,
};
use crate::adapters::sql_quote::{
    quote_columns, quote_identifier_postgres, quote_literal, quote_qualified, quote_table,
};
use crate::adapters::type_mapping::{TypeMappingService, TypeRenderContext};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::naming;
use crate::core::schema::{ColumnDefinition, DataType, DefaultValue, TableIdentifier};
use crate::core::snapshot::{ObservedColumn, TableLayout};
use crate::core::type_category::TypeCategory;

const DIALECT: Dialect = Dialect::PostgreSQL;

/// PostgreSQL用SQLジェネレーター
#[derive(Debug, Clone)]
pub struct PostgresSqlGenerator {
    type_mapping: TypeMappingService,
}

impl Default for PostgresSqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresSqlGenerator {
    /// 新しいPostgresSqlGeneratorを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(DIALECT),
        }
    }

    /// カラムに対応する列挙型のスキーマ修飾済み名
    fn enum_type(&self, table: &TableIdentifier, column: &str) -> String {
        quote_qualified(
            DIALECT,
            table.schema.as_deref(),
            &naming::enum_type_name(&table.table_name, column),
        )
    }

    /// カラム型をPostgreSQLの型文字列にマッピング
    fn map_column_type(
        &self,
        table: &TableIdentifier,
        column: &str,
        definition: &ColumnDefinition,
        allow_serial: bool,
    ) -> String {
        let enum_type = self.enum_type(table, column);
        self.type_mapping.to_sql_type_with(
            &definition.data_type,
            &TypeRenderContext {
                auto_increment: allow_serial && definition.auto_increment,
                enum_type: Some(&enum_type),
            },
        )
    }

    /// 列挙型を作り直す文（DROP TYPE IF EXISTS + CREATE TYPE）
    fn create_enum_statements(&self, table: &TableIdentifier, column: &str, values: &[String]) -> Vec<String> {
        let enum_type = self.enum_type(table, column);
        vec![
            format!("DROP TYPE IF EXISTS {}", enum_type),
            format!(
                "CREATE TYPE {} AS ENUM ({})",
                enum_type,
                format_enum_values(DIALECT, values)
            ),
        ]
    }

    /// 列挙型が未作成の場合のみ作成する文
    ///
    /// CREATE TABLE IF NOT EXISTS と組み合わせるため、使用中の型は削除しない。
    fn create_enum_if_missing_statement(
        &self,
        table: &TableIdentifier,
        column: &str,
        values: &[String],
    ) -> String {
        format!(
            "DO $$ BEGIN CREATE TYPE {} AS ENUM ({}); EXCEPTION WHEN duplicate_object THEN NULL; END $$",
            self.enum_type(table, column),
            format_enum_values(DIALECT, values)
        )
    }

    /// カラム定義句を生成
    fn column_clause(
        &self,
        table: &TableIdentifier,
        column: &str,
        definition: &ColumnDefinition,
        inline_primary_key: bool,
    ) -> String {
        let mut parts = vec![
            quote_identifier_postgres(column),
            self.map_column_type(table, column, definition, true),
        ];

        if inline_primary_key && definition.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if !definition.allow_null {
            parts.push("NOT NULL".to_string());
        }
        if !definition.auto_increment {
            if let Some(default_value) = definition.effective_default() {
                parts.push(format!("DEFAULT {}", render_default(DIALECT, default_value)));
            }
        }
        if definition.unique {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE",
                quote_identifier_postgres(&naming::unique_constraint_name(&table.table_name, column))
            ));
        }
        if let Some(target) = &definition.references {
            parts.push(format!(
                "CONSTRAINT {} {}",
                quote_identifier_postgres(&naming::foreign_key_name(
                    &table.table_name,
                    column,
                    &target.table
                )),
                format_references(DIALECT, table, target)
            ));
        }

        parts.join(" ")
    }

    /// COMMENT ON COLUMN文を生成
    fn comment_statement(&self, table: &TableIdentifier, column: &str, comment: Option<&str>) -> String {
        format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            quote_table(DIALECT, table),
            quote_identifier_postgres(column),
            comment
                .map(|c| quote_literal(DIALECT, c))
                .unwrap_or_else(|| "NULL".to_string())
        )
    }

    /// 型変更文を生成
    ///
    /// カテゴリが変わる場合や列挙型が関わる場合、既存のデフォルト値は
    /// 型変換の妨げになるため一旦削除し、`restore_default` に復元値を返します。
    fn type_change_statements(
        &self,
        alteration: &ColumnAlteration<'_>,
        observed: &ObservedColumn,
        statements: &mut Vec<String>,
    ) -> Option<String> {
        let table = &alteration.snapshot.table;
        let quoted_table = quote_table(DIALECT, table);
        let quoted_column = quote_identifier_postgres(alteration.column);
        let target = alteration.target;

        let from = if observed.is_enum() {
            TypeCategory::Enum
        } else {
            TypeCategory::from_sql_type(&observed.type_sql)
        };
        let to = TypeCategory::from_data_type(&target.data_type);

        let involves_enum = from == TypeCategory::Enum || to == TypeCategory::Enum;
        let mut restore_default = None;
        if observed.default_sql.is_some()
            && !observed.auto_increment
            && (involves_enum || from.requires_cast_to(&to))
        {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                quoted_table, quoted_column
            ));
            if !alteration.changes_default() {
                restore_default = observed
                    .default_display
                    .as_ref()
                    .map(|v| render_default(DIALECT, &DefaultValue::text(v.clone())));
            }
        }

        let own_enum = naming::enum_type_name(&table.table_name, alteration.column);
        let has_own_enum = observed.enum_type_name.as_deref() == Some(own_enum.as_str());

        match &target.data_type {
            DataType::Enum { values } => {
                let enum_type = self.enum_type(table, alteration.column);
                if has_own_enum {
                    // 既存の型を退避してから同名で作り直す
                    let old_name = naming::old_enum_type_name(&own_enum);
                    let quoted_old = quote_qualified(DIALECT, table.schema.as_deref(), &old_name);
                    statements.push(format!("DROP TYPE IF EXISTS {}", quoted_old));
                    statements.push(format!(
                        "ALTER TYPE {} RENAME TO {}",
                        enum_type,
                        quote_identifier_postgres(&old_name)
                    ));
                    statements.push(format!(
                        "CREATE TYPE {} AS ENUM ({})",
                        enum_type,
                        format_enum_values(DIALECT, values)
                    ));
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::text::{}",
                        quoted_table, quoted_column, enum_type, quoted_column, enum_type
                    ));
                    statements.push(format!("DROP TYPE {}", quoted_old));
                } else {
                    statements.extend(self.create_enum_statements(table, alteration.column, values));
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::text::{}",
                        quoted_table, quoted_column, enum_type, quoted_column, enum_type
                    ));
                }
            }
            _ => {
                // シーケンス設定は別途行うため、SERIAL系ではなく基底の整数型を使用
                let type_sql = self.map_column_type(table, alteration.column, target, false);
                if from.requires_cast_to(&to) {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                        quoted_table, quoted_column, type_sql, quoted_column, type_sql
                    ));
                } else {
                    statements.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                        quoted_table, quoted_column, type_sql
                    ));
                }
                if has_own_enum {
                    statements.push(format!(
                        "DROP TYPE IF EXISTS {}",
                        self.enum_type(table, alteration.column)
                    ));
                }
            }
        }

        restore_default
    }

    /// INTEGER → SERIAL (auto_increment: false → true) のSQL生成
    ///
    /// ALTER COLUMN TYPE SERIAL は使用できないため、シーケンスの作成とDEFAULT設定で対応
    fn add_auto_increment_statements(&self, table: &TableIdentifier, column: &str) -> Vec<String> {
        let quoted_table = quote_table(DIALECT, table);
        let quoted_column = quote_identifier_postgres(column);
        let sequence = naming::sequence_name(&table.table_name, column);
        let quoted_sequence = quote_qualified(DIALECT, table.schema.as_deref(), &sequence);
        let regclass = quote_literal(DIALECT, &quoted_sequence);

        vec![
            format!("CREATE SEQUENCE IF NOT EXISTS {}", quoted_sequence),
            // 既存データがある場合に備えてシーケンスを最大値に初期化
            format!(
                "SELECT setval({}, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
                regclass, quoted_column, quoted_table
            ),
            format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT nextval({})",
                quoted_table, quoted_column, regclass
            ),
            format!(
                "ALTER SEQUENCE {} OWNED BY {}.{}",
                quoted_sequence, quoted_table, quoted_column
            ),
        ]
    }

    /// SERIAL → INTEGER (auto_increment: true → false) のSQL生成
    fn remove_auto_increment_statements(&self, table: &TableIdentifier, column: &str) -> Vec<String> {
        let sequence = naming::sequence_name(&table.table_name, column);
        vec![
            format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                quote_table(DIALECT, table),
                quote_identifier_postgres(column)
            ),
            format!(
                "DROP SEQUENCE IF EXISTS {} CASCADE",
                quote_qualified(DIALECT, table.schema.as_deref(), &sequence)
            ),
        ]
    }

    /// プライマリキーの追加・削除文を生成
    fn primary_key_statements(&self, alteration: &ColumnAlteration<'_>) -> Result<Vec<String>, MigrationEngineError> {
        let snapshot = alteration.snapshot;
        let quoted_table = quote_table(DIALECT, &snapshot.table);

        if alteration.target.primary_key {
            return Ok(vec![format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                quoted_table,
                quote_identifier_postgres(alteration.column)
            )]);
        }

        let name = snapshot.primary_key_name.as_ref().ok_or_else(|| {
            MigrationEngineError::conflict(
                snapshot.table.to_string(),
                alteration.column,
                "primary key constraint name could not be resolved",
            )
        })?;
        let mut statements = vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            quoted_table,
            quote_identifier_postgres(name)
        )];

        // 複合キーの場合は残りのカラムで作り直す
        let remaining: Vec<&String> = snapshot
            .primary_key_columns
            .iter()
            .filter(|c| *c != alteration.column)
            .collect();
        if !remaining.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                quoted_table,
                quote_columns(DIALECT, &remaining)
            ));
        }
        Ok(statements)
    }

    /// ユニーク制約の追加・削除文を生成
    fn unique_statements(&self, alteration: &ColumnAlteration<'_>) -> Vec<String> {
        let snapshot = alteration.snapshot;
        let table = &snapshot.table;
        let quoted_table = quote_table(DIALECT, table);

        if alteration.target.unique {
            return vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                quoted_table,
                quote_identifier_postgres(&naming::unique_constraint_name(
                    &table.table_name,
                    alteration.column
                )),
                quote_identifier_postgres(alteration.column)
            )];
        }

        match snapshot.single_column_unique(alteration.column) {
            Some(unique) if unique.is_constraint => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                quoted_table,
                quote_identifier_postgres(&unique.name)
            )],
            Some(unique) => vec![format!(
                "DROP INDEX {}",
                quote_qualified(DIALECT, table.schema.as_deref(), &unique.name)
            )],
            None => Vec::new(),
        }
    }
}

impl SqlGenerator for PostgresSqlGenerator {
    fn dialect(&self) -> Dialect {
        DIALECT
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            transactional_ddl: true,
            native_alter_column: true,
            native_enum: true,
            supports_schemas: true,
            supports_column_comments: true,
            alter_foreign_key_in_place: true,
        }
    }

    fn generate_create_table(&self, layout: &TableLayout) -> Result<Vec<String>, MigrationEngineError> {
        let table = &layout.table;
        let mut statements = Vec::new();

        for (name, definition) in &layout.columns {
            validate_definition(table, name, definition)?;
            if let DataType::Enum { values } = &definition.data_type {
                statements.push(self.create_enum_if_missing_statement(table, name, values));
            }
        }

        let mut lines: Vec<String> = layout
            .columns
            .iter()
            .map(|(name, definition)| self.column_clause(table, name, definition, false))
            .collect();

        let primary_key = layout.primary_key_columns();
        if !primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", quote_columns(DIALECT, &primary_key)));
        }
        for columns in &layout.composite_uniques {
            lines.push(format!("UNIQUE ({})", quote_columns(DIALECT, columns)));
        }
        for fk in &layout.composite_foreign_keys {
            lines.push(format_composite_foreign_key(DIALECT, table, fk));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            quote_table(DIALECT, table),
            lines.join(",\n  ")
        ));

        for (name, definition) in &layout.columns {
            if let Some(comment) = &definition.comment {
                statements.push(self.comment_statement(table, name, Some(comment)));
            }
        }
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

        let mut statements = Vec::new();
        if let DataType::Enum { values } = &definition.data_type {
            statements.extend(self.create_enum_statements(table, column, values));
        }
        statements.push(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_table(DIALECT, table),
            self.column_clause(table, column, definition, true)
        ));
        if let Some(comment) = &definition.comment {
            statements.push(self.comment_statement(table, column, Some(comment)));
        }
        Ok(statements)
    }

    fn generate_change_column(
        &self,
        alteration: &ColumnAlteration<'_>,
    ) -> Result<Vec<String>, MigrationEngineError> {
        alteration.check_primary_key_conflict()?;

        let snapshot = alteration.snapshot;
        let table = &snapshot.table;
        let observed = snapshot.column(alteration.column).ok_or_else(|| {
            MigrationEngineError::ColumnNotFound {
                table: table.to_string(),
                column: alteration.column.to_string(),
            }
        })?;
        let target = alteration.target;
        let quoted_table = quote_table(DIALECT, table);
        let quoted_column = quote_identifier_postgres(alteration.column);
        let mut statements = Vec::new();

        // 参照先を変える場合は先に既存の外部キーを外す
        if alteration.changes_references() {
            if let Some(fk) = snapshot.foreign_key_for(alteration.column) {
                statements.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT {}",
                    quoted_table,
                    quote_identifier_postgres(&fk.name)
                ));
            }
        }

        let restore_default = if alteration.changes_type() {
            self.type_change_statements(alteration, observed, &mut statements)
        } else {
            None
        };

        if alteration.changes_nullability() {
            let action = if target.allow_null {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                quoted_table, quoted_column, action
            ));
        }

        if alteration.changes_auto_increment() {
            if target.auto_increment {
                statements.extend(self.add_auto_increment_statements(table, alteration.column));
            } else {
                statements.extend(self.remove_auto_increment_statements(table, alteration.column));
            }
        } else if alteration.changes_default() {
            let action = match target.effective_default() {
                Some(value) => format!("SET DEFAULT {}", render_default(DIALECT, value)),
                None => "DROP DEFAULT".to_string(),
            };
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                quoted_table, quoted_column, action
            ));
        } else if let Some(default_sql) = restore_default {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                quoted_table, quoted_column, default_sql
            ));
        }

        if alteration.changes_primary_key() {
            statements.extend(self.primary_key_statements(alteration)?);
        }

        if alteration.changes_unique() {
            statements.extend(self.unique_statements(alteration));
        }

        if alteration.changes_comment() {
            statements.push(self.comment_statement(
                table,
                alteration.column,
                target.comment.as_deref(),
            ));
        }

        if let Some(reference) = &alteration.change.references {
            statements.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
                quoted_table,
                quote_identifier_postgres(&naming::foreign_key_name(
                    &table.table_name,
                    alteration.column,
                    &reference.table
                )),
                quoted_column,
                format_references(DIALECT, table, reference)
            ));
        }

        Ok(statements)
    }

    fn generate_create_schema(&self, schema: &str) -> Vec<String> {
        vec![format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier_postgres(schema)
        )]
    }
}
