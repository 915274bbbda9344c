// MySQL用SQLジェネレーター
//
// カラム定義と観測状態からMySQL用のDDL文を生成します。

use crate::adapters::sql_generator::{
    format_composite_foreign_key, format_references, render_default, validate_definition,
    ColumnAlteration, DialectCapabilities, SqlGenerator,
};
use crate::adapters::sql_quote::{quote_columns, quote_identifier_mysql, quote_literal, quote_table};
use crate::adapters::type_mapping::{TypeMappingService, TypeRenderContext};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::naming;
use crate::core::schema::{ColumnDefinition, DataType, TableIdentifier};
use crate::core::snapshot::TableLayout;
use crate::core::type_category::TypeCategory;

const DIALECT: Dialect = Dialect::MySQL;

/// MySQL用SQLジェネレーター
#[derive(Debug, Clone)]
pub struct MysqlSqlGenerator {
    type_mapping: TypeMappingService,
}

impl Default for MysqlSqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MysqlSqlGenerator {
    /// 新しいMysqlSqlGeneratorを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(DIALECT),
        }
    }

    /// カラム定義のSQL文字列を生成
    ///
    /// MODIFY COLUMN は完全なカラム定義が必要なため、NULL許可も明示します。
    /// `on_update` は観測済みの ON UPDATE 句の値で、DEFAULT の後に出力します。
    fn generate_column_definition(
        &self,
        column: &str,
        definition: &ColumnDefinition,
        inline_primary_key: bool,
        on_update: Option<&str>,
    ) -> String {
        let mut parts = vec![
            quote_identifier_mysql(column),
            self.type_mapping.to_sql_type_with(
                &definition.data_type,
                &TypeRenderContext {
                    auto_increment: definition.auto_increment,
                    enum_type: None,
                },
            ),
        ];

        parts.push(if definition.allow_null { "NULL" } else { "NOT NULL" }.to_string());

        if let Some(default_value) = definition.effective_default() {
            parts.push(format!("DEFAULT {}", render_default(DIALECT, default_value)));
        }
        if let Some(on_update) = on_update {
            parts.push(format!("ON UPDATE {}", on_update));
        }
        if definition.auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        }
        if inline_primary_key && definition.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if let Some(comment) = &definition.comment {
            parts.push(format!("COMMENT {}", quote_literal(DIALECT, comment)));
        }

        parts.join(" ")
    }

    /// 単一カラムのユニーク制約句
    fn unique_clause(&self, table: &TableIdentifier, column: &str) -> String {
        format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_identifier_mysql(&naming::unique_constraint_name(&table.table_name, column)),
            quote_identifier_mysql(column)
        )
    }

    /// 単一カラムの外部キー句
    fn foreign_key_clause(
        &self,
        table: &TableIdentifier,
        column: &str,
        definition: &ColumnDefinition,
    ) -> Option<String> {
        definition.references.as_ref().map(|target| {
            format!(
                "CONSTRAINT {} FOREIGN KEY ({}) {}",
                quote_identifier_mysql(&naming::foreign_key_name(
                    &table.table_name,
                    column,
                    &target.table
                )),
                quote_identifier_mysql(column),
                format_references(DIALECT, table, target)
            )
        })
    }

    /// MODIFY COLUMN が必要かどうか
    fn needs_modify(&self, alteration: &ColumnAlteration<'_>) -> bool {
        alteration.changes_type()
            || alteration.changes_nullability()
            || alteration.changes_default()
            || alteration.changes_auto_increment()
            || alteration.changes_comment()
    }
}

/// MODIFY COLUMN で引き継ぐ ON UPDATE 句
///
/// 日時型以外への型変更では ON UPDATE を付けられないため引き継がない。
fn kept_on_update<'a>(alteration: &ColumnAlteration<'a>) -> Option<&'a str> {
    let on_update = alteration
        .snapshot
        .column(alteration.column)?
        .on_update
        .as_deref()?;
    let keeps_type = !alteration.changes_type()
        || TypeCategory::from_data_type(&alteration.target.data_type) == TypeCategory::DateTime;
    keeps_type.then_some(on_update)
}

impl SqlGenerator for MysqlSqlGenerator {
    fn dialect(&self) -> Dialect {
        DIALECT
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            transactional_ddl: false,
            native_alter_column: true,
            native_enum: false,
            supports_schemas: true,
            supports_column_comments: true,
            alter_foreign_key_in_place: true,
        }
    }

    fn generate_create_table(&self, layout: &TableLayout) -> Result<Vec<String>, MigrationEngineError> {
        let table = &layout.table;
        let mut elements = Vec::new();

        for (name, definition) in &layout.columns {
            validate_definition(table, name, definition)?;
            elements.push(format!(
                "    {}",
                self.generate_column_definition(name, definition, false, None)
            ));
        }

        let primary_key = layout.primary_key_columns();
        if !primary_key.is_empty() {
            elements.push(format!("    PRIMARY KEY ({})", quote_columns(DIALECT, &primary_key)));
        }

        // テーブル制約（MySQLはカラム定義内のREFERENCESを無視するため、外部キーもテーブルレベル）
        for (name, definition) in &layout.columns {
            if definition.unique {
                elements.push(format!("    {}", self.unique_clause(table, name)));
            }
        }
        for columns in &layout.composite_uniques {
            elements.push(format!("    UNIQUE ({})", quote_columns(DIALECT, columns)));
        }
        for (name, definition) in &layout.columns {
            if let Some(clause) = self.foreign_key_clause(table, name, definition) {
                elements.push(format!("    {}", clause));
            }
        }
        for fk in &layout.composite_foreign_keys {
            elements.push(format!("    {}", format_composite_foreign_key(DIALECT, table, fk)));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {}\n(\n{}\n) ENGINE=InnoDB",
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

        let quoted_table = quote_table(DIALECT, table);
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quoted_table,
            self.generate_column_definition(column, definition, true, None)
        )];
        if definition.unique {
            statements.push(format!(
                "ALTER TABLE {} ADD {}",
                quoted_table,
                self.unique_clause(table, column)
            ));
        }
        if let Some(clause) = self.foreign_key_clause(table, column, definition) {
            statements.push(format!("ALTER TABLE {} ADD {}", quoted_table, clause));
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
        let column = alteration.column;
        let target = alteration.target;
        let quoted_table = quote_table(DIALECT, table);

        if alteration.changes_type()
            && matches!(target.data_type, DataType::Enum { .. })
            && snapshot.has_foreign_key_on(column)
        {
            return Err(MigrationEngineError::conflict(
                table.to_string(),
                column,
                "cannot change a foreign key column to ENUM",
            ));
        }

        let mut statements = Vec::new();

        if alteration.changes_references() {
            if let Some(fk) = snapshot.foreign_key_for(column) {
                statements.push(format!(
                    "ALTER TABLE {} DROP FOREIGN KEY {}",
                    quoted_table,
                    quote_identifier_mysql(&fk.name)
                ));
            }
        }

        // AUTO_INCREMENT はキーが必要なため、主キーの追加は MODIFY より先に行う
        let adds_primary_key = alteration.changes_primary_key() && target.primary_key;
        if adds_primary_key {
            statements.push(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                quoted_table,
                quote_identifier_mysql(column)
            ));
        }

        if self.needs_modify(alteration) {
            statements.push(format!(
                "ALTER TABLE {} MODIFY COLUMN {}",
                quoted_table,
                self.generate_column_definition(column, target, false, kept_on_update(alteration))
            ));
        }

        if alteration.changes_primary_key() && !target.primary_key {
            statements.push(format!("ALTER TABLE {} DROP PRIMARY KEY", quoted_table));
            let remaining: Vec<&String> = snapshot
                .primary_key_columns
                .iter()
                .filter(|c| *c != column)
                .collect();
            if !remaining.is_empty() {
                statements.push(format!(
                    "ALTER TABLE {} ADD PRIMARY KEY ({})",
                    quoted_table,
                    quote_columns(DIALECT, &remaining)
                ));
            }
        }

        if alteration.changes_unique() {
            if target.unique {
                statements.push(format!(
                    "ALTER TABLE {} ADD {}",
                    quoted_table,
                    self.unique_clause(table, column)
                ));
            } else if let Some(unique) = snapshot.single_column_unique(column) {
                statements.push(format!(
                    "ALTER TABLE {} DROP INDEX {}",
                    quoted_table,
                    quote_identifier_mysql(&unique.name)
                ));
            }
        }

        if alteration.changes_references() {
            if let Some(clause) = self.foreign_key_clause(table, column, target) {
                statements.push(format!("ALTER TABLE {} ADD {}", quoted_table, clause));
            }
        }

        Ok(statements)
    }

    fn generate_create_schema(&self, schema: &str) -> Vec<String> {
        vec![format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            quote_identifier_mysql(schema)
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnChange, ForeignKeyTarget, ReferentialAction};
    use crate::core::snapshot::{ForeignKey, ObservedColumn, TableSnapshot, UniqueConstraint};

    fn users_snapshot() -> TableSnapshot {
        let mut snapshot = TableSnapshot::new(TableIdentifier::new("users"));

        let mut id = ObservedColumn::new("id", "int");
        id.allow_null = false;
        id.primary_key = true;
        id.auto_increment = true;

        let currency = ObservedColumn::new("currency", "int");

        let mut status = ObservedColumn::new("status", "varchar(255)");
        status.allow_null = false;
        status.comment = Some("state".to_string());

        let mut kind = ObservedColumn::new("kind", "enum('value1','value2')");
        kind.enum_values = vec!["value1".to_string(), "value2".to_string()];
        kind.default_sql = Some("'value1'".to_string());
        kind.default_display = Some("value1".to_string());

        let email = ObservedColumn::new("email", "varchar(255)");
        let level_id = ObservedColumn::new("level_id", "int");

        snapshot.columns = vec![id, currency, status, kind, email, level_id];
        snapshot.primary_key_name = Some("PRIMARY".to_string());
        snapshot.primary_key_columns = vec!["id".to_string()];
        snapshot.unique_constraints.push(UniqueConstraint {
            name: "email".to_string(),
            columns: vec!["email".to_string()],
            is_constraint: true,
            sql: None,
        });
        snapshot.foreign_keys.push(ForeignKey {
            name: "users_ibfk_1".to_string(),
            columns: vec!["level_id".to_string()],
            referenced_schema: None,
            referenced_table: "level".to_string(),
            referenced_columns: vec!["id".to_string()],
            on_update: None,
            on_delete: None,
        });
        snapshot
    }

    fn change(snapshot: &TableSnapshot, column: &str, change: ColumnChange) -> Result<Vec<String>, MigrationEngineError> {
        let current = snapshot.to_definition(column).unwrap();
        let target = change.apply_to(&current);
        MysqlSqlGenerator::new().generate_change_column(&ColumnAlteration {
            snapshot,
            column,
            current: &current,
            target: &target,
            change: &change,
        })
    }

    // ==========================================
    // change_column のテスト
    // ==========================================

    #[test]
    fn test_change_type_redeclares_from_observed_state() {
        let snapshot = users_snapshot();
        let statements = change(&snapshot, "currency", DataType::FLOAT.into()).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` MODIFY COLUMN `currency` FLOAT NULL"]
        );
    }

    #[test]
    fn test_set_default_keeps_comment_and_nullability() {
        let snapshot = users_snapshot();
        let statements =
            change(&snapshot, "status", ColumnChange::new().default_value("active")).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` MODIFY COLUMN `status` varchar(255) NOT NULL DEFAULT 'active' COMMENT 'state'"]
        );
    }

    fn events_snapshot() -> TableSnapshot {
        let mut snapshot = TableSnapshot::new(TableIdentifier::new("events"));
        let mut updated_at = ObservedColumn::new("updated_at", "timestamp");
        updated_at.allow_null = false;
        updated_at.default_sql = Some("CURRENT_TIMESTAMP".to_string());
        updated_at.default_display = Some("CURRENT_TIMESTAMP".to_string());
        updated_at.on_update = Some("CURRENT_TIMESTAMP".to_string());
        snapshot.columns = vec![updated_at];
        snapshot
    }

    #[test]
    fn test_comment_change_keeps_on_update() {
        let snapshot = events_snapshot();
        let statements =
            change(&snapshot, "updated_at", ColumnChange::new().comment("touched")).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `events` MODIFY COLUMN `updated_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP COMMENT 'touched'"]
        );
    }

    #[test]
    fn test_on_update_follows_temporal_type_only() {
        let snapshot = events_snapshot();

        let statements = change(&snapshot, "updated_at", DataType::DATETIME.into()).unwrap();
        assert!(statements[0].contains("DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"));

        let statements = change(&snapshot, "updated_at", DataType::TEXT.into()).unwrap();
        assert!(!statements[0].contains("ON UPDATE"));
    }

    #[test]
    fn test_replace_enum_labels() {
        let snapshot = users_snapshot();
        let statements = change(
            &snapshot,
            "kind",
            DataType::enumeration(["value1", "value3"]).into(),
        )
        .unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` MODIFY COLUMN `kind` ENUM('value1', 'value3') NULL DEFAULT 'value1'"]
        );
    }

    #[test]
    fn test_enum_on_foreign_key_column_conflicts() {
        let snapshot = users_snapshot();
        let err = change(&snapshot, "level_id", DataType::enumeration(["a"]).into()).unwrap_err();
        assert!(err.is_constraint_conflict());
    }

    #[test]
    fn test_nullability_change_keeps_foreign_key() {
        let snapshot = users_snapshot();
        let statements =
            change(&snapshot, "level_id", ColumnChange::new().allow_null(false)).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` MODIFY COLUMN `level_id` int NOT NULL"]
        );
    }

    #[test]
    fn test_replace_foreign_key() {
        let snapshot = users_snapshot();
        let statements = change(
            &snapshot,
            "level_id",
            ColumnChange::new().references(
                ForeignKeyTarget::new("level", "id").on_delete(ReferentialAction::Cascade),
            ),
        )
        .unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `users` DROP FOREIGN KEY `users_ibfk_1`",
                "ALTER TABLE `users` ADD CONSTRAINT `fk_users_level_id_level` FOREIGN KEY (`level_id`) REFERENCES `level` (`id`) ON DELETE CASCADE",
            ]
        );
    }

    #[test]
    fn test_unique_toggle() {
        let snapshot = users_snapshot();
        let statements = change(&snapshot, "email", ColumnChange::new().unique(false)).unwrap();
        assert_eq!(statements, vec!["ALTER TABLE `users` DROP INDEX `email`"]);

        let statements = change(&snapshot, "currency", ColumnChange::new().unique(true)).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE `users` ADD CONSTRAINT `uq_users_currency` UNIQUE (`currency`)"]
        );
    }

    #[test]
    fn test_drop_primary_key() {
        let snapshot = users_snapshot();
        let statements = change(
            &snapshot,
            "id",
            ColumnChange::new().primary_key(false).auto_increment(false),
        )
        .unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `users` MODIFY COLUMN `id` int NOT NULL",
                "ALTER TABLE `users` DROP PRIMARY KEY",
            ]
        );
    }

    // ==========================================
    // create_table / add_column のテスト
    // ==========================================

    #[test]
    fn test_create_table_declares_constraints_at_table_level() {
        let layout = TableLayout::from_definitions(
            TableIdentifier::new("users"),
            vec![
                (
                    "id".to_string(),
                    ColumnDefinition::new(DataType::INTEGER).primary_key().auto_increment(),
                ),
                (
                    "email".to_string(),
                    ColumnDefinition::new(DataType::string()).unique().comment("mail"),
                ),
                (
                    "level_id".to_string(),
                    ColumnDefinition::new(DataType::INTEGER)
                        .references(ForeignKeyTarget::new("level", "id")),
                ),
            ],
        );
        let statements = MysqlSqlGenerator::new().generate_create_table(&layout).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS `users`\n(\n    `id` INT NOT NULL AUTO_INCREMENT,\n    `email` VARCHAR(255) NULL COMMENT 'mail',\n    `level_id` INT NULL,\n    PRIMARY KEY (`id`),\n    CONSTRAINT `uq_users_email` UNIQUE (`email`),\n    CONSTRAINT `fk_users_level_id_level` FOREIGN KEY (`level_id`) REFERENCES `level` (`id`)\n) ENGINE=InnoDB"
        );
    }

    #[test]
    fn test_add_column_with_unique() {
        let statements = MysqlSqlGenerator::new()
            .generate_add_column(
                &TableIdentifier::new("users"),
                "nickname",
                &ColumnDefinition::new(DataType::string()).unique(),
            )
            .unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE `users` ADD COLUMN `nickname` VARCHAR(255) NULL",
                "ALTER TABLE `users` ADD CONSTRAINT `uq_users_nickname` UNIQUE (`nickname`)",
            ]
        );
    }

    #[test]
    fn test_create_schema() {
        assert_eq!(
            MysqlSqlGenerator::new().generate_create_schema("archive"),
            vec!["CREATE DATABASE IF NOT EXISTS `archive`"]
        );
    }
}
