// SQLiteテーブル再作成サービス
//
// SQLiteはALTER COLUMNをサポートしていないため、
// テーブル再作成パターンでカラム変更・制約付きのカラム追加を実現します。

use crate::adapters::sql_generator::sqlite::SqliteSqlGenerator;
use crate::adapters::sql_generator::{render_default, SqlGenerator};
use crate::adapters::sql_quote::{quote_identifier_sqlite, quote_literal, quote_table};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::naming;
use crate::core::schema::{ColumnDefinition, TableIdentifier};
use crate::core::snapshot::{TableLayout, TableSnapshot};
use crate::core::type_category::TypeCategory;

/// テーブル再作成の手順
///
/// 実行は `services::table_rebuild` が1つの接続上で行います。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    /// 再作成するテーブル
    pub table: TableIdentifier,

    /// 一時テーブル
    pub shadow_table: TableIdentifier,

    /// 一時テーブルのCREATE TABLE文
    pub create_shadow: Vec<String>,

    /// データコピー文（列交差ベース）
    pub copy_rows: String,

    /// 旧テーブル削除文
    pub drop_original: String,

    /// 一時テーブルのリネーム文
    pub rename_shadow: String,

    /// インデックス再作成文
    pub recreate_indexes: Vec<String>,

    /// 外部キー整合性チェック文
    pub foreign_key_check: String,
}

impl RebuildPlan {
    /// トランザクション内で実行する文を順に列挙
    pub fn statements(&self) -> Vec<&str> {
        let mut statements: Vec<&str> = self.create_shadow.iter().map(String::as_str).collect();
        statements.push(&self.copy_rows);
        statements.push(&self.drop_original);
        statements.push(&self.rename_shadow);
        statements.extend(self.recreate_indexes.iter().map(String::as_str));
        statements
    }
}

/// SQLiteテーブル再作成サービス
///
/// 観測状態と目標レイアウトから再作成手順を組み立てます。
#[derive(Debug, Clone, Default)]
pub struct SqliteTableRecreator {
    generator: SqliteSqlGenerator,
}

impl SqliteTableRecreator {
    /// 新しいSqliteTableRecreatorを作成
    pub fn new() -> Self {
        Self {
            generator: SqliteSqlGenerator::new(),
        }
    }

    /// テーブル再作成手順を生成
    ///
    /// # Arguments
    /// * `snapshot` - 再作成前の観測状態
    /// * `layout` - 再作成後の完全なテーブル定義
    pub fn plan(
        &self,
        snapshot: &TableSnapshot,
        layout: &TableLayout,
    ) -> Result<RebuildPlan, MigrationEngineError> {
        let table = layout.table.clone();
        let shadow_table = TableIdentifier {
            table_name: naming::shadow_table_name(&table.table_name),
            schema: table.schema.clone(),
        };

        // インデックスはリネーム後に元のテーブル名で作り直す
        let mut shadow_layout = layout.clone();
        shadow_layout.table = shadow_table.clone();
        shadow_layout.index_statements.clear();
        let create_shadow = self.generator.generate_create_table(&shadow_layout)?;

        let quoted_table = quote_table(Dialect::SQLite, &table);
        let quoted_shadow = quote_table(Dialect::SQLite, &shadow_table);

        Ok(RebuildPlan {
            copy_rows: self.generate_data_copy_sql(snapshot, layout, &quoted_shadow, &quoted_table),
            drop_original: format!("DROP TABLE {}", quoted_table),
            rename_shadow: format!("ALTER TABLE {} RENAME TO {}", quoted_shadow, quoted_table),
            recreate_indexes: layout.index_statements.clone(),
            foreign_key_check: format!("PRAGMA foreign_key_check({})", quoted_table),
            create_shadow,
            table,
            shadow_table,
        })
    }

    /// データコピーSQLを生成（列交差ベース）
    ///
    /// 旧テーブルに存在するカラムはそのままコピーし、
    /// 追加されたカラムにはDEFAULT値・NULL・フォールバック値のいずれかを設定します。
    fn generate_data_copy_sql(
        &self,
        snapshot: &TableSnapshot,
        layout: &TableLayout,
        quoted_shadow: &str,
        quoted_table: &str,
    ) -> String {
        let mut insert_columns = Vec::new();
        let mut select_expressions = Vec::new();

        for (name, definition) in &layout.columns {
            let quoted_column = quote_identifier_sqlite(name);
            insert_columns.push(quoted_column.clone());

            let expression = match snapshot.column(name) {
                Some(observed) => {
                    // NULLを許可しなくなるカラムは、既存のNULLをデフォルト値で埋める
                    match definition.effective_default() {
                        Some(default_value) if observed.allow_null && !definition.allow_null => {
                            format!(
                                "COALESCE({}, {})",
                                quoted_column,
                                render_default(Dialect::SQLite, default_value)
                            )
                        }
                        _ => quoted_column,
                    }
                }
                None => match definition.effective_default() {
                    Some(default_value) => render_default(Dialect::SQLite, default_value),
                    None if definition.allow_null || definition.auto_increment => "NULL".to_string(),
                    None => fallback_value(definition),
                },
            };
            select_expressions.push(expression);
        }

        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quoted_shadow,
            insert_columns.join(", "),
            select_expressions.join(", "),
            quoted_table
        )
    }
}

/// NOT NULLカラムのフォールバック値を取得
fn fallback_value(definition: &ColumnDefinition) -> String {
    // CHECK制約を満たす必要があるため、列挙型は最初のラベルを使う
    if let Some(first) = definition.data_type.enum_values().and_then(|v| v.first()) {
        return quote_literal(Dialect::SQLite, first);
    }
    match TypeCategory::from_data_type(&definition.data_type) {
        TypeCategory::Numeric | TypeCategory::Boolean => "0",
        TypeCategory::Binary => "X''",
        TypeCategory::Json => "'{}'",
        _ => "''",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{DataType, DefaultValue};
    use crate::core::snapshot::{IndexInfo, ObservedColumn};

    fn users_snapshot() -> TableSnapshot {
        let mut snapshot = TableSnapshot::new(TableIdentifier::new("users"));

        let mut id = ObservedColumn::new("id", "INTEGER");
        id.allow_null = false;
        id.primary_key = true;
        let name = ObservedColumn::new("name", "VARCHAR(255)");

        snapshot.columns = vec![id, name];
        snapshot.primary_key_columns = vec!["id".to_string()];
        snapshot.indexes.push(IndexInfo {
            name: "idx_users_name".to_string(),
            columns: vec!["name".to_string()],
            sql: Some(r#"CREATE INDEX "idx_users_name" ON "users" ("name")"#.to_string()),
        });
        snapshot
    }

    #[test]
    fn test_plan_basic_steps() {
        let snapshot = users_snapshot();
        let layout = snapshot.to_layout_with(&[(
            "name".to_string(),
            ColumnDefinition::new(DataType::TEXT).not_null(),
        )]);

        let plan = SqliteTableRecreator::new().plan(&snapshot, &layout).unwrap();

        assert!(plan.create_shadow[0].starts_with(r#"CREATE TABLE "_strata_new_users""#));
        assert_eq!(
            plan.copy_rows,
            r#"INSERT INTO "_strata_new_users" ("id", "name") SELECT "id", "name" FROM "users""#
        );
        assert_eq!(plan.drop_original, r#"DROP TABLE "users""#);
        assert_eq!(
            plan.rename_shadow,
            r#"ALTER TABLE "_strata_new_users" RENAME TO "users""#
        );
        assert_eq!(
            plan.recreate_indexes,
            vec![r#"CREATE INDEX "idx_users_name" ON "users" ("name")"#]
        );
        assert_eq!(plan.foreign_key_check, r#"PRAGMA foreign_key_check("users")"#);

        // インデックスは一時テーブルには作らない
        assert_eq!(plan.create_shadow.len(), 1);
        assert_eq!(plan.statements().len(), 5);
    }

    #[test]
    fn test_not_null_with_default_fills_existing_nulls() {
        let snapshot = users_snapshot();
        let layout = snapshot.to_layout_with(&[(
            "name".to_string(),
            ColumnDefinition::new(DataType::TEXT)
                .not_null()
                .default_value("anonymous"),
        )]);

        let plan = SqliteTableRecreator::new().plan(&snapshot, &layout).unwrap();
        assert!(plan
            .copy_rows
            .contains(r#"COALESCE("name", 'anonymous')"#));
    }

    #[test]
    fn test_added_columns_use_default_or_fallback() {
        let snapshot = users_snapshot();
        let layout = snapshot.to_layout_with(&[
            (
                "score".to_string(),
                ColumnDefinition::new(DataType::INTEGER).not_null(),
            ),
            (
                "nickname".to_string(),
                ColumnDefinition::new(DataType::TEXT).unique(),
            ),
            (
                "active".to_string(),
                ColumnDefinition::new(DataType::BOOLEAN).default_value(DefaultValue::Bool(true)),
            ),
        ]);

        let plan = SqliteTableRecreator::new().plan(&snapshot, &layout).unwrap();
        assert_eq!(
            plan.copy_rows,
            r#"INSERT INTO "_strata_new_users" ("id", "name", "score", "nickname", "active") SELECT "id", "name", 0, NULL, 1 FROM "users""#
        );
    }
}
