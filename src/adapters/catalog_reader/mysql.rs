// MySQL用カタログリーダー
//
// information_schema からテーブルの観測状態を読み取ります。
// Anyドライバーでデコードできるよう、文字列は CHAR、数値は SIGNED にキャストしています。

use super::{column_value, fetch_rows, group_columns, CatalogReader};
use crate::adapters::sql_quote::quote_literal;
use crate::adapters::type_mapping::common::parse_enum_labels;
use crate::adapters::type_mapping::{TypeMappingService, TypeMetadata};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::schema::{ReferentialAction, TableIdentifier};
use crate::core::snapshot::{ForeignKey, IndexInfo, ObservedColumn, TableSnapshot, UniqueConstraint};
use async_trait::async_trait;
use sqlx::AnyPool;
use tracing::debug;

const COLUMNS_SQL: &str = r#"
    SELECT
        CAST(COLUMN_NAME AS CHAR),
        CAST(COLUMN_TYPE AS CHAR),
        CAST(IS_NULLABLE AS CHAR),
        CAST(COLUMN_DEFAULT AS CHAR),
        CAST(COLUMN_KEY AS CHAR),
        CAST(EXTRA AS CHAR),
        CAST(COLUMN_COMMENT AS CHAR)
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

const INDEXES_SQL: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR),
        CAST(COLUMN_NAME AS CHAR),
        CAST(NON_UNIQUE AS SIGNED)
    FROM information_schema.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        CAST(k.CONSTRAINT_NAME AS CHAR),
        CAST(k.COLUMN_NAME AS CHAR),
        CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR),
        CAST(k.REFERENCED_TABLE_NAME AS CHAR),
        CAST(k.REFERENCED_COLUMN_NAME AS CHAR),
        CAST(r.UPDATE_RULE AS CHAR),
        CAST(r.DELETE_RULE AS CHAR)
    FROM information_schema.KEY_COLUMN_USAGE k
    JOIN information_schema.REFERENTIAL_CONSTRAINTS r
      ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
     AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
     AND r.TABLE_NAME = k.TABLE_NAME
    WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION
"#;

/// MySQLの主キーインデックス名
const PRIMARY_INDEX: &str = "PRIMARY";

/// MySQL用カタログリーダー
#[derive(Debug, Clone)]
pub struct MySqlCatalogReader {
    type_mapping: TypeMappingService,
}

impl Default for MySqlCatalogReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlCatalogReader {
    /// 新しいMySqlCatalogReaderを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(Dialect::MySQL),
        }
    }

    async fn read_columns(
        &self,
        pool: &AnyPool,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ObservedColumn>, MigrationEngineError> {
        let rows = fetch_rows(pool, COLUMNS_SQL, &[schema, table]).await?;
        let mut columns = Vec::with_capacity(rows.len());

        for row in &rows {
            let name: String = column_value(row, 0, COLUMNS_SQL)?;
            let column_type: String = column_value(row, 1, COLUMNS_SQL)?;
            let is_nullable: String = column_value(row, 2, COLUMNS_SQL)?;
            let raw_default: Option<String> = column_value(row, 3, COLUMNS_SQL)?;
            let column_key: String = column_value(row, 4, COLUMNS_SQL)?;
            let extra: String = column_value(row, 5, COLUMNS_SQL)?;
            let comment: String = column_value(row, 6, COLUMNS_SQL)?;

            let enum_values = parse_enum_labels(&column_type);
            let metadata = TypeMetadata {
                enum_values: enum_values.clone(),
                ..Default::default()
            };

            let mut column = ObservedColumn::new(name, column_type.clone());
            column.described_type = self.type_mapping.describe_sql_type(&column_type, &metadata);
            column.enum_values = enum_values.unwrap_or_default();
            column.allow_null = is_nullable == "YES";
            column.primary_key = column_key == "PRI";
            column.auto_increment = extra.to_lowercase().contains("auto_increment");
            column.comment = (!comment.is_empty()).then_some(comment);
            column.on_update = mysql_on_update(&extra);

            if let Some((default_sql, display)) = mysql_default(raw_default.as_deref(), &extra) {
                column.default_sql = Some(default_sql);
                column.default_display = Some(display);
            }

            columns.push(column);
        }

        Ok(columns)
    }

    async fn read_indexes(
        &self,
        pool: &AnyPool,
        schema: &str,
        table: &str,
        snapshot: &mut TableSnapshot,
    ) -> Result<(), MigrationEngineError> {
        let rows = fetch_rows(pool, INDEXES_SQL, &[schema, table]).await?;
        let mut unique = Vec::new();
        let mut non_unique = Vec::new();

        for row in &rows {
            let name: String = column_value(row, 0, INDEXES_SQL)?;
            let column: Option<String> = column_value(row, 1, INDEXES_SQL)?;
            let non_unique_flag: i64 = column_value(row, 2, INDEXES_SQL)?;
            // 関数インデックスはカラム名を持たない
            let Some(column) = column else {
                continue;
            };
            match (name.as_str(), non_unique_flag) {
                (PRIMARY_INDEX, _) => snapshot.primary_key_columns.push(column),
                (_, 0) => unique.push((name, column)),
                _ => non_unique.push((name, column)),
            }
        }

        if !snapshot.primary_key_columns.is_empty() {
            snapshot.primary_key_name = Some(PRIMARY_INDEX.to_string());
        }
        snapshot
            .unique_constraints
            .extend(group_columns(unique).into_iter().map(|(name, columns)| UniqueConstraint {
                name,
                columns,
                is_constraint: true,
                sql: None,
            }));
        snapshot
            .indexes
            .extend(group_columns(non_unique).into_iter().map(|(name, columns)| IndexInfo {
                name,
                columns,
                sql: None,
            }));

        Ok(())
    }

    async fn read_foreign_keys(
        &self,
        pool: &AnyPool,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKey>, MigrationEngineError> {
        let rows = fetch_rows(pool, FOREIGN_KEYS_SQL, &[schema, table]).await?;
        let mut foreign_keys: Vec<ForeignKey> = Vec::new();

        for row in &rows {
            let name: String = column_value(row, 0, FOREIGN_KEYS_SQL)?;
            let column: String = column_value(row, 1, FOREIGN_KEYS_SQL)?;
            let referenced_schema: Option<String> = column_value(row, 2, FOREIGN_KEYS_SQL)?;
            let referenced_table: String = column_value(row, 3, FOREIGN_KEYS_SQL)?;
            let referenced_column: String = column_value(row, 4, FOREIGN_KEYS_SQL)?;
            let on_update: String = column_value(row, 5, FOREIGN_KEYS_SQL)?;
            let on_delete: String = column_value(row, 6, FOREIGN_KEYS_SQL)?;

            match foreign_keys.iter_mut().find(|fk| fk.name == name) {
                Some(fk) => {
                    fk.columns.push(column);
                    fk.referenced_columns.push(referenced_column);
                }
                None => foreign_keys.push(ForeignKey {
                    name,
                    columns: vec![column],
                    referenced_schema,
                    referenced_table,
                    referenced_columns: vec![referenced_column],
                    on_update: ReferentialAction::from_sql(&on_update),
                    on_delete: ReferentialAction::from_sql(&on_delete),
                }),
            }
        }

        Ok(foreign_keys)
    }
}

/// COLUMN_DEFAULT と EXTRA から (再宣言用SQL, 表示用の値) を作る
///
/// MySQL 8 の式デフォルトは EXTRA に DEFAULT_GENERATED が付き、
/// それ以外のデフォルトはクォートされていない値として格納されています。
fn mysql_default(raw: Option<&str>, extra: &str) -> Option<(String, String)> {
    let raw = raw?;
    if extra.to_uppercase().contains("DEFAULT_GENERATED") {
        let upper = raw.to_uppercase();
        let sql = if upper.starts_with("CURRENT_TIMESTAMP") || upper.starts_with("NOW(") {
            raw.to_string()
        } else {
            format!("({})", raw)
        };
        return Some((sql, raw.to_string()));
    }
    Some((quote_literal(Dialect::MySQL, raw), raw.to_string()))
}

/// EXTRA（例: "DEFAULT_GENERATED on update CURRENT_TIMESTAMP(3)"）から ON UPDATE の値を取り出す
fn mysql_on_update(extra: &str) -> Option<String> {
    let position = extra.to_lowercase().find("on update ")?;
    let value = extra[position + "on update ".len()..].trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[async_trait]
impl CatalogReader for MySqlCatalogReader {
    async fn resolve_schema(&self, pool: &AnyPool) -> Result<Option<String>, MigrationEngineError> {
        let sql = "SELECT CAST(DATABASE() AS CHAR)";
        let rows = fetch_rows(pool, sql, &[]).await?;
        match rows.first() {
            Some(row) => column_value(row, 0, sql),
            None => Ok(None),
        }
    }

    async fn read_table(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
    ) -> Result<TableSnapshot, MigrationEngineError> {
        let schema = match &table.schema {
            Some(schema) => schema.clone(),
            None => self.resolve_schema(pool).await?.ok_or_else(|| {
                MigrationEngineError::Connection {
                    message: "No database selected".to_string(),
                    cause: format!("cannot resolve the schema of '{}'", table),
                }
            })?,
        };
        let resolved = TableIdentifier::with_schema(table.table_name.clone(), schema.clone());
        debug!(table = %resolved, "Reading MySQL catalog");

        let mut snapshot = TableSnapshot::new(resolved);
        snapshot.columns = self.read_columns(pool, &schema, &table.table_name).await?;
        if !snapshot.exists() {
            return Ok(snapshot);
        }

        self.read_indexes(pool, &schema, &table.table_name, &mut snapshot)
            .await?;
        for column in snapshot.columns.iter_mut() {
            column.primary_key = snapshot.primary_key_columns.contains(&column.name);
        }
        snapshot.foreign_keys = self
            .read_foreign_keys(pool, &schema, &table.table_name)
            .await?;

        Ok(snapshot)
    }
}
