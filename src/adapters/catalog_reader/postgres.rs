// PostgreSQL用カタログリーダー
//
// information_schema と pg_catalog からテーブルの観測状態を読み取ります。
// AnyドライバーはPostgreSQL固有の型をデコードできないため、結果列はすべて
// text / int8 / bool にキャストしています。

use super::{column_value, fetch_rows, group_columns, is_sequence_default, normalize_default, CatalogReader};
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
        c.column_name::text,
        c.data_type::text,
        c.udt_name::text,
        c.udt_schema::text,
        (c.is_nullable = 'YES')::bool,
        c.column_default::text,
        c.character_maximum_length::int8,
        c.numeric_precision::int8,
        c.numeric_scale::int8,
        format_type(a.atttypid, a.atttypmod)::text,
        col_description(a.attrelid, a.attnum)::text,
        (c.is_identity = 'YES')::bool
    FROM information_schema.columns c
    JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
    JOIN pg_catalog.pg_class cl ON cl.relname = c.table_name AND cl.relnamespace = n.oid
    JOIN pg_catalog.pg_attribute a ON a.attrelid = cl.oid AND a.attname = c.column_name
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const ENUM_LABELS_SQL: &str = r#"
    SELECT e.enumlabel::text
    FROM pg_catalog.pg_enum e
    JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = $1 AND t.typname = $2
    ORDER BY e.enumsortorder
"#;

const KEY_CONSTRAINTS_SQL: &str = r#"
    SELECT con.conname::text, a.attname::text, con.contype::text
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = cl.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND cl.relname = $2 AND con.contype IN ('p', 'u')
    ORDER BY con.oid, k.ord
"#;

// 制約に紐づかないインデックス（CREATE [UNIQUE] INDEX で作られたもの）
const INDEXES_SQL: &str = r#"
    SELECT i.relname::text, a.attname::text, ix.indisunique::bool, pg_get_indexdef(ix.indexrelid)::text
    FROM pg_catalog.pg_index ix
    JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
    CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND t.relname = $2
      AND NOT ix.indisprimary
      AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint c WHERE c.conindid = ix.indexrelid)
    ORDER BY i.oid, k.ord
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT
        con.conname::text,
        a.attname::text,
        rn.nspname::text,
        rc.relname::text,
        ra.attname::text,
        con.confupdtype::text,
        con.confdeltype::text
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace
    JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
    WHERE n.nspname = $1 AND cl.relname = $2 AND con.contype = 'f'
    ORDER BY con.oid, k.ord
"#;

/// PostgreSQL用カタログリーダー
#[derive(Debug, Clone)]
pub struct PostgresCatalogReader {
    type_mapping: TypeMappingService,
}

impl Default for PostgresCatalogReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresCatalogReader {
    /// 新しいPostgresCatalogReaderを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(Dialect::PostgreSQL),
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
            let data_type: String = column_value(row, 1, COLUMNS_SQL)?;
            let udt_name: String = column_value(row, 2, COLUMNS_SQL)?;
            let udt_schema: String = column_value(row, 3, COLUMNS_SQL)?;
            let nullable: bool = column_value(row, 4, COLUMNS_SQL)?;
            let raw_default: Option<String> = column_value(row, 5, COLUMNS_SQL)?;
            let char_max_length: Option<i64> = column_value(row, 6, COLUMNS_SQL)?;
            let numeric_precision: Option<i64> = column_value(row, 7, COLUMNS_SQL)?;
            let numeric_scale: Option<i64> = column_value(row, 8, COLUMNS_SQL)?;
            let formatted_type: String = column_value(row, 9, COLUMNS_SQL)?;
            let comment: Option<String> = column_value(row, 10, COLUMNS_SQL)?;
            let is_identity: bool = column_value(row, 11, COLUMNS_SQL)?;

            let enum_values = if data_type == "USER-DEFINED" {
                self.read_enum_labels(pool, &udt_schema, &udt_name).await?
            } else {
                Vec::new()
            };

            let metadata = TypeMetadata {
                char_max_length: char_max_length.and_then(|v| u32::try_from(v).ok()),
                numeric_precision: numeric_precision.and_then(|v| u32::try_from(v).ok()),
                numeric_scale: numeric_scale.and_then(|v| u32::try_from(v).ok()),
                udt_name: Some(udt_name.clone()),
                enum_values: (!enum_values.is_empty()).then(|| enum_values.clone()),
            };

            let mut column = ObservedColumn::new(name, formatted_type);
            column.described_type = self.type_mapping.describe_sql_type(&data_type, &metadata);
            column.allow_null = nullable;
            column.comment = comment;
            column.auto_increment = is_identity;
            if !enum_values.is_empty() {
                column.enum_type_name = Some(udt_name);
                column.enum_values = enum_values;
            }

            match raw_default {
                Some(raw) if is_sequence_default(&raw) => column.auto_increment = true,
                Some(raw) => {
                    column.default_display = normalize_default(&raw);
                    if column.default_display.is_some() {
                        column.default_sql = Some(raw);
                    }
                }
                None => {}
            }

            columns.push(column);
        }

        Ok(columns)
    }

    async fn read_enum_labels(
        &self,
        pool: &AnyPool,
        schema: &str,
        type_name: &str,
    ) -> Result<Vec<String>, MigrationEngineError> {
        let rows = fetch_rows(pool, ENUM_LABELS_SQL, &[schema, type_name]).await?;
        rows.iter()
            .map(|row| column_value(row, 0, ENUM_LABELS_SQL))
            .collect()
    }

    async fn read_key_constraints(
        &self,
        pool: &AnyPool,
        schema: &str,
        table: &str,
        snapshot: &mut TableSnapshot,
    ) -> Result<(), MigrationEngineError> {
        let rows = fetch_rows(pool, KEY_CONSTRAINTS_SQL, &[schema, table]).await?;
        let mut primary = Vec::new();
        let mut unique = Vec::new();

        for row in &rows {
            let name: String = column_value(row, 0, KEY_CONSTRAINTS_SQL)?;
            let column: String = column_value(row, 1, KEY_CONSTRAINTS_SQL)?;
            let kind: String = column_value(row, 2, KEY_CONSTRAINTS_SQL)?;
            if kind == "p" {
                primary.push((name, column));
            } else {
                unique.push((name, column));
            }
        }

        if let Some((name, columns)) = group_columns(primary).into_iter().next() {
            snapshot.primary_key_name = Some(name);
            snapshot.primary_key_columns = columns;
        }
        snapshot
            .unique_constraints
            .extend(group_columns(unique).into_iter().map(|(name, columns)| UniqueConstraint {
                name,
                columns,
                is_constraint: true,
                sql: None,
            }));

        Ok(())
    }

    async fn read_indexes(
        &self,
        pool: &AnyPool,
        schema: &str,
        table: &str,
        snapshot: &mut TableSnapshot,
    ) -> Result<(), MigrationEngineError> {
        let rows = fetch_rows(pool, INDEXES_SQL, &[schema, table]).await?;
        let mut entries = Vec::new();
        let mut details: Vec<(String, bool, String)> = Vec::new();

        for row in &rows {
            let name: String = column_value(row, 0, INDEXES_SQL)?;
            let column: String = column_value(row, 1, INDEXES_SQL)?;
            let is_unique: bool = column_value(row, 2, INDEXES_SQL)?;
            let definition: String = column_value(row, 3, INDEXES_SQL)?;
            if !details.iter().any(|(n, _, _)| *n == name) {
                details.push((name.clone(), is_unique, definition));
            }
            entries.push((name, column));
        }

        for (name, columns) in group_columns(entries) {
            let Some((_, is_unique, definition)) = details.iter().find(|(n, _, _)| *n == name) else {
                continue;
            };
            if *is_unique {
                snapshot.unique_constraints.push(UniqueConstraint {
                    name,
                    columns,
                    is_constraint: false,
                    sql: Some(definition.clone()),
                });
            } else {
                snapshot.indexes.push(IndexInfo {
                    name,
                    columns,
                    sql: Some(definition.clone()),
                });
            }
        }

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
            let referenced_schema: String = column_value(row, 2, FOREIGN_KEYS_SQL)?;
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
                    referenced_schema: Some(referenced_schema),
                    referenced_table,
                    referenced_columns: vec![referenced_column],
                    on_update: referential_action(&on_update),
                    on_delete: referential_action(&on_delete),
                }),
            }
        }

        Ok(foreign_keys)
    }
}

/// pg_constraint の confupdtype / confdeltype を変換
fn referential_action(code: &str) -> Option<ReferentialAction> {
    match code {
        "a" => Some(ReferentialAction::NoAction),
        "r" => Some(ReferentialAction::Restrict),
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        _ => None,
    }
}

#[async_trait]
impl CatalogReader for PostgresCatalogReader {
    async fn resolve_schema(&self, pool: &AnyPool) -> Result<Option<String>, MigrationEngineError> {
        let sql = "SELECT current_schema()::text";
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
            None => self
                .resolve_schema(pool)
                .await?
                .unwrap_or_else(|| "public".to_string()),
        };
        let resolved = TableIdentifier::with_schema(table.table_name.clone(), schema.clone());
        debug!(table = %resolved, "Reading PostgreSQL catalog");

        let mut snapshot = TableSnapshot::new(resolved);
        snapshot.columns = self.read_columns(pool, &schema, &table.table_name).await?;
        if !snapshot.exists() {
            return Ok(snapshot);
        }

        self.read_key_constraints(pool, &schema, &table.table_name, &mut snapshot)
            .await?;
        for column in snapshot.columns.iter_mut() {
            column.primary_key = snapshot.primary_key_columns.contains(&column.name);
        }
        self.read_indexes(pool, &schema, &table.table_name, &mut snapshot)
            .await?;
        snapshot.foreign_keys = self
            .read_foreign_keys(pool, &schema, &table.table_name)
            .await?;

        Ok(snapshot)
    }
}
