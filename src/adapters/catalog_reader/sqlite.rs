// SQLite用カタログリーダー
//
// PRAGMA と sqlite_master からテーブルの観測状態を読み取ります。
// コメント・列挙ラベル・AUTOINCREMENT はPRAGMAに現れないため、
// sqlite_master に保存された CREATE TABLE 文から復元します。

use super::{column_value, fetch_rows, normalize_default, CatalogReader};
use crate::adapters::sql_generator::sqlite::unescape_comment;
use crate::adapters::sql_quote::{quote_identifier_sqlite, quote_table};
use crate::adapters::type_mapping::common::parse_quoted_list;
use crate::adapters::type_mapping::{TypeMappingService, TypeMetadata};
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::naming;
use crate::core::schema::{ReferentialAction, TableIdentifier};
use crate::core::snapshot::{ForeignKey, IndexInfo, ObservedColumn, TableSnapshot, UniqueConstraint};
use async_trait::async_trait;
use regex::Regex;
use sqlx::AnyPool;
use std::collections::HashMap;
use tracing::debug;

const MASTER_SQL: &str = "SELECT sql FROM sqlite_master WHERE type = ? AND name = ?";

const COMMENT_PATTERN: &str = r"/\*\s?(.*?)\s?\*/";
const CHECK_PATTERN: &str = r#"CHECK\s*\(\s*"(?:[^"]|"")+"\s+IN\s*\((.*)\)\s*\)\s*$"#;

/// CREATE TABLE 文の1カラム分の付加情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ColumnExtras {
    /// カラムコメント
    pub comment: Option<String>,
    /// CHECK (... IN (...)) のラベル
    pub enum_values: Vec<String>,
}

/// CREATE TABLE 文からカラムごとのコメントと列挙ラベルを取り出す
///
/// 1カラム1行で出力された文を前提とします。それ以外の形式の行は無視されます。
pub(crate) fn parse_column_extras(create_sql: &str) -> HashMap<String, ColumnExtras> {
    let mut extras = HashMap::new();
    let (Ok(comment_re), Ok(check_re)) = (Regex::new(COMMENT_PATTERN), Regex::new(CHECK_PATTERN)) else {
        return extras;
    };

    for raw_line in create_sql.lines() {
        let line = raw_line.trim();
        let line = line.strip_prefix(',').unwrap_or(line).trim();
        let line = line.strip_suffix(',').unwrap_or(line).trim();
        if line.is_empty() || line.starts_with('(') || line.starts_with(')') {
            continue;
        }
        let upper = line.to_uppercase();
        if ["CREATE", "PRIMARY", "UNIQUE", "FOREIGN", "CONSTRAINT", "CHECK"]
            .iter()
            .any(|keyword| upper.starts_with(keyword))
        {
            continue;
        }
        let Some(name) = leading_identifier(line) else {
            continue;
        };

        let mut entry = ColumnExtras::default();
        if let Some(captures) = comment_re.captures(line) {
            entry.comment = captures.get(1).map(|m| unescape_comment(m.as_str()));
        }
        let without_comment = comment_re.replace_all(line, "");
        if let Some(captures) = check_re.captures(without_comment.trim()) {
            if let Some(body) = captures.get(1) {
                entry.enum_values = parse_quoted_list(body.as_str());
            }
        }

        if entry != ColumnExtras::default() {
            extras.insert(name, entry);
        }
    }

    extras
}

/// 行頭の識別子を取り出す（"..." のクォートと "" エスケープに対応）
fn leading_identifier(line: &str) -> Option<String> {
    let mut chars = line.chars().peekable();
    match chars.peek() {
        Some('"') => {
            chars.next();
            let mut name = String::new();
            while let Some(c) = chars.next() {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        name.push('"');
                        chars.next();
                    } else {
                        return Some(name);
                    }
                } else {
                    name.push(c);
                }
            }
            None
        }
        Some('`') | Some('[') => None,
        Some(_) => line.split_whitespace().next().map(str::to_string),
        None => None,
    }
}

/// SQLite上のテーブル名（スキーマはテーブル名に畳み込まれる）
fn storage_name(table: &TableIdentifier) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", schema, table.table_name),
        None => table.table_name.clone(),
    }
}

/// SQLite用カタログリーダー
#[derive(Debug, Clone)]
pub struct SqliteCatalogReader {
    type_mapping: TypeMappingService,
}

impl Default for SqliteCatalogReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteCatalogReader {
    /// 新しいSqliteCatalogReaderを作成
    pub fn new() -> Self {
        Self {
            type_mapping: TypeMappingService::new(Dialect::SQLite),
        }
    }

    async fn read_master_sql(
        &self,
        pool: &AnyPool,
        kind: &str,
        name: &str,
    ) -> Result<Option<String>, MigrationEngineError> {
        let rows = fetch_rows(pool, MASTER_SQL, &[kind, name]).await?;
        match rows.first() {
            Some(row) => column_value(row, 0, MASTER_SQL),
            None => Ok(None),
        }
    }

    async fn read_columns(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
        create_sql: Option<&str>,
        snapshot: &mut TableSnapshot,
    ) -> Result<(), MigrationEngineError> {
        let sql = format!("PRAGMA table_info({})", quote_table(Dialect::SQLite, table));
        let rows = fetch_rows(pool, &sql, &[]).await?;

        let extras = create_sql.map(parse_column_extras).unwrap_or_default();
        let declares_autoincrement = create_sql
            .map(|s| s.to_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false);

        let mut primary_key: Vec<(i64, String)> = Vec::new();
        for row in &rows {
            let name: String = column_value(row, 1, &sql)?;
            let declared_type: Option<String> = column_value(row, 2, &sql)?;
            let not_null: i64 = column_value(row, 3, &sql)?;
            let raw_default: Option<String> = column_value(row, 4, &sql)?;
            let pk_position: i64 = column_value(row, 5, &sql)?;

            let declared_type = declared_type.unwrap_or_default();
            let extra = extras.get(&name).cloned().unwrap_or_default();
            let metadata = TypeMetadata {
                enum_values: (!extra.enum_values.is_empty()).then(|| extra.enum_values.clone()),
                ..Default::default()
            };

            let mut column = ObservedColumn::new(name.clone(), declared_type.clone());
            column.described_type = self.type_mapping.describe_sql_type(&declared_type, &metadata);
            column.enum_values = extra.enum_values;
            column.comment = extra.comment;
            column.allow_null = not_null == 0 && pk_position == 0;
            if let Some(raw) = raw_default {
                column.default_display = normalize_default(&raw);
                if column.default_display.is_some() {
                    column.default_sql = Some(raw);
                }
            }
            if pk_position > 0 {
                column.primary_key = true;
                primary_key.push((pk_position, name));
            }

            snapshot.columns.push(column);
        }

        primary_key.sort_by_key(|(position, _)| *position);
        snapshot.primary_key_columns = primary_key.into_iter().map(|(_, name)| name).collect();

        // AUTOINCREMENT は INTEGER PRIMARY KEY の単一カラムにのみ付けられる
        if declares_autoincrement && snapshot.has_single_primary_key() {
            let pk = snapshot.primary_key_columns[0].clone();
            if let Some(column) = snapshot.columns.iter_mut().find(|c| c.name == pk) {
                column.auto_increment = column.type_sql.eq_ignore_ascii_case("INTEGER");
            }
        }

        Ok(())
    }

    async fn read_indexes(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
        snapshot: &mut TableSnapshot,
    ) -> Result<(), MigrationEngineError> {
        let list_sql = format!("PRAGMA index_list({})", quote_table(Dialect::SQLite, table));
        let rows = fetch_rows(pool, &list_sql, &[]).await?;

        for row in &rows {
            let name: String = column_value(row, 1, &list_sql)?;
            let unique: i64 = column_value(row, 2, &list_sql)?;
            let origin: String = column_value(row, 3, &list_sql)?;
            if origin == "pk" {
                continue;
            }

            let info_sql = format!("PRAGMA index_info({})", quote_identifier_sqlite(&name));
            let info_rows = fetch_rows(pool, &info_sql, &[]).await?;
            let mut columns: Vec<(i64, String)> = Vec::new();
            for info in &info_rows {
                let seqno: i64 = column_value(info, 0, &info_sql)?;
                let column: Option<String> = column_value(info, 2, &info_sql)?;
                if let Some(column) = column {
                    columns.push((seqno, column));
                }
            }
            columns.sort_by_key(|(seqno, _)| *seqno);
            let columns: Vec<String> = columns.into_iter().map(|(_, c)| c).collect();

            // origin が "c" のものは CREATE INDEX で作られ、SQLが保存されている
            let sql = if origin == "c" {
                self.read_master_sql(pool, "index", &name).await?
            } else {
                None
            };

            if unique != 0 {
                snapshot.unique_constraints.push(UniqueConstraint {
                    name,
                    columns,
                    is_constraint: origin == "u",
                    sql,
                });
            } else {
                snapshot.indexes.push(IndexInfo { name, columns, sql });
            }
        }

        Ok(())
    }

    async fn read_foreign_keys(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
    ) -> Result<Vec<ForeignKey>, MigrationEngineError> {
        let sql = format!("PRAGMA foreign_key_list({})", quote_table(Dialect::SQLite, table));
        let rows = fetch_rows(pool, &sql, &[]).await?;
        let mut grouped: Vec<(i64, ForeignKey)> = Vec::new();

        for row in &rows {
            let id: i64 = column_value(row, 0, &sql)?;
            let referenced_table: String = column_value(row, 2, &sql)?;
            let column: String = column_value(row, 3, &sql)?;
            let referenced_column: Option<String> = column_value(row, 4, &sql)?;
            let on_update: String = column_value(row, 5, &sql)?;
            let on_delete: String = column_value(row, 6, &sql)?;

            // 参照先カラムの省略は参照先テーブルの主キーを意味する
            let referenced_column = match referenced_column {
                Some(column) => column,
                None => self
                    .primary_key_of(pool, &referenced_table)
                    .await?
                    .unwrap_or_else(|| "rowid".to_string()),
            };

            match grouped.iter_mut().find(|(fk_id, _)| *fk_id == id) {
                Some((_, fk)) => {
                    fk.columns.push(column);
                    fk.referenced_columns.push(referenced_column);
                }
                None => grouped.push((
                    id,
                    ForeignKey {
                        name: naming::foreign_key_name(&table.table_name, &column, &referenced_table),
                        columns: vec![column],
                        referenced_schema: None,
                        referenced_table,
                        referenced_columns: vec![referenced_column],
                        on_update: ReferentialAction::from_sql(&on_update),
                        on_delete: ReferentialAction::from_sql(&on_delete),
                    },
                )),
            }
        }

        // PRAGMA は後に宣言された外部キーから返すため、宣言順に並べ直す
        grouped.sort_by_key(|(id, _)| std::cmp::Reverse(*id));
        Ok(grouped.into_iter().map(|(_, fk)| fk).collect())
    }

    async fn primary_key_of(
        &self,
        pool: &AnyPool,
        table_name: &str,
    ) -> Result<Option<String>, MigrationEngineError> {
        let sql = format!("PRAGMA table_info({})", quote_identifier_sqlite(table_name));
        let rows = fetch_rows(pool, &sql, &[]).await?;
        for row in &rows {
            let pk_position: i64 = column_value(row, 5, &sql)?;
            if pk_position == 1 {
                return column_value(row, 1, &sql).map(Some);
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl CatalogReader for SqliteCatalogReader {
    async fn resolve_schema(&self, _pool: &AnyPool) -> Result<Option<String>, MigrationEngineError> {
        Ok(None)
    }

    async fn read_table(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
    ) -> Result<TableSnapshot, MigrationEngineError> {
        debug!(table = %table, "Reading SQLite catalog");

        let mut snapshot = TableSnapshot::new(table.clone());
        let create_sql = self
            .read_master_sql(pool, "table", &storage_name(table))
            .await?;
        self.read_columns(pool, table, create_sql.as_deref(), &mut snapshot)
            .await?;
        if !snapshot.exists() {
            return Ok(snapshot);
        }

        self.read_indexes(pool, table, &mut snapshot).await?;
        snapshot.foreign_keys = self.read_foreign_keys(pool, table).await?;

        Ok(snapshot)
    }
}
