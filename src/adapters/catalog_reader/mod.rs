// カタログリーダー
//
// データベースのカタログ（information_schema / pg_catalog / PRAGMA）から
// テーブルの観測状態を読み取るための抽象化レイヤー。

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlCatalogReader;
pub use postgres::PostgresCatalogReader;
pub use sqlite::SqliteCatalogReader;

use crate::adapters::sql_quote::unquote_literal;
use crate::core::config::Dialect;
use crate::core::error::MigrationEngineError;
use crate::core::schema::TableIdentifier;
use crate::core::snapshot::TableSnapshot;
use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{Any, AnyPool, Decode, Row, Type};

/// カタログ読み取りインターフェース
///
/// 各データベース方言固有のカタログ問い合わせを抽象化します。
/// 呼び出しのたびにカタログを読み直し、結果をキャッシュしません。
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// 接続の既定スキーマを取得（スキーマを持たない方言は `None`）
    async fn resolve_schema(&self, pool: &AnyPool) -> Result<Option<String>, MigrationEngineError>;

    /// テーブルの観測状態を取得
    ///
    /// テーブルが存在しない場合はカラムが空のスナップショットを返します。
    async fn read_table(
        &self,
        pool: &AnyPool,
        table: &TableIdentifier,
    ) -> Result<TableSnapshot, MigrationEngineError>;
}

/// 方言に応じたカタログリーダーを作成
pub fn create_catalog_reader(dialect: Dialect) -> Box<dyn CatalogReader> {
    match dialect {
        Dialect::PostgreSQL => Box::new(PostgresCatalogReader::new()),
        Dialect::MySQL => Box::new(MySqlCatalogReader::new()),
        Dialect::SQLite => Box::new(SqliteCatalogReader::new()),
    }
}

/// 行から値を取り出す（失敗時はクエリを含むエラーに変換）
pub(crate) fn column_value<'r, T>(row: &'r AnyRow, index: usize, sql: &str) -> Result<T, MigrationEngineError>
where
    T: Decode<'r, Any> + Type<Any>,
{
    row.try_get(index)
        .map_err(|e| MigrationEngineError::execution(sql, e))
}

/// カタログ問い合わせを実行して全行を取得
pub(crate) async fn fetch_rows(
    pool: &AnyPool,
    sql: &str,
    binds: &[&str],
) -> Result<Vec<AnyRow>, MigrationEngineError> {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = query.bind(value.to_string());
    }
    query
        .fetch_all(pool)
        .await
        .map_err(|e| MigrationEngineError::execution(sql, e))
}

/// カタログに記録されたデフォルト式を表示用に正規化
///
/// 型キャスト（`::type`）と外側の括弧を取り除き、文字列リテラルはクォートを外します。
/// NULLは `None` になります。
pub fn normalize_default(raw: &str) -> Option<String> {
    let without_cast = strip_type_cast(raw.trim());
    let unwrapped = strip_outer_parens(without_cast);

    if unwrapped.is_empty() || unwrapped.eq_ignore_ascii_case("NULL") {
        return None;
    }
    Some(unquote_literal(unwrapped).unwrap_or_else(|| unwrapped.to_string()))
}

/// PostgreSQLのシーケンスによるデフォルトかどうか
pub fn is_sequence_default(raw: &str) -> bool {
    raw.trim_start().to_lowercase().starts_with("nextval(")
}

/// クォート外にある最初の `::` 以降を取り除く
fn strip_type_cast(expression: &str) -> &str {
    let mut in_quote = false;
    let bytes = expression.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b':' if !in_quote && bytes.get(i + 1) == Some(&b':') => {
                return expression[..i].trim_end();
            }
            _ => {}
        }
        i += 1;
    }
    expression
}

/// 式全体を囲む括弧を取り除く（例: "(0)" -> "0"）
fn strip_outer_parens(expression: &str) -> &str {
    let mut current = expression.trim();
    while current.starts_with('(') && current.ends_with(')') && encloses_whole(current) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

/// 先頭の括弧が末尾の括弧と対応しているか
fn encloses_whole(expression: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, c) in expression.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != expression.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// カラム名の並びをまとめる
///
/// カタログは (制約名, カラム名) を1行ずつ返すため、制約名ごとに定義順でまとめます。
pub(crate) fn group_columns(rows: Vec<(String, String)>) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (name, column) in rows {
        match grouped.iter_mut().find(|(n, _)| *n == name) {
            Some((_, columns)) => columns.push(column),
            None => grouped.push((name, vec![column])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_default_strips_casts_and_quotes() {
        assert_eq!(
            normalize_default("'active'::character varying").as_deref(),
            Some("active")
        );
        assert_eq!(
            normalize_default("'value1'::enum_users_kind").as_deref(),
            Some("value1")
        );
        assert_eq!(normalize_default("'it''s'::text").as_deref(), Some("it's"));
        assert_eq!(normalize_default("'a::b'").as_deref(), Some("a::b"));
        assert_eq!(normalize_default("(0)").as_deref(), Some("0"));
        assert_eq!(normalize_default("'-1'::integer").as_deref(), Some("-1"));
        assert_eq!(normalize_default("CURRENT_TIMESTAMP").as_deref(), Some("CURRENT_TIMESTAMP"));
        assert_eq!(normalize_default("now()").as_deref(), Some("now()"));
    }

    #[test]
    fn test_normalize_default_null() {
        assert_eq!(normalize_default("NULL"), None);
        assert_eq!(normalize_default("NULL::character varying"), None);
        assert_eq!(normalize_default(""), None);
    }

    #[test]
    fn test_is_sequence_default() {
        assert!(is_sequence_default("nextval('users_id_seq'::regclass)"));
        assert!(!is_sequence_default("'nextval'"));
    }

    #[test]
    fn test_strip_outer_parens_keeps_unbalanced() {
        assert_eq!(strip_outer_parens("(a) + (b)"), "(a) + (b)");
        assert_eq!(strip_outer_parens("((1))"), "1");
    }

    #[test]
    fn test_group_columns_preserves_order() {
        let grouped = group_columns(vec![
            ("pk".to_string(), "a".to_string()),
            ("uq".to_string(), "c".to_string()),
            ("pk".to_string(), "b".to_string()),
        ]);
        assert_eq!(
            grouped,
            vec![
                ("pk".to_string(), vec!["a".to_string(), "b".to_string()]),
                ("uq".to_string(), vec!["c".to_string()]),
            ]
        );
    }

    #[test]
    fn test_create_catalog_reader_for_each_dialect() {
        let _ = create_catalog_reader(Dialect::PostgreSQL);
        let _ = create_catalog_reader(Dialect::MySQL);
        let _ = create_catalog_reader(Dialect::SQLite);
    }
}
