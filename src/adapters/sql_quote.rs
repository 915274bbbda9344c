// SQLクォートユーティリティ
//
// 各データベース方言用の識別子・修飾名・文字列リテラルのクォート関数を提供します。
// sql_generatorとcatalog_readerの両方から使用される共有モジュールです。

use crate::core::config::Dialect;
use crate::core::schema::TableIdentifier;

/// PostgreSQL用識別子クォート（ダブルクォート）
///
/// # Examples
/// ```
/// use strata_alter::adapters::sql_quote::quote_identifier_postgres;
/// assert_eq!(quote_identifier_postgres(r#"table"name"#), r#""table""name""#);
/// ```
pub fn quote_identifier_postgres(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// MySQL用識別子クォート（バッククォート）
///
/// # Examples
/// ```
/// use strata_alter::adapters::sql_quote::quote_identifier_mysql;
/// assert_eq!(quote_identifier_mysql("table`name"), "`table``name`");
/// ```
pub fn quote_identifier_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// SQLite用識別子クォート（ダブルクォート）
pub fn quote_identifier_sqlite(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// 方言に応じた識別子クォート
pub fn quote_identifier(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::PostgreSQL => quote_identifier_postgres(name),
        Dialect::MySQL => quote_identifier_mysql(name),
        Dialect::SQLite => quote_identifier_sqlite(name),
    }
}

/// カラム名リストをクォートしてカンマ区切りで結合
pub fn quote_columns<S: AsRef<str>>(dialect: Dialect, columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(dialect, c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// スキーマ修飾付きのテーブル名
///
/// SQLiteはスキーマを持たないため、`schema.table` を1つの識別子として扱います。
pub fn quote_table(dialect: Dialect, table: &TableIdentifier) -> String {
    match (&table.schema, dialect) {
        (Some(schema), Dialect::SQLite) => {
            quote_identifier_sqlite(&format!("{}.{}", schema, table.table_name))
        }
        (Some(schema), _) => format!(
            "{}.{}",
            quote_identifier(dialect, schema),
            quote_identifier(dialect, &table.table_name)
        ),
        (None, _) => quote_identifier(dialect, &table.table_name),
    }
}

/// スキーマ修飾付きの任意オブジェクト名（PostgreSQLの型名・シーケンス名など）
pub fn quote_qualified(dialect: Dialect, schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(schema) if dialect != Dialect::SQLite => format!(
            "{}.{}",
            quote_identifier(dialect, schema),
            quote_identifier(dialect, name)
        ),
        _ => quote_identifier(dialect, name),
    }
}

/// 文字列リテラルのクォート
///
/// シングルクォートは二重にエスケープします。
/// MySQLはバックスラッシュもエスケープ文字として解釈するため二重にします。
pub fn quote_literal(dialect: Dialect, value: &str) -> String {
    let escaped = value.replace('\'', "''");
    match dialect {
        Dialect::MySQL => format!("'{}'", escaped.replace('\\', "\\\\")),
        _ => format!("'{}'", escaped),
    }
}

/// クォートされた文字列リテラルを元の値に戻す
///
/// クォートされていない場合は `None` を返します。
pub fn unquote_literal(literal: &str) -> Option<String> {
    let trimmed = literal.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        Some(trimmed[1..trimmed.len() - 1].replace("''", "'"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // quote_identifier tests
    // =========================================================================

    #[test]
    fn test_quote_identifier_with_embedded_quote() {
        assert_eq!(quote_identifier_postgres("\""), "\"\"\"\"");
        assert_eq!(quote_identifier_mysql("a`b`c"), "`a``b``c`");
        assert_eq!(quote_identifier_sqlite(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn test_quote_identifier_by_dialect() {
        assert_eq!(quote_identifier(Dialect::PostgreSQL, "order"), r#""order""#);
        assert_eq!(quote_identifier(Dialect::MySQL, "order"), "`order`");
        assert_eq!(quote_identifier(Dialect::SQLite, "order"), r#""order""#);
    }

    #[test]
    fn test_quote_columns() {
        let columns = vec!["id".to_string(), "name".to_string()];
        assert_eq!(quote_columns(Dialect::MySQL, &columns), "`id`, `name`");
        assert_eq!(quote_columns::<String>(Dialect::SQLite, &[]), "");
    }

    // =========================================================================
    // quote_table tests
    // =========================================================================

    #[test]
    fn test_quote_table_with_schema() {
        let table = TableIdentifier::with_schema("users", "archive");
        assert_eq!(
            quote_table(Dialect::PostgreSQL, &table),
            r#""archive"."users""#
        );
        assert_eq!(quote_table(Dialect::MySQL, &table), "`archive`.`users`");
        // SQLiteはスキーマをテーブル名に畳み込む
        assert_eq!(quote_table(Dialect::SQLite, &table), r#""archive.users""#);
    }

    #[test]
    fn test_quote_table_without_schema() {
        let table = TableIdentifier::new("users");
        assert_eq!(quote_table(Dialect::PostgreSQL, &table), r#""users""#);
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(
            quote_qualified(Dialect::PostgreSQL, Some("public"), "enum_users_kind"),
            r#""public"."enum_users_kind""#
        );
        assert_eq!(
            quote_qualified(Dialect::PostgreSQL, None, "enum_users_kind"),
            r#""enum_users_kind""#
        );
    }

    // =========================================================================
    // literal tests
    // =========================================================================

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal(Dialect::PostgreSQL, "it's"), "'it''s'");
        assert_eq!(quote_literal(Dialect::MySQL, r"a\b"), r"'a\\b'");
        assert_eq!(quote_literal(Dialect::SQLite, r"a\b"), r"'a\b'");
    }

    #[test]
    fn test_unquote_literal() {
        assert_eq!(unquote_literal("'it''s'"), Some("it's".to_string()));
        assert_eq!(unquote_literal("''"), Some(String::new()));
        assert_eq!(unquote_literal("CURRENT_TIMESTAMP"), None);
    }
}
