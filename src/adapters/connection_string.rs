// 接続文字列ビルダー
//
// DatabaseConfig と Dialect から sqlx の AnyPool に渡す接続URLを生成する。

use crate::core::config::{DatabaseConfig, Dialect};
use urlencoding::encode;

/// 接続文字列を生成
///
/// ユーザー名とパスワードはパーセントエンコードされます。
/// SQLiteでデータベース名が ":memory:" の場合はインメモリデータベースのURLになります。
pub fn build_connection_string(dialect: Dialect, config: &DatabaseConfig) -> String {
    match dialect {
        Dialect::PostgreSQL => network_url("postgresql", "postgres", dialect, config),
        Dialect::MySQL => network_url("mysql", "root", dialect, config),
        Dialect::SQLite if config.database == ":memory:" => "sqlite::memory:".to_string(),
        Dialect::SQLite => format!("sqlite://{}?mode=rwc", config.database),
    }
}

fn network_url(scheme: &str, default_user: &str, dialect: Dialect, config: &DatabaseConfig) -> String {
    let user = config.user.as_deref().unwrap_or(default_user);
    let encoded_user = encode(user);
    let auth = match config.password.as_deref() {
        Some(password) if !password.is_empty() => {
            format!("{}:{}", encoded_user, encode(password))
        }
        _ => encoded_user.to_string(),
    };
    format!(
        "{}://{}@{}:{}/{}",
        scheme,
        auth,
        config.host,
        config.resolved_port(dialect),
        config.database
    )
}
