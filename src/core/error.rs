// エラー型定義
//
// マイグレーションエンジン全体で使用されるカスタムエラー型を提供します。
// thiserrorを使用して、MigrationEngineError と ConfigError を定義します。

use crate::core::config::Dialect;
use thiserror::Error;

/// マイグレーションエンジンのエラー
///
/// 検証エラーはDDLを1文も実行する前に返されます。
/// `Execution` はデータベースが文を拒否した場合で、失敗したSQLと元の診断メッセージを保持します。
#[derive(Debug, Error)]
pub enum MigrationEngineError {
    /// カラムが存在しない
    #[error("Column '{column}' does not exist in table '{table}'")]
    ColumnNotFound {
        /// テーブル名
        table: String,
        /// カラム名
        column: String,
    },

    /// テーブルが存在しない
    #[error("Table '{table}' does not exist")]
    TableNotFound {
        /// テーブル名
        table: String,
    },

    /// 方言がこの変更を表現できない
    #[error("Unsupported alteration for {dialect}: {message}")]
    UnsupportedAlteration {
        /// 方言
        dialect: Dialect,
        /// エラーメッセージ
        message: String,
    },

    /// 要求された変更が既存の制約と両立しない
    #[error("Constraint conflict on '{table}.{column}': {message}")]
    ConstraintConflict {
        /// テーブル名
        table: String,
        /// カラム名
        column: String,
        /// エラーメッセージ
        message: String,
    },

    /// 変更要求自体が不正
    #[error("Invalid column definition: {message}")]
    InvalidDefinition {
        /// エラーメッセージ
        message: String,
    },

    /// SQL実行エラー
    #[error("Failed to execute '{sql}': {cause}")]
    Execution {
        /// 失敗したSQL
        sql: String,
        /// データベースの診断メッセージ
        cause: String,
    },

    /// 接続エラー
    #[error("Database connection error: {message} (cause: {cause})")]
    Connection {
        /// エラーメッセージ
        message: String,
        /// エラー原因
        cause: String,
    },
}

impl MigrationEngineError {
    /// SQL実行エラーを作成
    pub fn execution(sql: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        MigrationEngineError::Execution {
            sql: sql.into(),
            cause: cause.to_string(),
        }
    }

    /// 方言非対応エラーを作成
    pub fn unsupported(dialect: Dialect, message: impl Into<String>) -> Self {
        MigrationEngineError::UnsupportedAlteration {
            dialect,
            message: message.into(),
        }
    }

    /// 制約衝突エラーを作成
    pub fn conflict(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrationEngineError::ConstraintConflict {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// カラム不存在エラーかどうか
    pub fn is_column_not_found(&self) -> bool {
        matches!(self, MigrationEngineError::ColumnNotFound { .. })
    }

    /// テーブル不存在エラーかどうか
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, MigrationEngineError::TableNotFound { .. })
    }

    /// 方言非対応エラーかどうか
    pub fn is_unsupported_alteration(&self) -> bool {
        matches!(self, MigrationEngineError::UnsupportedAlteration { .. })
    }

    /// 制約衝突エラーかどうか
    pub fn is_constraint_conflict(&self) -> bool {
        matches!(self, MigrationEngineError::ConstraintConflict { .. })
    }

    /// 定義不正エラーかどうか
    pub fn is_invalid_definition(&self) -> bool {
        matches!(self, MigrationEngineError::InvalidDefinition { .. })
    }

    /// SQL実行エラーかどうか
    pub fn is_execution(&self) -> bool {
        matches!(self, MigrationEngineError::Execution { .. })
    }

    /// 接続エラーかどうか
    pub fn is_connection(&self) -> bool {
        matches!(self, MigrationEngineError::Connection { .. })
    }

    /// 失敗したSQL（実行エラーの場合のみ）
    pub fn failed_sql(&self) -> Option<&str> {
        match self {
            MigrationEngineError::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// 設定エラー
///
/// 設定ファイルの読み込み・検証時に発生するエラーを表現します。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAMLの解析エラー
    #[error("Failed to parse config file: {message}")]
    Parse {
        /// エラーメッセージ
        message: String,
    },

    /// バージョン未指定
    #[error("Config file version is not specified")]
    MissingVersion,

    /// 環境設定なし
    #[error("At least one environment configuration is required")]
    NoEnvironments,

    /// 環境が見つからない
    #[error("Environment '{name}' not found. Available environments: {available:?}")]
    EnvironmentNotFound {
        /// 指定された環境名
        name: String,
        /// 利用可能な環境名リスト
        available: Vec<String>,
    },

    /// データベース名未指定
    #[error("Database name is not specified")]
    MissingDatabaseName,

    /// コネクションプールのサイズ指定が矛盾している
    #[error("min_connections ({min}) must not exceed max_connections ({max})")]
    InvalidPoolSize {
        /// 最小コネクション数
        min: u32,
        /// 最大コネクション数
        max: u32,
    },

    /// 環境別設定の検証エラー
    #[error("Invalid config for environment '{environment}': {source}")]
    InvalidEnvironment {
        /// 環境名
        environment: String,
        /// 原因
        #[source]
        source: Box<ConfigError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MigrationEngineError::ColumnNotFound {
            table: "users".to_string(),
            column: "missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Column 'missing' does not exist in table 'users'"
        );

        let err = MigrationEngineError::unsupported(Dialect::SQLite, "cannot change references");
        assert_eq!(
            err.to_string(),
            "Unsupported alteration for sqlite: cannot change references"
        );
    }

    #[test]
    fn test_execution_keeps_sql_and_cause() {
        let err = MigrationEngineError::execution("ALTER TABLE x", "syntax error");
        assert!(err.is_execution());
        assert_eq!(err.failed_sql(), Some("ALTER TABLE x"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_predicates() {
        assert!(MigrationEngineError::TableNotFound {
            table: "t".to_string()
        }
        .is_table_not_found());
        assert!(MigrationEngineError::conflict("t", "c", "pk exists").is_constraint_conflict());
        assert!(MigrationEngineError::InvalidDefinition {
            message: "x".to_string()
        }
        .is_invalid_definition());
        assert!(MigrationEngineError::Connection {
            message: "x".to_string(),
            cause: "y".to_string()
        }
        .is_connection());
        assert!(!MigrationEngineError::execution("a", "b").is_column_not_found());
    }

    #[test]
    fn test_config_error_source_chain() {
        let err = ConfigError::InvalidEnvironment {
            environment: "production".to_string(),
            source: Box::new(ConfigError::MissingDatabaseName),
        };
        assert!(err.to_string().contains("production"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
