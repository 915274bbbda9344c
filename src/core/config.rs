// 接続設定管理
//
// マイグレーション対象データベースの方言と、環境別の接続設定を表現します。

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// データベース方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(rename = "postgresql", alias = "postgres")]
    PostgreSQL,
    #[serde(rename = "mysql")]
    MySQL,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::PostgreSQL => write!(f, "postgresql"),
            Dialect::MySQL => write!(f, "mysql"),
            Dialect::SQLite => write!(f, "sqlite"),
        }
    }
}

impl Dialect {
    /// Dialectに応じたデフォルトポートを返す
    ///
    /// - PostgreSQL: 5432
    /// - MySQL: 3306
    /// - SQLite: None（ファイルベースのためポート不要）
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::PostgreSQL => Some(5432),
            Dialect::MySQL => Some(3306),
            Dialect::SQLite => None,
        }
    }

    /// 接続URLのスキームから方言を判定
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?;
        match scheme {
            "postgres" | "postgresql" => Some(Dialect::PostgreSQL),
            "mysql" | "mariadb" => Some(Dialect::MySQL),
            "sqlite" => Some(Dialect::SQLite),
            _ => None,
        }
    }
}

/// 接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 設定ファイルのバージョン
    pub version: String,

    /// データベース方言
    pub dialect: Dialect,

    /// 環境別のデータベース設定
    pub environments: HashMap<String, DatabaseConfig>,
}

impl Config {
    /// デフォルトの設定ファイルパス
    pub const DEFAULT_CONFIG_PATH: &'static str = crate::core::naming::CONFIG_FILE;

    /// 指定された環境のデータベース設定を取得
    pub fn get_database_config(&self, environment: &str) -> Result<DatabaseConfig, ConfigError> {
        self.environments.get(environment).cloned().ok_or_else(|| {
            let mut available: Vec<String> = self.environments.keys().cloned().collect();
            available.sort();
            ConfigError::EnvironmentNotFound {
                name: environment.to_string(),
                available,
            }
        })
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.is_empty() {
            return Err(ConfigError::MissingVersion);
        }

        if self.environments.is_empty() {
            return Err(ConfigError::NoEnvironments);
        }

        for (env_name, db_config) in &self.environments {
            db_config
                .validate()
                .map_err(|source| ConfigError::InvalidEnvironment {
                    environment: env_name.clone(),
                    source: Box::new(source),
                })?;
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(yaml: &str) -> Result<Self, Self::Err> {
        serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }
}

/// データベース接続設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// ホスト名（SQLiteの場合は不要）
    #[serde(default = "default_host", skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// ポート番号（Noneの場合はDialectのデフォルトポートを使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// データベース名（SQLiteの場合はファイルパス、":memory:" も可）
    pub database: String,

    /// ユーザー名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// パスワード
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// 接続タイムアウト（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// 最大コネクション数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    /// 最小コネクション数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_connections: Option<u32>,

    /// テーブル識別子でスキーマを省略した場合に使用するスキーマ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_schema: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: String::new(),
            user: None,
            password: None,
            timeout: None,
            max_connections: None,
            min_connections: None,
            default_schema: None,
        }
    }
}

impl DatabaseConfig {
    /// Dialectに応じた解決済みポート番号を取得
    ///
    /// SQLiteなどデフォルトポートがないDialectの場合は0を返します。
    pub fn resolved_port(&self, dialect: Dialect) -> u16 {
        self.port
            .unwrap_or_else(|| dialect.default_port().unwrap_or(0))
    }

    /// Validate database configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.is_empty() {
            return Err(ConfigError::MissingDatabaseName);
        }

        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(ConfigError::InvalidPoolSize { min, max });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::PostgreSQL.to_string(), "postgresql");
        assert_eq!(Dialect::MySQL.to_string(), "mysql");
        assert_eq!(Dialect::SQLite.to_string(), "sqlite");
    }

    #[test]
    fn test_dialect_default_port() {
        assert_eq!(Dialect::PostgreSQL.default_port(), Some(5432));
        assert_eq!(Dialect::MySQL.default_port(), Some(3306));
        assert_eq!(Dialect::SQLite.default_port(), None);
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/app"),
            Some(Dialect::PostgreSQL)
        );
        assert_eq!(Dialect::from_url("mysql://root@db/app"), Some(Dialect::MySQL));
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::SQLite));
        assert_eq!(Dialect::from_url("oracle://db"), None);
    }

    #[test]
    fn test_resolved_port_without_explicit_port() {
        let config = DatabaseConfig {
            database: "test".to_string(),
            ..Default::default()
        };

        assert_eq!(config.resolved_port(Dialect::PostgreSQL), 5432);
        assert_eq!(config.resolved_port(Dialect::MySQL), 3306);
        assert_eq!(config.resolved_port(Dialect::SQLite), 0);
    }

    #[test]
    fn test_resolved_port_with_explicit_port() {
        let config = DatabaseConfig {
            port: Some(5433),
            database: "test".to_string(),
            ..Default::default()
        };

        assert_eq!(config.resolved_port(Dialect::MySQL), 5433);
    }

    #[test]
    fn test_validate_rejects_inverted_pool_size() {
        let config = DatabaseConfig {
            database: "test".to_string(),
            min_connections: Some(10),
            max_connections: Some(2),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPoolSize { min: 10, max: 2 })
        ));
    }

    #[test]
    fn test_config_from_str() {
        let yaml = r#"
version: "1.0"
dialect: postgresql
environments:
  development:
    database: app_dev
    user: app
    default_schema: public
"#;
        let config: Config = yaml.parse().unwrap();
        assert_eq!(config.dialect, Dialect::PostgreSQL);

        let dev = config.get_database_config("development").unwrap();
        assert_eq!(dev.database, "app_dev");
        assert_eq!(dev.default_schema.as_deref(), Some("public"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_database_config_unknown_environment() {
        let config = Config {
            version: "1.0".to_string(),
            dialect: Dialect::SQLite,
            environments: HashMap::new(),
        };

        let err = config.get_database_config("production").unwrap_err();
        assert!(err.to_string().contains("production"));
        assert!(matches!(config.validate(), Err(ConfigError::NoEnvironments)));
    }
}
