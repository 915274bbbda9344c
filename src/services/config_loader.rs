// 設定ファイル読み込みサービス
//
// core::config の純粋性を保つため、ファイルI/Oはこのサービスに集約する。

use crate::core::config::{Config, DatabaseConfig, Dialect};
use anyhow::{Context, Result};
use std::path::Path;

/// 設定ファイル読み込みサービス
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// YAMLファイルから設定を読み込む
    pub fn from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config =
            serde_saphyr::from_str(&content).with_context(|| "Failed to parse config file")?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    /// ディレクトリ直下のデフォルト設定ファイルを読み込む
    pub fn load_default(dir: &Path) -> Result<Config> {
        Self::from_file(&dir.join(Config::DEFAULT_CONFIG_PATH))
    }

    /// 設定ファイルから指定環境の接続設定を取り出す
    pub fn load_environment(path: &Path, environment: &str) -> Result<(Dialect, DatabaseConfig)> {
        let config = Self::from_file(path)?;
        let database = config
            .get_database_config(environment)
            .with_context(|| format!("Failed to resolve environment in {:?}", path))?;
        Ok((config.dialect, database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_file() {
        let file = write_config(
            r#"
version: "1.0"
dialect: postgresql
environments:
  development:
    host: localhost
    port: 5432
    database: app_dev
    user: app
    default_schema: app
"#,
        );

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.dialect, Dialect::PostgreSQL);
        let dev = config.get_database_config("development").unwrap();
        assert_eq!(dev.database, "app_dev");
        assert_eq!(dev.default_schema.as_deref(), Some("app"));
    }

    #[test]
    fn test_load_environment() {
        let file = write_config(
            r#"
version: "1.0"
dialect: sqlite
environments:
  test:
    database: ":memory:"
"#,
        );

        let (dialect, database) = ConfigLoader::load_environment(file.path(), "test").unwrap();
        assert_eq!(dialect, Dialect::SQLite);
        assert_eq!(database.database, ":memory:");

        let err = ConfigLoader::load_environment(file.path(), "production").unwrap_err();
        assert!(format!("{:#}", err).contains("production"));
    }

    #[test]
    fn test_load_default_from_directory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(".strata.yaml"),
            "version: \"1.0\"\ndialect: mysql\nenvironments:\n  development:\n    database: app\n",
        )
        .unwrap();

        let config = ConfigLoader::load_default(temp_dir.path()).unwrap();
        assert_eq!(config.dialect, Dialect::MySQL);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::from_file(Path::new("/nonexistent/.strata.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_yaml() {
        let file = write_config("version: [unclosed");
        let err = ConfigLoader::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
