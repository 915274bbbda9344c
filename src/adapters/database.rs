// データベース接続アダプター
//
// SQLxのAnyPoolを使用したデータベース接続の管理を行います。
// PostgreSQL、MySQL、SQLiteに対応した統一されたインターフェースを提供します。

use crate::adapters::connection_string;
use crate::core::config::{DatabaseConfig, Dialect};
use crate::core::error::MigrationEngineError;
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static INSTALL_DRIVERS: Once = Once::new();

/// AnyPool用のドライバを登録（プロセス内で1回のみ）
pub fn install_drivers() {
    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// データベース接続サービス
///
/// データベース接続プールの初期化を行います。
#[derive(Debug, Clone, Default)]
pub struct DatabaseConnectionService;

impl DatabaseConnectionService {
    /// 新しいDatabaseConnectionServiceを作成
    pub fn new() -> Self {
        Self
    }

    /// データベース接続プールを作成
    pub async fn create_pool(
        &self,
        dialect: Dialect,
        config: &DatabaseConfig,
    ) -> Result<AnyPool, MigrationEngineError> {
        let url = connection_string::build_connection_string(dialect, config);
        self.connect(dialect, &url, self.create_pool_options_from_config(dialect, config))
            .await
    }

    /// 接続URLから直接プールを作成
    ///
    /// SQLiteのインメモリデータベースは接続ごとに別のデータベースになるため、
    /// 接続数を1に固定します。
    pub async fn create_pool_from_url(&self, url: &str) -> Result<AnyPool, MigrationEngineError> {
        let dialect = Dialect::from_url(url).ok_or_else(|| MigrationEngineError::Connection {
            message: "Unsupported connection URL scheme".to_string(),
            cause: url.split(':').next().unwrap_or_default().to_string(),
        })?;
        let config = DatabaseConfig {
            database: url.to_string(),
            ..Default::default()
        };
        let mut options = self.create_pool_options_from_config(dialect, &config);
        if url.contains(":memory:") || url.contains("mode=memory") {
            options = in_memory_options(options);
        }
        self.connect(dialect, url, options).await
    }

    async fn connect(
        &self,
        dialect: Dialect,
        url: &str,
        options: PoolOptions<Any>,
    ) -> Result<AnyPool, MigrationEngineError> {
        install_drivers();
        debug!(dialect = %dialect, "Connecting to database");

        options
            .connect(url)
            .await
            .map_err(|e| MigrationEngineError::Connection {
                message: format!("Failed to create database connection pool: {}", dialect),
                cause: e.to_string(),
            })
    }

    /// 接続テストを実行
    pub async fn test_connection(&self, pool: &AnyPool) -> Result<(), MigrationEngineError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(|e| MigrationEngineError::Connection {
                message: "Database connection test failed".to_string(),
                cause: e.to_string(),
            })
    }

    /// DatabaseConfigからプールオプションを作成
    ///
    /// 未設定の場合はデフォルト値（max_connections=5, timeout=30秒）を使用します。
    /// SQLiteのインメモリデータベースは接続数1に固定します。
    pub fn create_pool_options_from_config(
        &self,
        dialect: Dialect,
        config: &DatabaseConfig,
    ) -> PoolOptions<Any> {
        let timeout = config.timeout.unwrap_or(30);
        let opts = PoolOptions::new().acquire_timeout(Duration::from_secs(timeout));

        if dialect == Dialect::SQLite && config.database == ":memory:" {
            return in_memory_options(opts);
        }

        let max_conn = config.max_connections.unwrap_or(5);
        let opts = opts.max_connections(max_conn);
        match config.min_connections {
            Some(min_conn) => opts.min_connections(min_conn.min(max_conn)),
            None => opts,
        }
    }
}

/// インメモリデータベース用のプールオプション
///
/// 接続が閉じるとデータベースも消えるため、接続は1本のみで破棄しない。
fn in_memory_options(options: PoolOptions<Any>) -> PoolOptions<Any> {
    options
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}
