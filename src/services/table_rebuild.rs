// SQLiteテーブル再構築の実行
//
// RebuildPlan を1つの接続・1つのトランザクション上で順に実行します。
// 外部キー検査はコミット前に行い、違反があればロールバックします。

use crate::adapters::sql_generator::sqlite_table_recreator::RebuildPlan;
use crate::core::error::MigrationEngineError;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, AnyPool, Connection, Row};
use tracing::{debug, warn};

/// 再構築の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    /// 一時テーブルを作成
    CreateShadow,
    /// 行をコピー
    CopyRows,
    /// 旧テーブルを削除
    DropOriginal,
    /// 一時テーブルを元の名前にリネーム
    RenameShadow,
    /// インデックスを再作成
    RecreateIndexes,
    /// 外部キー整合性を検査
    ForeignKeyCheck,
    /// コミット
    Commit,
}

impl RebuildPhase {
    /// 最初の段階
    pub const FIRST: RebuildPhase = RebuildPhase::CreateShadow;

    /// 次の段階（コミットの後は `None`）
    pub fn next(self) -> Option<RebuildPhase> {
        match self {
            RebuildPhase::CreateShadow => Some(RebuildPhase::CopyRows),
            RebuildPhase::CopyRows => Some(RebuildPhase::DropOriginal),
            RebuildPhase::DropOriginal => Some(RebuildPhase::RenameShadow),
            RebuildPhase::RenameShadow => Some(RebuildPhase::RecreateIndexes),
            RebuildPhase::RecreateIndexes => Some(RebuildPhase::ForeignKeyCheck),
            RebuildPhase::ForeignKeyCheck => Some(RebuildPhase::Commit),
            RebuildPhase::Commit => None,
        }
    }

    /// この段階で実行するDDL
    pub fn statements<'a>(&self, plan: &'a RebuildPlan) -> Vec<&'a str> {
        match self {
            RebuildPhase::CreateShadow => plan.create_shadow.iter().map(String::as_str).collect(),
            RebuildPhase::CopyRows => vec![plan.copy_rows.as_str()],
            RebuildPhase::DropOriginal => vec![plan.drop_original.as_str()],
            RebuildPhase::RenameShadow => vec![plan.rename_shadow.as_str()],
            RebuildPhase::RecreateIndexes => {
                plan.recreate_indexes.iter().map(String::as_str).collect()
            }
            RebuildPhase::ForeignKeyCheck | RebuildPhase::Commit => Vec::new(),
        }
    }
}

/// 再構築を実行
///
/// `PRAGMA foreign_keys` はトランザクション内で切り替えられないため、
/// トランザクションの外で無効化し、終了後に元の値へ戻します。
pub async fn execute_rebuild(pool: &AnyPool, plan: &RebuildPlan) -> Result<(), MigrationEngineError> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| MigrationEngineError::Connection {
            message: "Failed to acquire a connection for table rebuild".to_string(),
            cause: e.to_string(),
        })?;

    let foreign_keys_enabled = read_foreign_keys_pragma(&mut conn).await?;
    execute_on(&mut conn, "PRAGMA foreign_keys = OFF").await?;

    let result = run_phases(&mut conn, plan).await;

    let restore = if foreign_keys_enabled {
        "PRAGMA foreign_keys = ON"
    } else {
        "PRAGMA foreign_keys = OFF"
    };
    let restored = execute_on(&mut conn, restore).await;

    result?;
    restored
}

async fn run_phases(conn: &mut AnyConnection, plan: &RebuildPlan) -> Result<(), MigrationEngineError> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| MigrationEngineError::execution("BEGIN", e))?;

    let mut phase = Some(RebuildPhase::FIRST);
    while let Some(current) = phase {
        debug!(table = %plan.table, phase = ?current, "Table rebuild phase");

        match current {
            RebuildPhase::ForeignKeyCheck => {
                let rows = sqlx::query(&plan.foreign_key_check)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(|e| MigrationEngineError::execution(&plan.foreign_key_check, e))?;
                if let Some(row) = rows.first() {
                    let parent = match violated_parent(row, &plan.foreign_key_check) {
                        Ok(parent) => parent,
                        Err(e) => {
                            let _ = tx.rollback().await;
                            return Err(e);
                        }
                    };
                    warn!(table = %plan.table, violations = rows.len(), "Foreign key check failed, rolling back");
                    // ロールバックの失敗は元のエラーを優先する
                    let _ = tx.rollback().await;
                    return Err(MigrationEngineError::conflict(
                        plan.table.to_string(),
                        parent.clone(),
                        format!(
                            "{} row(s) violate the foreign key to '{}' after rebuild",
                            rows.len(),
                            parent
                        ),
                    ));
                }
            }
            RebuildPhase::Commit => {
                tx.commit()
                    .await
                    .map_err(|e| MigrationEngineError::execution("COMMIT", e))?;
                return Ok(());
            }
            _ => {
                for statement in current.statements(plan) {
                    debug!(sql = statement, "Executing DDL");
                    if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                        let _ = tx.rollback().await;
                        return Err(MigrationEngineError::execution(statement, e));
                    }
                }
            }
        }

        phase = current.next();
    }

    Ok(())
}

/// foreign_key_check の結果行から参照先テーブル名（3列目）を取り出す
fn violated_parent(row: &AnyRow, sql: &str) -> Result<String, MigrationEngineError> {
    row.try_get::<String, _>(2)
        .map_err(|e| MigrationEngineError::execution(sql, e))
}

async fn read_foreign_keys_pragma(conn: &mut AnyConnection) -> Result<bool, MigrationEngineError> {
    let sql = "PRAGMA foreign_keys";
    let row = sqlx::query(sql)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| MigrationEngineError::execution(sql, e))?;
    match row {
        Some(row) => row
            .try_get::<i64, _>(0)
            .map(|v| v != 0)
            .map_err(|e| MigrationEngineError::execution(sql, e)),
        None => Ok(false),
    }
}

async fn execute_on(conn: &mut AnyConnection, sql: &str) -> Result<(), MigrationEngineError> {
    sqlx::query(sql)
        .execute(&mut *conn)
        .await
        .map(|_| ())
        .map_err(|e| MigrationEngineError::execution(sql, e))
}
