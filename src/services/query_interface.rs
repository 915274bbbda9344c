// クエリインターフェース
//
// 稼働中のデータベースに対してカラム単位のスキーマ変更を行うエンジン本体。
// 呼び出しのたびにカタログを読み直し、観測状態から要求された変更だけを適用します。

use crate::adapters::catalog_reader::{create_catalog_reader, CatalogReader};
use crate::adapters::database::DatabaseConnectionService;
use crate::adapters::sql_generator::sqlite_table_recreator::{RebuildPlan, SqliteTableRecreator};
use crate::adapters::sql_generator::{
    create_generator, validate_definition, ColumnAlteration, DialectCapabilities, SqlGenerator,
};
use crate::core::config::{DatabaseConfig, Dialect};
use crate::core::error::MigrationEngineError;
use crate::core::schema::{
    ColumnChange, ColumnDefinition, ForeignKeyReference, TableIdentifier,
};
use crate::core::snapshot::{TableDescription, TableLayout, TableSnapshot};
use crate::services::operation_plan::{Operation, OperationPlan, PlanStepError};
use crate::services::table_rebuild;
use sqlx::AnyPool;
use tracing::{debug, info, warn};

/// 実行する変更
#[derive(Debug)]
enum PlannedChange {
    /// 何もしない
    Nothing,
    /// DDL文を順に実行
    Statements(Vec<String>),
    /// テーブルを再構築
    Rebuild(RebuildPlan),
}

/// クエリインターフェース
///
/// 方言ごとのSQLジェネレーターとカタログリーダーを束ね、
/// changeColumn / addColumn / renameColumn などの操作を提供します。
pub struct QueryInterface {
    pool: AnyPool,
    dialect: Dialect,
    generator: Box<dyn SqlGenerator>,
    catalog: Box<dyn CatalogReader>,
    recreator: SqliteTableRecreator,
    default_schema: Option<String>,
}

impl std::fmt::Debug for QueryInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryInterface")
            .field("dialect", &self.dialect)
            .field("default_schema", &self.default_schema)
            .finish_non_exhaustive()
    }
}

impl QueryInterface {
    /// 既存のプールからQueryInterfaceを作成
    pub fn new(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            pool,
            dialect,
            generator: create_generator(dialect),
            catalog: create_catalog_reader(dialect),
            recreator: SqliteTableRecreator::new(),
            default_schema: None,
        }
    }

    /// スキーマ省略時に使うスキーマを設定
    ///
    /// スキーマを持たない方言（SQLite）では無視されます。
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// 接続URLから作成（例: `sqlite::memory:`, `postgres://...`）
    pub async fn connect(url: &str) -> Result<Self, MigrationEngineError> {
        let dialect = Dialect::from_url(url).ok_or_else(|| MigrationEngineError::Connection {
            message: "Unsupported connection URL scheme".to_string(),
            cause: url.split(':').next().unwrap_or_default().to_string(),
        })?;
        let pool = DatabaseConnectionService::new()
            .create_pool_from_url(url)
            .await?;
        Ok(Self::new(pool, dialect))
    }

    /// 接続設定から作成
    pub async fn from_config(
        dialect: Dialect,
        config: &DatabaseConfig,
    ) -> Result<Self, MigrationEngineError> {
        let pool = DatabaseConnectionService::new()
            .create_pool(dialect, config)
            .await?;
        let query_interface = Self::new(pool, dialect);
        Ok(match &config.default_schema {
            Some(schema) => query_interface.with_default_schema(schema.clone()),
            None => query_interface,
        })
    }

    /// 接続プール
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// 方言
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// 方言の能力
    pub fn capabilities(&self) -> DialectCapabilities {
        self.generator.capabilities()
    }

    /// カラムを変更
    ///
    /// `change` に含まれるプロパティだけを変更し、それ以外は観測状態を維持します。
    pub async fn change_column(
        &self,
        table: impl Into<TableIdentifier>,
        column: &str,
        change: impl Into<ColumnChange>,
    ) -> Result<(), MigrationEngineError> {
        let table = self.resolve_table(table);
        let change = change.into();
        info!(table = %table, column = column, "Changing column");

        change.validate(&table, column)?;
        let snapshot = self.load_snapshot(&table).await?;

        let planned = if self.capabilities().native_alter_column {
            PlannedChange::Statements(self.plan_native_change(&snapshot, column, &change)?)
        } else {
            self.plan_rebuild_change(&snapshot, &[(column, &change)])?
        };
        self.execute(planned).await
    }

    /// 複数のカラムを変更
    ///
    /// 順に change_column を呼ぶのと同じ結果になります。
    /// DDLを実行する前に、すべてのカラムの存在と要求の整合性を検証します。
    pub async fn change_columns<S: AsRef<str>>(
        &self,
        table: impl Into<TableIdentifier>,
        changes: &[(S, ColumnChange)],
    ) -> Result<(), MigrationEngineError> {
        let table = self.resolve_table(table);
        info!(table = %table, count = changes.len(), "Changing columns");

        let mut snapshot = self.load_snapshot(&table).await?;
        for (column, change) in changes {
            let column = column.as_ref();
            change.validate(&table, column)?;
            if snapshot.column(column).is_none() {
                return Err(column_not_found(&snapshot.table, column));
            }
        }

        if !self.capabilities().native_alter_column {
            let requests: Vec<(&str, &ColumnChange)> = changes
                .iter()
                .map(|(column, change)| (column.as_ref(), change))
                .collect();
            let planned = self.plan_rebuild_change(&snapshot, &requests)?;
            return self.execute(planned).await;
        }

        for (index, (column, change)) in changes.iter().enumerate() {
            if index > 0 {
                snapshot = self.load_snapshot(&table).await?;
            }
            let statements = self.plan_native_change(&snapshot, column.as_ref(), change)?;
            self.execute(PlannedChange::Statements(statements)).await?;
        }
        Ok(())
    }

    /// カラムを追加
    pub async fn add_column(
        &self,
        table: impl Into<TableIdentifier>,
        column: &str,
        definition: ColumnDefinition,
    ) -> Result<(), MigrationEngineError> {
        let table = self.resolve_table(table);
        info!(table = %table, column = column, "Adding column");

        validate_definition(&table, column, &definition)?;
        let snapshot = self.load_snapshot(&table).await?;
        if snapshot.column(column).is_some() {
            return Err(MigrationEngineError::InvalidDefinition {
                message: format!("column '{}' already exists in '{}'", column, snapshot.table),
            });
        }
        if definition.primary_key && !snapshot.primary_key_columns.is_empty() {
            return Err(MigrationEngineError::conflict(
                snapshot.table.to_string(),
                column,
                format!(
                    "table already has a primary key on ({})",
                    snapshot.primary_key_columns.join(", ")
                ),
            ));
        }

        let planned = if self.generator.add_column_requires_rebuild(&definition) {
            debug!(table = %snapshot.table, column = column, "ADD COLUMN cannot express the definition, rebuilding");
            let layout = snapshot.to_layout_with(&[(column.to_string(), definition)]);
            PlannedChange::Rebuild(self.recreator.plan(&snapshot, &layout)?)
        } else {
            PlannedChange::Statements(self.generator.generate_add_column(
                &snapshot.table,
                column,
                &definition,
            )?)
        };
        self.execute(planned).await
    }

    /// カラムをリネーム
    ///
    /// 制約と外部キーはカラムに追従します。
    pub async fn rename_column(
        &self,
        table: impl Into<TableIdentifier>,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), MigrationEngineError> {
        let table = self.resolve_table(table);
        info!(table = %table, from = old_name, to = new_name, "Renaming column");

        let snapshot = self.load_snapshot(&table).await?;
        if snapshot.column(old_name).is_none() {
            return Err(column_not_found(&snapshot.table, old_name));
        }
        if old_name == new_name {
            return Ok(());
        }
        if snapshot.column(new_name).is_some() {
            return Err(MigrationEngineError::InvalidDefinition {
                message: format!("column '{}' already exists in '{}'", new_name, snapshot.table),
            });
        }

        let statements = self
            .generator
            .generate_rename_column(&snapshot.table, old_name, new_name);
        self.execute(PlannedChange::Statements(statements)).await
    }

    /// テーブルのカラム一覧を取得
    ///
    /// 呼び出しのたびにカタログを読み直します。
    pub async fn describe_table(
        &self,
        table: impl Into<TableIdentifier>,
    ) -> Result<TableDescription, MigrationEngineError> {
        let table = self.resolve_table(table);
        debug!(table = %table, "Describing table");
        Ok(self.load_snapshot(&table).await?.describe())
    }

    /// テーブルの外部キー参照を取得
    ///
    /// テーブルが存在しない場合は空のベクターを返します。
    pub async fn get_foreign_key_references_for_table(
        &self,
        table: impl Into<TableIdentifier>,
    ) -> Result<Vec<ForeignKeyReference>, MigrationEngineError> {
        let table = self.resolve_table(table);
        debug!(table = %table, "Reading foreign key references");
        let snapshot = self.catalog.read_table(&self.pool, &table).await?;
        Ok(snapshot.foreign_key_references())
    }

    /// テーブルを作成
    pub async fn create_table<S: AsRef<str>>(
        &self,
        table: impl Into<TableIdentifier>,
        columns: &[(S, ColumnDefinition)],
    ) -> Result<(), MigrationEngineError> {
        let table = self.resolve_table(table);
        info!(table = %table, columns = columns.len(), "Creating table");

        if columns.is_empty() {
            return Err(MigrationEngineError::InvalidDefinition {
                message: format!("table '{}' needs at least one column", table),
            });
        }

        let layout = TableLayout::from_definitions(
            table,
            columns
                .iter()
                .map(|(name, definition)| (name.as_ref().to_string(), definition.clone()))
                .collect(),
        );
        let statements = self.generator.generate_create_table(&layout)?;
        self.execute(PlannedChange::Statements(statements)).await
    }

    /// スキーマを作成（存在する場合は何もしない）
    pub async fn create_schema(&self, schema: &str) -> Result<(), MigrationEngineError> {
        info!(schema = schema, "Creating schema");
        let statements = self.generator.generate_create_schema(schema);
        if statements.is_empty() {
            debug!(dialect = %self.dialect, "Schemas are not supported, nothing to do");
            return Ok(());
        }
        self.execute(PlannedChange::Statements(statements)).await
    }

    /// 操作計画を先頭から順に適用
    ///
    /// 最初に失敗した操作で停止し、その位置を返します。成功時は適用した操作数を返します。
    pub async fn apply_plan(&self, plan: &OperationPlan) -> Result<usize, PlanStepError> {
        for (index, operation) in plan.operations.iter().enumerate() {
            let step = index + 1;
            info!(step = step, operation = operation.name(), "Applying plan step");
            self.apply_operation(operation)
                .await
                .map_err(|source| PlanStepError {
                    step,
                    operation: operation.name(),
                    source,
                })?;
        }
        Ok(plan.operations.len())
    }

    async fn apply_operation(&self, operation: &Operation) -> Result<(), MigrationEngineError> {
        match operation {
            Operation::CreateSchema { name } => self.create_schema(name).await,
            Operation::CreateTable { table, columns } => {
                let columns: Vec<(&str, ColumnDefinition)> = columns
                    .iter()
                    .map(|c| (c.name.as_str(), c.definition.clone()))
                    .collect();
                self.create_table(TableIdentifier::from(table), &columns).await
            }
            Operation::AddColumn {
                table,
                column,
                definition,
            } => {
                self.add_column(TableIdentifier::from(table), column, definition.clone())
                    .await
            }
            Operation::ChangeColumn {
                table,
                column,
                change,
            } => {
                self.change_column(TableIdentifier::from(table), column, change.clone())
                    .await
            }
            Operation::ChangeColumns { table, changes } => {
                let changes: Vec<(&str, ColumnChange)> = changes
                    .iter()
                    .map(|c| (c.column.as_str(), c.change.clone()))
                    .collect();
                self.change_columns(TableIdentifier::from(table), &changes)
                    .await
            }
            Operation::RenameColumn { table, from, to } => {
                self.rename_column(TableIdentifier::from(table), from, to)
                    .await
            }
        }
    }

    /// スキーマ省略時のデフォルトスキーマを補完
    fn resolve_table(&self, table: impl Into<TableIdentifier>) -> TableIdentifier {
        let table = table.into();
        if self.capabilities().supports_schemas {
            table.or_schema(self.default_schema.as_deref())
        } else {
            table
        }
    }

    /// 観測状態を読み取る（テーブルがなければ TableNotFound）
    async fn load_snapshot(&self, table: &TableIdentifier) -> Result<TableSnapshot, MigrationEngineError> {
        let snapshot = self.catalog.read_table(&self.pool, table).await?;
        if !snapshot.exists() {
            return Err(MigrationEngineError::TableNotFound {
                table: table.to_string(),
            });
        }
        Ok(snapshot)
    }

    /// ネイティブのALTER文で変更する方言の変更計画
    fn plan_native_change(
        &self,
        snapshot: &TableSnapshot,
        column: &str,
        change: &ColumnChange,
    ) -> Result<Vec<String>, MigrationEngineError> {
        let current = snapshot
            .to_definition(column)
            .ok_or_else(|| column_not_found(&snapshot.table, column))?;
        let target = change.apply_to(&current);

        let alteration = ColumnAlteration {
            snapshot,
            column,
            current: &current,
            target: &target,
            change,
        };
        self.generator.generate_change_column(&alteration)
    }

    /// テーブル再構築で変更する方言の変更計画
    ///
    /// 同じカラムへの複数の要求は、前の要求の結果に順に適用します。
    fn plan_rebuild_change(
        &self,
        snapshot: &TableSnapshot,
        requests: &[(&str, &ColumnChange)],
    ) -> Result<PlannedChange, MigrationEngineError> {
        let mut overrides: Vec<(String, ColumnDefinition)> = Vec::new();

        for &(column, change) in requests {
            let observed = snapshot
                .to_definition(column)
                .ok_or_else(|| column_not_found(&snapshot.table, column))?;
            let current = overrides
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, definition)| definition.clone())
                .unwrap_or_else(|| observed.clone());
            let target = change.apply_to(&current);

            let alteration = ColumnAlteration {
                snapshot,
                column,
                current: &current,
                target: &target,
                change,
            };
            self.check_rebuild_alteration(&alteration, &observed)?;

            match overrides.iter_mut().find(|(name, _)| name == column) {
                Some((_, definition)) => *definition = target,
                None => overrides.push((column.to_string(), target)),
            }
        }

        // 観測状態と同じ定義なら再構築しない
        let unchanged = overrides
            .iter()
            .all(|(name, definition)| snapshot.to_definition(name).as_ref() == Some(definition));
        if unchanged {
            debug!(table = %snapshot.table, "Requested state equals the observed state");
            return Ok(PlannedChange::Nothing);
        }

        let layout = snapshot.to_layout_with(&overrides);
        Ok(PlannedChange::Rebuild(self.recreator.plan(snapshot, &layout)?))
    }

    /// 再構築でも表現できない変更を検出
    fn check_rebuild_alteration(
        &self,
        alteration: &ColumnAlteration<'_>,
        observed: &ColumnDefinition,
    ) -> Result<(), MigrationEngineError> {
        let table = alteration.snapshot.table.to_string();

        if alteration.changes_references() && alteration.target.references != observed.references {
            return Err(MigrationEngineError::unsupported(
                self.dialect,
                format!(
                    "cannot change the foreign key of '{}.{}' in place",
                    table, alteration.column
                ),
            ));
        }

        if alteration.target.data_type.enum_values().is_some()
            && alteration.snapshot.has_foreign_key_on(alteration.column)
        {
            return Err(MigrationEngineError::conflict(
                table,
                alteration.column,
                "cannot change a foreign key column to an ENUM type",
            ));
        }

        alteration.check_primary_key_conflict()?;

        if alteration.target.auto_increment && !alteration.target.primary_key {
            return Err(MigrationEngineError::unsupported(
                self.dialect,
                format!(
                    "AUTOINCREMENT on '{}.{}' requires an INTEGER PRIMARY KEY",
                    table, alteration.column
                ),
            ));
        }

        Ok(())
    }

    /// 変更を実行
    async fn execute(&self, planned: PlannedChange) -> Result<(), MigrationEngineError> {
        match planned {
            PlannedChange::Nothing => Ok(()),
            PlannedChange::Statements(statements) => self.execute_statements(&statements).await,
            PlannedChange::Rebuild(plan) => {
                info!(table = %plan.table, "Rebuilding table");
                table_rebuild::execute_rebuild(&self.pool, &plan).await
            }
        }
    }

    /// DDL文を実行
    ///
    /// トランザクショナルDDLを持つ方言は1つのトランザクションで実行します。
    /// MySQLでは失敗した文より前の文は適用されたまま残ります。
    async fn execute_statements(&self, statements: &[String]) -> Result<(), MigrationEngineError> {
        if statements.is_empty() {
            return Ok(());
        }

        if self.capabilities().transactional_ddl {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| MigrationEngineError::execution("BEGIN", e))?;
            for statement in statements {
                debug!(sql = %statement, "Executing DDL");
                if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                    let _ = tx.rollback().await;
                    return Err(MigrationEngineError::execution(statement, e));
                }
            }
            return tx
                .commit()
                .await
                .map_err(|e| MigrationEngineError::execution("COMMIT", e));
        }

        let total = statements.len();
        for (index, statement) in statements.iter().enumerate() {
            debug!(sql = %statement, "Executing DDL");
            if let Err(e) = sqlx::query(statement).execute(&self.pool).await {
                warn!(
                    applied = index,
                    total = total,
                    sql = %statement,
                    "DDL failed, earlier statements remain applied"
                );
                return Err(MigrationEngineError::execution(statement, e));
            }
        }
        Ok(())
    }
}

fn column_not_found(table: &TableIdentifier, column: &str) -> MigrationEngineError {
    MigrationEngineError::ColumnNotFound {
        table: table.to_string(),
        column: column.to_string(),
    }
}
