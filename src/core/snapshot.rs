// テーブルスナップショット
//
// カタログから読み取ったテーブルの観測状態と、そこから導出される
// describeTable の結果・再宣言用のカラム定義・SQLite再構築用のレイアウトを表現します。

use crate::core::schema::{
    ColumnDefinition, ColumnDescription, DataType, DefaultValue, ForeignKeyReference,
    ForeignKeyTarget, ReferentialAction, TableIdentifier,
};
use std::ops::Index;

/// 観測されたカラム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedColumn {
    /// カラム名
    pub name: String,

    /// describeTable が返す型名（大文字）
    pub described_type: String,

    /// 再宣言に使う型のSQL表現（カタログの表記そのまま）
    pub type_sql: String,

    /// 列挙型のラベル一覧
    pub enum_values: Vec<String>,

    /// PostgreSQLの列挙型名（スキーマなし）
    pub enum_type_name: Option<String>,

    /// NULL許可フラグ
    pub allow_null: bool,

    /// デフォルト値のSQL表現（再宣言用）
    pub default_sql: Option<String>,

    /// 正規化済みのデフォルト値（表示用）
    pub default_display: Option<String>,

    /// プライマリキーフラグ
    pub primary_key: bool,

    /// 自動増分フラグ
    pub auto_increment: bool,

    /// カラムコメント
    pub comment: Option<String>,

    /// 更新時に設定される値（MySQLの ON UPDATE 句、例: "CURRENT_TIMESTAMP"）
    pub on_update: Option<String>,
}

impl ObservedColumn {
    /// 最小限の情報で作成（残りはカタログリーダーが埋める）
    pub fn new(name: impl Into<String>, type_sql: impl Into<String>) -> Self {
        let type_sql = type_sql.into();
        Self {
            name: name.into(),
            described_type: type_sql.to_uppercase(),
            type_sql,
            enum_values: Vec::new(),
            enum_type_name: None,
            allow_null: true,
            default_sql: None,
            default_display: None,
            primary_key: false,
            auto_increment: false,
            comment: None,
            on_update: None,
        }
    }

    /// 列挙型かどうか
    pub fn is_enum(&self) -> bool {
        !self.enum_values.is_empty() || self.enum_type_name.is_some()
    }

    /// 観測された型を DataType として返す
    pub fn data_type(&self) -> DataType {
        if !self.enum_values.is_empty() {
            DataType::Enum {
                values: self.enum_values.clone(),
            }
        } else {
            DataType::Raw {
                sql: self.type_sql.clone(),
            }
        }
    }
}

/// ユニーク制約（またはユニークインデックス）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// 制約名またはインデックス名
    pub name: String,

    /// 対象カラム（定義順）
    pub columns: Vec<String>,

    /// 制約として定義されているか（falseの場合はCREATE UNIQUE INDEXによるもの）
    pub is_constraint: bool,

    /// インデックスの作成SQL（SQLiteでインデックスとして定義されている場合）
    pub sql: Option<String>,
}

/// セカンダリインデックス（非ユニーク）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// インデックス名
    pub name: String,

    /// 対象カラム
    pub columns: Vec<String>,

    /// 作成SQL（SQLiteのsqlite_masterに保存されたもの）
    pub sql: Option<String>,
}

/// 外部キー制約
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// 制約名
    pub name: String,

    /// 参照元カラム
    pub columns: Vec<String>,

    /// 参照先スキーマ
    pub referenced_schema: Option<String>,

    /// 参照先テーブル
    pub referenced_table: String,

    /// 参照先カラム
    pub referenced_columns: Vec<String>,

    /// ON UPDATEアクション
    pub on_update: Option<ReferentialAction>,

    /// ON DELETEアクション
    pub on_delete: Option<ReferentialAction>,
}

impl ForeignKey {
    /// 単一カラムの外部キーかどうか
    pub fn is_single_column(&self) -> bool {
        self.columns.len() == 1 && self.referenced_columns.len() == 1
    }

    /// 単一カラム外部キーの参照先を ForeignKeyTarget として返す
    pub fn target(&self) -> Option<ForeignKeyTarget> {
        if !self.is_single_column() {
            return None;
        }
        Some(ForeignKeyTarget {
            table: self.referenced_table.clone(),
            schema: self.referenced_schema.clone(),
            column: self.referenced_columns[0].clone(),
            on_delete: self.on_delete,
            on_update: self.on_update,
        })
    }
}

/// テーブルスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// 解決済みのテーブル識別子
    pub table: TableIdentifier,

    /// カラム（カタログの定義順）
    pub columns: Vec<ObservedColumn>,

    /// プライマリキー制約名
    pub primary_key_name: Option<String>,

    /// プライマリキーを構成するカラム（定義順）
    pub primary_key_columns: Vec<String>,

    /// ユニーク制約
    pub unique_constraints: Vec<UniqueConstraint>,

    /// 非ユニークのセカンダリインデックス
    pub indexes: Vec<IndexInfo>,

    /// 外部キー制約
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSnapshot {
    /// 空のスナップショットを作成
    pub fn new(table: TableIdentifier) -> Self {
        Self {
            table,
            columns: Vec::new(),
            primary_key_name: None,
            primary_key_columns: Vec::new(),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// テーブルが存在するか（カラムが1つ以上あるか）
    pub fn exists(&self) -> bool {
        !self.columns.is_empty()
    }

    /// カラムを名前で検索
    pub fn column(&self, name: &str) -> Option<&ObservedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// 指定カラムのみを対象とするユニーク制約
    pub fn single_column_unique(&self, column: &str) -> Option<&UniqueConstraint> {
        self.unique_constraints
            .iter()
            .find(|u| u.columns.len() == 1 && u.columns[0] == column)
    }

    /// 指定カラムに単一カラムのユニーク制約があるか
    pub fn is_unique(&self, column: &str) -> bool {
        self.single_column_unique(column).is_some()
    }

    /// 指定カラムを参照元とする単一カラムの外部キー
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.columns.len() == 1 && fk.columns[0] == column)
    }

    /// 指定カラムがいずれかの外部キーに含まれるか
    pub fn has_foreign_key_on(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.columns.iter().any(|c| c == column))
    }

    /// 単一カラムのプライマリキーかどうか
    pub fn has_single_primary_key(&self) -> bool {
        self.primary_key_columns.len() == 1
    }

    /// 観測状態を完全なカラム定義に変換
    ///
    /// 既存値はカタログの表記のまま再宣言できるよう Raw 型と SQL式デフォルトで表現します。
    pub fn to_definition(&self, name: &str) -> Option<ColumnDefinition> {
        let column = self.column(name)?;
        Some(ColumnDefinition {
            data_type: column.data_type(),
            allow_null: column.allow_null,
            default_value: column.default_sql.clone().map(DefaultValue::expression),
            primary_key: column.primary_key,
            auto_increment: column.auto_increment,
            unique: self.is_unique(name),
            comment: column.comment.clone(),
            references: self.foreign_key_for(name).and_then(ForeignKey::target),
        })
    }

    /// describeTable の結果に変換
    pub fn describe(&self) -> TableDescription {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ColumnDescription {
                        data_type: c.described_type.clone(),
                        allow_null: c.allow_null,
                        default_value: c.default_display.clone(),
                        primary_key: c.primary_key,
                        auto_increment: c.auto_increment,
                        comment: c.comment.clone(),
                        unique: self.is_unique(&c.name),
                        special: c.enum_values.clone(),
                    },
                )
            })
            .collect();

        TableDescription { columns }
    }

    /// 外部キーをカラム単位の参照情報に展開
    pub fn foreign_key_references(&self) -> Vec<ForeignKeyReference> {
        self.foreign_keys
            .iter()
            .flat_map(|fk| {
                fk.columns
                    .iter()
                    .zip(fk.referenced_columns.iter())
                    .map(move |(column, referenced_column)| ForeignKeyReference {
                        constraint_name: fk.name.clone(),
                        table_schema: self.table.schema.clone(),
                        table_name: self.table.table_name.clone(),
                        column_name: column.clone(),
                        referenced_table_schema: fk
                            .referenced_schema
                            .clone()
                            .or_else(|| self.table.schema.clone()),
                        referenced_table_name: fk.referenced_table.clone(),
                        referenced_column_name: referenced_column.clone(),
                        on_update: fk.on_update,
                        on_delete: fk.on_delete,
                    })
            })
            .collect()
    }

    /// 現在の状態をそのまま表すレイアウトを作成
    pub fn to_layout(&self) -> TableLayout {
        self.to_layout_with(&[])
    }

    /// 一部のカラムを目標定義に置き換えたレイアウトを作成
    ///
    /// `overrides` に含まれないカラムは観測状態を引き継ぎます。
    /// 複数カラムにまたがる制約と非ユニークインデックスは、全カラムが残る場合のみ維持されます。
    pub fn to_layout_with(&self, overrides: &[(String, ColumnDefinition)]) -> TableLayout {
        let mut layout = TableLayout::new(self.table.clone());

        for column in &self.columns {
            let definition = overrides
                .iter()
                .find(|(name, _)| *name == column.name)
                .map(|(_, definition)| definition.clone())
                .or_else(|| self.to_definition(&column.name));
            if let Some(definition) = definition {
                layout.columns.push((column.name.clone(), definition));
            }
        }

        // 追加カラム（スナップショットに存在しないもの）は末尾に追加
        for (name, definition) in overrides {
            if self.column(name).is_none() {
                layout.columns.push((name.clone(), definition.clone()));
            }
        }

        layout.resolve_primary_key();

        for unique in &self.unique_constraints {
            if unique.columns.len() == 1 {
                // インデックスとして定義された単一カラムのユニークは、インライン制約ではなく再作成で維持
                let column = &unique.columns[0];
                if let (false, Some(sql)) = (unique.is_constraint, &unique.sql) {
                    if let Some((_, definition)) =
                        layout.columns.iter_mut().find(|(name, _)| name == column)
                    {
                        if definition.unique {
                            definition.unique = false;
                            layout.index_statements.push(sql.clone());
                        }
                    }
                }
            } else if unique
                .columns
                .iter()
                .all(|c| layout.has_column(c))
            {
                match (&unique.sql, unique.is_constraint) {
                    (Some(sql), false) => layout.index_statements.push(sql.clone()),
                    _ => layout.composite_uniques.push(unique.columns.clone()),
                }
            }
        }

        for fk in &self.foreign_keys {
            if !fk.is_single_column() && fk.columns.iter().all(|c| layout.has_column(c)) {
                layout.composite_foreign_keys.push(fk.clone());
            }
        }

        for index in &self.indexes {
            if let Some(sql) = &index.sql {
                if index.columns.iter().all(|c| layout.has_column(c)) {
                    layout.index_statements.push(sql.clone());
                }
            }
        }

        layout
    }
}

/// テーブルレイアウト
///
/// CREATE TABLE を生成するための完全なテーブル定義。
/// 単一カラムの制約はカラム定義に、複数カラムの制約はテーブルレベルに保持します。
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    /// テーブル識別子
    pub table: TableIdentifier,

    /// カラム定義（定義順）
    pub columns: Vec<(String, ColumnDefinition)>,

    /// テーブルレベルのプライマリキー（複数カラムの場合のみ）
    pub composite_primary_key: Vec<String>,

    /// 複数カラムのユニーク制約
    pub composite_uniques: Vec<Vec<String>>,

    /// 複数カラムの外部キー
    pub composite_foreign_keys: Vec<ForeignKey>,

    /// テーブル作成後に実行するインデックス作成SQL
    pub index_statements: Vec<String>,
}

impl TableLayout {
    /// 空のレイアウトを作成
    pub fn new(table: TableIdentifier) -> Self {
        Self {
            table,
            columns: Vec::new(),
            composite_primary_key: Vec::new(),
            composite_uniques: Vec::new(),
            composite_foreign_keys: Vec::new(),
            index_statements: Vec::new(),
        }
    }

    /// カラム定義の一覧からレイアウトを作成
    pub fn from_definitions(table: TableIdentifier, columns: Vec<(String, ColumnDefinition)>) -> Self {
        let mut layout = Self::new(table);
        layout.columns = columns;
        layout.resolve_primary_key();
        layout
    }

    /// カラムが存在するか
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// カラム名一覧
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// プライマリキーを構成するカラム名
    pub fn primary_key_columns(&self) -> Vec<&str> {
        if !self.composite_primary_key.is_empty() {
            return self.composite_primary_key.iter().map(String::as_str).collect();
        }
        self.columns
            .iter()
            .filter(|(_, d)| d.primary_key)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// 複数カラムが primary_key を持つ場合はテーブルレベルの複合キーに移す
    fn resolve_primary_key(&mut self) {
        let pk_columns: Vec<String> = self
            .columns
            .iter()
            .filter(|(_, d)| d.primary_key)
            .map(|(n, _)| n.clone())
            .collect();

        if pk_columns.len() > 1 {
            for (_, definition) in self.columns.iter_mut() {
                definition.primary_key = false;
            }
            self.composite_primary_key = pk_columns;
        }
    }
}

/// describeTable の結果
///
/// カラム名から観測状態への対応。カタログの定義順を保持します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    columns: Vec<(String, ColumnDescription)>,
}

impl TableDescription {
    /// カラムの観測状態を取得
    pub fn get(&self, column: &str) -> Option<&ColumnDescription> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, d)| d)
    }

    /// カラムが存在するか
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// カラム名一覧（定義順）
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// カラム数
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// カラムが1つもないか
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// (カラム名, 観測状態) のイテレータ
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnDescription)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d))
    }
}

/// カラム名で観測状態を参照する
///
/// # Panics
///
/// カラムが存在しない場合はパニックします。存在が不確かな場合は
/// [`TableDescription::get`] を使用してください。
impl Index<&str> for TableDescription {
    type Output = ColumnDescription;

    fn index(&self, column: &str) -> &Self::Output {
        match self.get(column) {
            Some(description) => description,
            None => panic!("column '{}' is not part of the table description", column),
        }
    }
}
