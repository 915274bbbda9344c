// カラム定義ドメインモデル
//
// changeColumn / addColumn / createTable に渡すカラムの「望ましい状態」と、
// describeTable が返す「観測された状態」を表現する型システム。

use crate::core::error::MigrationEngineError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// テーブル識別子
///
/// スキーマ省略時は接続のデフォルトスキーマを使用します。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    /// テーブル名
    pub table_name: String,

    /// スキーマ名（PostgreSQLのスキーマ、MySQLのデータベース）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl TableIdentifier {
    /// デフォルトスキーマのテーブルを指す識別子を作成
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
        }
    }

    /// スキーマ付きの識別子を作成
    pub fn with_schema(table_name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: Some(schema.into()),
        }
    }

    /// スキーマが未指定の場合のみデフォルトスキーマを補完
    pub fn or_schema(mut self, default_schema: Option<&str>) -> Self {
        if self.schema.is_none() {
            self.schema = default_schema.map(str::to_string);
        }
        self
    }
}

impl From<&str> for TableIdentifier {
    fn from(table_name: &str) -> Self {
        Self::new(table_name)
    }
}

impl From<String> for TableIdentifier {
    fn from(table_name: String) -> Self {
        Self::new(table_name)
    }
}

impl From<&TableIdentifier> for TableIdentifier {
    fn from(table: &TableIdentifier) -> Self {
        table.clone()
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table_name),
            None => write!(f, "{}", self.table_name),
        }
    }
}

/// カラム型
///
/// 方言に依存しない意味上のSQL型。方言ごとの型名は TypeMappingService が決定します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DataType {
    /// 2バイト整数
    SMALLINT,

    /// 4バイト整数
    INTEGER,

    /// 8バイト整数
    BIGINT,

    /// 浮動小数点数（方言のデフォルト精度）
    FLOAT,

    /// 倍精度浮動小数点数
    DOUBLE,

    /// 固定小数点数
    DECIMAL {
        /// 全体の桁数
        precision: u32,
        /// 小数点以下の桁数
        scale: u32,
    },

    /// 可変長文字列（VARCHAR）
    STRING {
        /// 最大長
        #[serde(default = "default_string_length")]
        length: u32,
    },

    /// 固定長文字列
    CHAR {
        /// 固定長
        length: u32,
    },

    /// テキスト型（長文）
    TEXT,

    /// 真偽値型
    BOOLEAN,

    /// 日付型
    DATE,

    /// 日時型
    DATETIME,

    /// UUID型
    UUID,

    /// JSON型
    JSON,

    /// バイナリラージオブジェクト型
    BLOB,

    /// 列挙型（ラベルの順序を保持）
    #[serde(rename = "ENUM")]
    Enum {
        /// ラベル一覧
        values: Vec<String>,
    },

    /// 方言でレンダリング済みの型
    ///
    /// カタログから読み取った型を再宣言する際に使用します。検証せずにそのまま出力します。
    #[serde(rename = "RAW")]
    Raw {
        /// 型のSQL表現（例: "varchar(255)", "DOUBLE PRECISION"）
        sql: String,
    },
}

fn default_string_length() -> u32 {
    255
}

impl DataType {
    /// VARCHAR(255)
    pub fn string() -> Self {
        DataType::STRING {
            length: default_string_length(),
        }
    }

    /// 指定長のVARCHAR
    pub fn string_with_length(length: u32) -> Self {
        DataType::STRING { length }
    }

    /// 指定長のCHAR
    pub fn char(length: u32) -> Self {
        DataType::CHAR { length }
    }

    /// ラベル一覧から列挙型を作成
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DataType::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// レンダリング済みの型
    pub fn raw(sql: impl Into<String>) -> Self {
        DataType::Raw { sql: sql.into() }
    }

    /// 列挙型のラベル一覧を取得
    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            DataType::Enum { values } => Some(values),
            _ => None,
        }
    }

    /// 整数型かどうか
    pub fn is_integer(&self) -> bool {
        match self {
            DataType::SMALLINT | DataType::INTEGER | DataType::BIGINT => true,
            DataType::Raw { sql } => {
                let lower = sql.to_lowercase();
                lower.contains("int") && !lower.contains("interval") && !lower.contains("point")
            }
            _ => false,
        }
    }
}

/// デフォルト値
///
/// YAML/JSONではスカラー値としてそのまま記述できます。
/// SQL式（CURRENT_TIMESTAMP等）は `{ expression: ... }` で指定します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// NULL
    Null,
    /// 真偽値
    Bool(bool),
    /// 整数
    Integer(i64),
    /// 浮動小数点数
    Float(f64),
    /// 文字列リテラル
    Text(String),
    /// SQL式（クォートせずに出力）
    Expression {
        /// SQL式
        expression: String,
    },
}

impl DefaultValue {
    /// 文字列リテラル
    pub fn text(value: impl Into<String>) -> Self {
        DefaultValue::Text(value.into())
    }

    /// SQL式
    pub fn expression(expression: impl Into<String>) -> Self {
        DefaultValue::Expression {
            expression: expression.into(),
        }
    }

    /// NULLかどうか
    pub fn is_null(&self) -> bool {
        matches!(self, DefaultValue::Null)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::Text(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::Text(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Integer(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Bool(value)
    }
}

/// 参照アクション
///
/// FOREIGN KEY制約のON DELETE / ON UPDATE句で使用するアクションを表現します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    /// 何もしない（デフォルト）
    #[default]
    NoAction,
    /// 参照先の変更に追従して削除/更新
    Cascade,
    /// 参照先の削除/更新時にNULLに設定
    SetNull,
    /// 参照先の削除/更新時にデフォルト値に設定
    SetDefault,
    /// 参照先の削除/更新を制限
    Restrict,
}

impl ReferentialAction {
    /// SQL句として出力する文字列を返す
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
        }
    }

    /// カタログ上の表記（"CASCADE", "SET NULL" 等）から変換
    pub fn from_sql(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().replace('_', " ").as_str() {
            "NO ACTION" => Some(ReferentialAction::NoAction),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            _ => None,
        }
    }
}

/// 外部キーの参照先
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    /// 参照先テーブル
    pub table: String,

    /// 参照先スキーマ（省略時は参照元と同じスキーマ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// 参照先カラム
    #[serde(default = "default_referenced_column")]
    pub column: String,

    /// 参照先レコード削除時のアクション
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,

    /// 参照先レコード更新時のアクション
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ReferentialAction>,
}

fn default_referenced_column() -> String {
    "id".to_string()
}

impl ForeignKeyTarget {
    /// 参照先テーブルとカラムを指定して作成
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            column: column.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// 参照先スキーマを指定
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// ON DELETEアクションを指定
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// ON UPDATEアクションを指定
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// カラム定義
///
/// 単一カラムの望ましい完全な状態を表現します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// カラム型
    #[serde(rename = "type")]
    pub data_type: DataType,

    /// NULL許可フラグ
    #[serde(default = "default_allow_null")]
    pub allow_null: bool,

    /// デフォルト値
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,

    /// プライマリキーフラグ
    #[serde(default)]
    pub primary_key: bool,

    /// 自動増分フラグ
    #[serde(default)]
    pub auto_increment: bool,

    /// ユニーク制約フラグ
    #[serde(default)]
    pub unique: bool,

    /// カラムコメント
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// 外部キーの参照先
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyTarget>,
}

fn default_allow_null() -> bool {
    true
}

impl ColumnDefinition {
    /// 型のみを指定したNULL許可カラムを作成
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            allow_null: true,
            default_value: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            comment: None,
            references: None,
        }
    }

    /// NULL許可フラグを指定
    pub fn allow_null(mut self, allow_null: bool) -> Self {
        self.allow_null = allow_null;
        self
    }

    /// NOT NULLにする
    pub fn not_null(self) -> Self {
        self.allow_null(false)
    }

    /// デフォルト値を指定
    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// プライマリキーにする
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    /// 自動増分にする
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// ユニーク制約を付与
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// コメントを指定
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// 外部キーの参照先を指定
    pub fn references(mut self, target: ForeignKeyTarget) -> Self {
        self.references = Some(target);
        self
    }

    /// 有効なデフォルト値（NULLは「なし」として扱う）
    pub fn effective_default(&self) -> Option<&DefaultValue> {
        self.default_value.as_ref().filter(|v| !v.is_null())
    }
}

impl From<DataType> for ColumnDefinition {
    fn from(data_type: DataType) -> Self {
        Self::new(data_type)
    }
}

/// カラム変更要求
///
/// changeColumn に渡す疎な更新レコード。
/// `None` のフィールドは「変更しない」を意味し、既存の値が維持されます。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    /// 新しい型
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    /// 新しいNULL許可フラグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_null: Option<bool>,

    /// 新しいデフォルト値
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,

    /// 既存のデフォルト値を削除する
    #[serde(default)]
    pub drop_default: bool,

    /// 新しいプライマリキーフラグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<bool>,

    /// 新しい自動増分フラグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,

    /// 新しいユニーク制約フラグ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,

    /// 新しいコメント（`Some(None)` はコメントの削除）
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub comment: Option<Option<String>>,

    /// 新しい外部キーの参照先
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyTarget>,
}

/// キーが存在すれば（値がnullでも）`Some` として扱う
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ColumnChange {
    /// 空の変更要求を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 型を変更
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// NULL許可フラグを変更
    pub fn allow_null(mut self, allow_null: bool) -> Self {
        self.allow_null = Some(allow_null);
        self
    }

    /// デフォルト値を変更
    pub fn default_value(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// デフォルト値を削除
    pub fn drop_default(mut self) -> Self {
        self.drop_default = true;
        self
    }

    /// プライマリキーフラグを変更
    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = Some(primary_key);
        self
    }

    /// 自動増分フラグを変更
    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = Some(auto_increment);
        self
    }

    /// ユニーク制約フラグを変更
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// コメントを設定
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(Some(comment.into()));
        self
    }

    /// コメントを削除
    pub fn clear_comment(mut self) -> Self {
        self.comment = Some(None);
        self
    }

    /// 外部キーを設定
    pub fn references(mut self, target: ForeignKeyTarget) -> Self {
        self.references = Some(target);
        self
    }

    /// 何も変更しない要求かどうか
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// デフォルト値の変更を含むかどうか
    pub fn touches_default(&self) -> bool {
        self.default_value.is_some() || self.drop_default
    }

    /// 要求自体の整合性を検証
    pub fn validate(&self, table: &TableIdentifier, column: &str) -> Result<(), MigrationEngineError> {
        if self.drop_default && self.default_value.is_some() {
            return Err(MigrationEngineError::InvalidDefinition {
                message: format!(
                    "column '{}' on '{}': drop_default and default_value are mutually exclusive",
                    column, table
                ),
            });
        }

        if let Some(DataType::Enum { values }) = &self.data_type {
            if values.is_empty() {
                return Err(MigrationEngineError::InvalidDefinition {
                    message: format!(
                        "column '{}' on '{}': an ENUM type needs at least one label",
                        column, table
                    ),
                });
            }
        }

        Ok(())
    }

    /// 現在の定義に変更を適用した目標定義を返す
    ///
    /// 要求に含まれないプロパティは `current` の値を引き継ぎます。
    pub fn apply_to(&self, current: &ColumnDefinition) -> ColumnDefinition {
        let mut target = current.clone();

        if let Some(data_type) = &self.data_type {
            target.data_type = data_type.clone();
        }
        if let Some(allow_null) = self.allow_null {
            target.allow_null = allow_null;
        }
        if self.drop_default {
            target.default_value = None;
        } else if let Some(default_value) = &self.default_value {
            target.default_value = if default_value.is_null() {
                None
            } else {
                Some(default_value.clone())
            };
        }
        if let Some(primary_key) = self.primary_key {
            target.primary_key = primary_key;
        }
        if let Some(auto_increment) = self.auto_increment {
            target.auto_increment = auto_increment;
        }
        if let Some(unique) = self.unique {
            target.unique = unique;
        }
        if let Some(comment) = &self.comment {
            target.comment = comment.clone();
        }
        if let Some(references) = &self.references {
            target.references = Some(references.clone());
        }

        target
    }
}

impl From<DataType> for ColumnChange {
    fn from(data_type: DataType) -> Self {
        Self::new().data_type(data_type)
    }
}

impl From<ColumnDefinition> for ColumnChange {
    /// 完全な定義を「すべてのプロパティを指定した変更」として扱う
    fn from(definition: ColumnDefinition) -> Self {
        Self {
            data_type: Some(definition.data_type),
            allow_null: Some(definition.allow_null),
            default_value: definition.default_value,
            drop_default: false,
            primary_key: Some(definition.primary_key),
            auto_increment: Some(definition.auto_increment),
            unique: Some(definition.unique),
            comment: Some(definition.comment),
            references: definition.references,
        }
    }
}

/// 観測されたカラムの状態
///
/// describeTable の結果。デフォルト値とコメントが存在しない場合は `None` です。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// 方言でレンダリングされた型名（例: "VARCHAR(255)", "DOUBLE PRECISION"）
    #[serde(rename = "type")]
    pub data_type: String,

    /// NULL許可フラグ
    pub allow_null: bool,

    /// デフォルト値（クォートとキャストを除去した値）
    pub default_value: Option<String>,

    /// プライマリキーフラグ
    pub primary_key: bool,

    /// 自動増分フラグ
    pub auto_increment: bool,

    /// カラムコメント
    pub comment: Option<String>,

    /// 単一カラムのユニーク制約が存在するか
    pub unique: bool,

    /// 列挙型のラベル一覧（列挙型以外は空）
    #[serde(default)]
    pub special: Vec<String>,
}

/// 外部キー参照
///
/// カタログから導出される、外部キーを構成するカラムごとの参照情報です。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    /// 制約名
    pub constraint_name: String,
    /// 参照元スキーマ
    pub table_schema: Option<String>,
    /// 参照元テーブル
    pub table_name: String,
    /// 参照元カラム
    pub column_name: String,
    /// 参照先スキーマ
    pub referenced_table_schema: Option<String>,
    /// 参照先テーブル
    pub referenced_table_name: String,
    /// 参照先カラム
    pub referenced_column_name: String,
    /// ON UPDATEアクション
    pub on_update: Option<ReferentialAction>,
    /// ON DELETEアクション
    pub on_delete: Option<ReferentialAction>,
}
