// 操作計画
//
// YAML/JSONで記述したスキーマ操作の並びを表現し、ファイルから読み込みます。
// 適用は QueryInterface::apply_plan が先頭から順に行います。

use crate::core::error::MigrationEngineError;
use crate::core::schema::{ColumnChange, ColumnDefinition, TableIdentifier};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// テーブル参照
///
/// 文字列（`users`）またはスキーマ付きの識別子で記述できます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableRef {
    /// テーブル名のみ
    Name(String),
    /// スキーマ付き
    Qualified(TableIdentifier),
}

impl From<&TableRef> for TableIdentifier {
    fn from(table: &TableRef) -> Self {
        match table {
            TableRef::Name(name) => TableIdentifier::new(name.clone()),
            TableRef::Qualified(identifier) => identifier.clone(),
        }
    }
}

/// 名前付きカラム定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedColumn {
    /// カラム名
    pub name: String,
    /// カラム定義
    pub definition: ColumnDefinition,
}

/// 名前付きカラム変更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedChange {
    /// カラム名
    pub column: String,
    /// 変更内容
    pub change: ColumnChange,
}

/// 1つのスキーマ操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// スキーマ作成
    CreateSchema {
        /// スキーマ名
        name: String,
    },
    /// テーブル作成
    CreateTable {
        /// テーブル
        table: TableRef,
        /// カラム定義（定義順）
        columns: Vec<NamedColumn>,
    },
    /// カラム追加
    AddColumn {
        /// テーブル
        table: TableRef,
        /// カラム名
        column: String,
        /// カラム定義
        definition: ColumnDefinition,
    },
    /// カラム変更
    ChangeColumn {
        /// テーブル
        table: TableRef,
        /// カラム名
        column: String,
        /// 変更内容
        change: ColumnChange,
    },
    /// 複数カラムの変更
    ChangeColumns {
        /// テーブル
        table: TableRef,
        /// 変更内容（適用順）
        changes: Vec<NamedChange>,
    },
    /// カラムリネーム
    RenameColumn {
        /// テーブル
        table: TableRef,
        /// 旧カラム名
        from: String,
        /// 新カラム名
        to: String,
    },
}

impl Operation {
    /// ログとエラー表示用の操作名
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateSchema { .. } => "create_schema",
            Operation::CreateTable { .. } => "create_table",
            Operation::AddColumn { .. } => "add_column",
            Operation::ChangeColumn { .. } => "change_column",
            Operation::ChangeColumns { .. } => "change_columns",
            Operation::RenameColumn { .. } => "rename_column",
        }
    }
}

/// 操作計画
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationPlan {
    /// 操作一覧（記述順に適用）
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl OperationPlan {
    /// 操作がないかどうか
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// 操作計画の適用エラー
///
/// 失敗した操作の位置（1始まり）と、それまでに適用済みの操作数を保持します。
#[derive(Debug, Error)]
#[error("Step {step} ({operation}) failed: {source}")]
pub struct PlanStepError {
    /// 失敗した操作の位置（1始まり）
    pub step: usize,
    /// 操作名
    pub operation: &'static str,
    /// 原因
    #[source]
    pub source: MigrationEngineError,
}

impl PlanStepError {
    /// 失敗前に適用済みの操作数
    pub fn applied(&self) -> usize {
        self.step - 1
    }
}

/// 操作計画の読み込みサービス
#[derive(Debug, Clone, Default)]
pub struct OperationPlanLoader;

impl OperationPlanLoader {
    /// ファイルから読み込む（拡張子が .json ならJSON、それ以外はYAML）
    pub fn from_file(path: &Path) -> Result<OperationPlan> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read operation plan: {:?}", path))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
        .with_context(|| format!("Invalid operation plan: {:?}", path))
    }

    /// YAML文字列から読み込む
    pub fn from_yaml_str(content: &str) -> Result<OperationPlan> {
        serde_saphyr::from_str(content).with_context(|| "Failed to parse operation plan YAML")
    }

    /// JSON文字列から読み込む
    pub fn from_json_str(content: &str) -> Result<OperationPlan> {
        serde_json::from_str(content).with_context(|| "Failed to parse operation plan JSON")
    }
}
