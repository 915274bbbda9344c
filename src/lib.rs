// strata-alterライブラリのエントリーポイント
//
// モジュール構造:
// - core: ドメインモデル（カラム定義、観測状態、エラー、設定）
// - adapters: データベース方言ごとのSQL生成とカタログ読み取りを抽象化
// - services: マイグレーションエンジン本体と、設定・操作計画の読み込み

pub mod core;
pub mod adapters;
pub mod services;

pub use crate::core::config::Dialect;
pub use crate::core::error::MigrationEngineError;
pub use crate::core::schema::{
    ColumnChange, ColumnDefinition, ColumnDescription, DataType, DefaultValue,
    ForeignKeyReference, ForeignKeyTarget, ReferentialAction, TableIdentifier,
};
pub use crate::core::snapshot::TableDescription;
pub use crate::services::query_interface::QueryInterface;
