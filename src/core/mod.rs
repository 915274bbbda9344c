// Core Domain
// カラム定義、観測状態、エラー、設定の純粋なドメインモデル

pub mod config;
pub mod error;
pub mod naming;
pub mod schema;
pub mod snapshot;
pub mod type_category;
