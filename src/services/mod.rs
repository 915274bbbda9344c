// Services Layer
// マイグレーションエンジン本体と、設定・操作計画の読み込み

pub mod config_loader;
pub mod operation_plan;
pub mod query_interface;
pub mod table_rebuild;
