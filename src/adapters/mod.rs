// Adapters
// データベース接続、方言ごとのSQL生成とカタログ読み取りを抽象化

pub mod catalog_reader;
pub mod connection_string;
pub mod database;
pub mod sql_generator;
pub mod sql_quote;
pub mod type_mapping;
