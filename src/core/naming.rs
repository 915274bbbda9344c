// 命名ポリシー
//
// 設定ファイル名と、エンジンが生成する制約・型・一時テーブルの名前の単一ソースを提供します。

/// 既定の設定ファイル名
pub const CONFIG_FILE: &str = ".strata.yaml";

/// SQLiteの再構築時に使う一時テーブルの接頭辞
pub const SHADOW_TABLE_PREFIX: &str = "_strata_new_";

/// PostgreSQLの列挙型を置き換える際、旧型に付ける接尾辞
pub const OLD_ENUM_SUFFIX: &str = "_old";

/// PostgreSQLの列挙型名
///
/// `enum_{table}_{column}` の形式。
pub fn enum_type_name(table: &str, column: &str) -> String {
    format!("enum_{}_{}", table, column)
}

/// 置き換え中の旧列挙型名
pub fn old_enum_type_name(type_name: &str) -> String {
    format!("{}{}", type_name, OLD_ENUM_SUFFIX)
}

/// 単一カラムのユニーク制約名
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("uq_{}_{}", table, column)
}

/// 外部キー制約名
pub fn foreign_key_name(table: &str, column: &str, referenced_table: &str) -> String {
    format!("fk_{}_{}_{}", table, column, referenced_table)
}

/// プライマリキー制約名
pub fn primary_key_name(table: &str) -> String {
    format!("{}_pkey", table)
}

/// PostgreSQLの自動増分用シーケンス名
pub fn sequence_name(table: &str, column: &str) -> String {
    format!("{}_{}_seq", table, column)
}

/// SQLiteの再構築用一時テーブル名
pub fn shadow_table_name(table: &str) -> String {
    format!("{}{}", SHADOW_TABLE_PREFIX, table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names() {
        assert_eq!(unique_constraint_name("users", "email"), "uq_users_email");
        assert_eq!(
            foreign_key_name("users", "level_id", "level"),
            "fk_users_level_id_level"
        );
        assert_eq!(primary_key_name("users"), "users_pkey");
        assert_eq!(sequence_name("users", "id"), "users_id_seq");
    }

    #[test]
    fn test_enum_type_names() {
        let name = enum_type_name("users", "kind");
        assert_eq!(name, "enum_users_kind");
        assert_eq!(old_enum_type_name(&name), "enum_users_kind_old");
    }

    #[test]
    fn test_shadow_table_name() {
        assert_eq!(shadow_table_name("users"), "_strata_new_users");
    }
}
