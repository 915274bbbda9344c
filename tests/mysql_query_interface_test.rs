/// MySQL QueryInterface 統合テスト
///
/// testcontainersでMySQLを起動し、MODIFY COLUMN による変更で
/// 指定していないプロパティが維持されることを確認します。
///
/// 注意: Docker必須のテストは #[ignore] アトリビュートでマークされています。
/// 実行するには: cargo test --test mysql_query_interface_test -- --ignored

#[cfg(test)]
mod mysql_query_interface_tests {
    use sqlx::Row;
    use strata_alter::{
        ColumnChange, ColumnDefinition, DataType, ForeignKeyTarget, QueryInterface,
        ReferentialAction,
    };
    use testcontainers::{runners::AsyncRunner, ContainerAsync};
    use testcontainers_modules::mysql::Mysql;

    /// MySQLコンテナを起動してQueryInterfaceを作成
    async fn setup_mysql() -> (ContainerAsync<Mysql>, QueryInterface) {
        let container = Mysql::default()
            .start()
            .await
            .expect("Failed to start MySQL container");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("Failed to get container port");
        let url = format!("mysql://root@127.0.0.1:{}/test", port);

        let qi = QueryInterface::connect(&url).await.unwrap();
        (container, qi)
    }

    async fn setup_users(qi: &QueryInterface) {
        qi.create_table(
            "level",
            &[("id", ColumnDefinition::new(DataType::INTEGER).primary_key())],
        )
        .await
        .unwrap();
        qi.create_table(
            "users",
            &[
                (
                    "id",
                    ColumnDefinition::new(DataType::INTEGER)
                        .primary_key()
                        .auto_increment(),
                ),
                ("status", ColumnDefinition::new(DataType::string()).not_null()),
                ("currency", ColumnDefinition::new(DataType::INTEGER)),
                ("email", ColumnDefinition::new(DataType::string()).unique()),
                (
                    "level_id",
                    ColumnDefinition::new(DataType::INTEGER).references(
                        ForeignKeyTarget::new("level", "id").on_delete(ReferentialAction::Cascade),
                    ),
                ),
                (
                    "kind",
                    ColumnDefinition::new(DataType::enumeration(["value1", "value2", "value3"]))
                        .comment("kind of user"),
                ),
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_change_integer_to_float() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        qi.change_column("users", "currency", DataType::FLOAT)
            .await
            .unwrap();

        let currency = &qi.describe_table("users").await.unwrap()["currency"];
        assert_eq!(currency.data_type, "FLOAT");
        assert!(currency.allow_null);
        assert_eq!(currency.default_value, None);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_default_keeps_not_null_and_comment() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        qi.change_column("users", "status", ColumnChange::new().default_value("active"))
            .await
            .unwrap();
        let status = &qi.describe_table("users").await.unwrap()["status"];
        assert_eq!(status.default_value.as_deref(), Some("active"));
        assert!(!status.allow_null);

        qi.change_column("users", "kind", ColumnChange::new().allow_null(false))
            .await
            .unwrap();
        let kind = &qi.describe_table("users").await.unwrap()["kind"];
        assert_eq!(kind.comment.as_deref(), Some("kind of user"));
        assert_eq!(kind.special, vec!["value1", "value2", "value3"]);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_describe_string_and_enum_types() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;
        qi.add_column("users", "code", ColumnDefinition::new(DataType::char(5)))
            .await
            .unwrap();

        let description = qi.describe_table("users").await.unwrap();
        assert_eq!(description["status"].data_type, "VARCHAR(255)");
        assert_eq!(description["code"].data_type, "CHAR(5)");
        assert_eq!(
            description["kind"].data_type,
            "ENUM('value1','value2','value3')"
        );
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_unique_on_two_columns_keeps_allow_null() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        qi.change_column("users", "status", ColumnChange::new().unique(true))
            .await
            .unwrap();
        qi.change_column("users", "currency", ColumnChange::new().unique(true))
            .await
            .unwrap();

        let description = qi.describe_table("users").await.unwrap();
        assert!(description["status"].unique);
        assert!(!description["status"].allow_null);
        assert!(description["currency"].unique);
        assert!(description["currency"].allow_null);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_change_columns_widen_char_keeps_properties() {
        let (_container, qi) = setup_mysql().await;
        qi.create_table(
            "people",
            &[
                ("id", ColumnDefinition::new(DataType::INTEGER).primary_key()),
                (
                    "firstName",
                    ColumnDefinition::new(DataType::char(5))
                        .not_null()
                        .default_value("john")
                        .comment("first name"),
                ),
            ],
        )
        .await
        .unwrap();

        qi.change_columns("people", &[("firstName", DataType::char(255).into())])
            .await
            .unwrap();

        let first_name = &qi.describe_table("people").await.unwrap()["firstName"];
        assert_eq!(first_name.data_type, "CHAR(255)");
        assert_eq!(first_name.default_value.as_deref(), Some("john"));
        assert!(!first_name.allow_null);
        assert_eq!(first_name.comment.as_deref(), Some("first name"));
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_comment_change_keeps_on_update() {
        let (_container, qi) = setup_mysql().await;
        sqlx::query(
            "CREATE TABLE events (id INT PRIMARY KEY, \
             updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP)",
        )
        .execute(qi.pool())
        .await
        .unwrap();

        qi.change_column("events", "updated_at", ColumnChange::new().comment("touched"))
            .await
            .unwrap();

        let row = sqlx::query(
            "SELECT CAST(EXTRA AS CHAR) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = 'events' AND COLUMN_NAME = 'updated_at'",
        )
        .fetch_one(qi.pool())
        .await
        .unwrap();
        let extra: String = row.get(0);
        assert!(extra.to_lowercase().contains("on update current_timestamp"));

        let updated_at = &qi.describe_table("events").await.unwrap()["updated_at"];
        assert_eq!(updated_at.comment.as_deref(), Some("touched"));
        assert!(!updated_at.allow_null);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_replace_enum_labels() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        qi.change_column(
            "users",
            "kind",
            DataType::enumeration(["value1", "value3", "value4", "value5"]),
        )
        .await
        .unwrap();

        let kind = &qi.describe_table("users").await.unwrap()["kind"];
        assert_eq!(kind.data_type, "ENUM('value1','value3','value4','value5')");
        assert_eq!(kind.special, vec!["value1", "value3", "value4", "value5"]);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_foreign_key_and_unique_survive() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        qi.change_column("users", "level_id", ColumnChange::new().allow_null(false))
            .await
            .unwrap();
        qi.change_column("users", "email", DataType::string_with_length(320))
            .await
            .unwrap();
        qi.rename_column("users", "level_id", "tier_id").await.unwrap();

        let references = qi.get_foreign_key_references_for_table("users").await.unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].column_name, "tier_id");
        assert_eq!(references[0].referenced_table_name, "level");
        assert_eq!(references[0].on_delete, Some(ReferentialAction::Cascade));
        assert!(qi.describe_table("users").await.unwrap()["email"].unique);
    }

    #[tokio::test]
    #[ignore] // Docker必須
    async fn test_enum_on_foreign_key_column_is_conflict() {
        let (_container, qi) = setup_mysql().await;
        setup_users(&qi).await;

        let err = qi
            .change_column("users", "level_id", DataType::enumeration(["a"]))
            .await
            .unwrap_err();
        assert!(err.is_constraint_conflict());
    }
}
