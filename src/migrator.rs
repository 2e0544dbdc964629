use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240601_000001_create_chat_orders_table::Migration)]
    }
}

mod m20240601_000001_create_chat_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_chat_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::chat_order Model
            manager
                .create_table(
                    Table::create()
                        .table(ChatOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ChatOrders::OrderId)
                                .string()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ChatOrders::ChatSessionId).string().not_null())
                        .col(
                            ColumnDef::new(ChatOrders::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ChatOrders::State)
                                .string()
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(ChatOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ChatOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_chat_orders_session")
                        .table(ChatOrders::Table)
                        .col(ChatOrders::ChatSessionId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ChatOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ChatOrders {
        Table,
        OrderId,
        ChatSessionId,
        Amount,
        State,
        CreatedAt,
        UpdatedAt,
    }
}
