use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionPlans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionPlans::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SubscriptionPlans::Name).text().not_null())
                    .col(
                        ColumnDef::new(SubscriptionPlans::MaxSceneCount)
                            .integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Plans are seeded externally and may lag behind profiles, so
        // subscription_plan_id is deliberately not a foreign key.
        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Profiles::Id).text().not_null().primary_key())
                    .col(ColumnDef::new(Profiles::Email).text().not_null())
                    .col(ColumnDef::new(Profiles::DisplayName).text().null())
                    .col(ColumnDef::new(Profiles::Company).text().null())
                    .col(
                        ColumnDef::new(Profiles::SubscriptionPlanId)
                            .text()
                            .not_null()
                            .default("free"),
                    )
                    .col(
                        ColumnDef::new(Profiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Profiles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SubscriptionPlans::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionPlans {
    Table,
    Id,
    Name,
    MaxSceneCount,
}

#[derive(DeriveIden)]
enum Profiles {
    Table,
    Id,
    Email,
    DisplayName,
    Company,
    SubscriptionPlanId,
    CreatedAt,
}
