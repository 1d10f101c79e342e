use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000004_create_inventory_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InventoryBatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryBatches::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryBatches::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(InventoryBatches::ItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(InventoryBatches::WarehouseId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryBatches::BatchNo).string().null())
                    .col(ColumnDef::new(InventoryBatches::ExpiryDate).date().null())
                    .col(
                        ColumnDef::new(InventoryBatches::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBatches::Status)
                            .string()
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(InventoryBatches::OnHandQty)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InventoryBatches::UnitCostUsd)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryBatches::UnitCostLbp)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryBatches::StatusReason).text().null())
                    .col(
                        ColumnDef::new(InventoryBatches::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_batches_fefo")
                    .table(InventoryBatches::Table)
                    .col(InventoryBatches::CompanyId)
                    .col(InventoryBatches::ItemId)
                    .col(InventoryBatches::WarehouseId)
                    .col(InventoryBatches::Status)
                    .col(InventoryBatches::ExpiryDate)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PosShifts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PosShifts::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(PosShifts::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(PosShifts::DeviceId).string().not_null())
                    .col(ColumnDef::new(PosShifts::CashierId).string().null())
                    .col(ColumnDef::new(PosShifts::Status).string().not_null())
                    .col(
                        ColumnDef::new(PosShifts::OpenedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PosShifts::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PosShifts::OpeningCashUsd)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PosShifts::OpeningCashLbp)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PosShifts::ClosingCashUsd).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::ClosingCashLbp).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::ExpectedCashUsd).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::ExpectedCashLbp).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::VarianceUsd).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::VarianceLbp).decimal_len(16, 4).null())
                    .col(ColumnDef::new(PosShifts::Notes).text().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PosShifts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InventoryBatches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InventoryBatches {
    Table,
    Id,
    CompanyId,
    ItemId,
    WarehouseId,
    BatchNo,
    ExpiryDate,
    ReceivedAt,
    Status,
    OnHandQty,
    UnitCostUsd,
    UnitCostLbp,
    StatusReason,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PosShifts {
    Table,
    Id,
    CompanyId,
    DeviceId,
    CashierId,
    Status,
    OpenedAt,
    ClosedAt,
    OpeningCashUsd,
    OpeningCashLbp,
    ClosingCashUsd,
    ClosingCashLbp,
    ExpectedCashUsd,
    ExpectedCashLbp,
    VarianceUsd,
    VarianceLbp,
    Notes,
}
