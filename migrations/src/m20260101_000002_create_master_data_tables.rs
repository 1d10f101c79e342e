use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000002_create_master_data_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaxCodes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TaxCodes::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(TaxCodes::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(TaxCodes::Code).string().not_null())
                    .col(ColumnDef::new(TaxCodes::Rate).decimal_len(9, 6).not_null())
                    .col(
                        ColumnDef::new(TaxCodes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CatalogItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CatalogItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CatalogItems::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(CatalogItems::Sku).string().not_null())
                    .col(ColumnDef::new(CatalogItems::Name).string().not_null())
                    .col(
                        ColumnDef::new(CatalogItems::UnitPriceUsd)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CatalogItems::UnitPriceLbp)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CatalogItems::StandardCostUsd)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CatalogItems::StandardCostLbp)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CatalogItems::TaxCodeId).uuid().null())
                    .col(
                        ColumnDef::new(CatalogItems::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(CatalogItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_catalog_items_company_sku")
                    .table(CatalogItems::Table)
                    .col(CatalogItems::CompanyId)
                    .col(CatalogItems::Sku)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Customers::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Customers::Name).string().not_null())
                    .col(
                        ColumnDef::new(Customers::CreditLimitUsd)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::CreditLimitLbp)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::CreditBalanceUsd)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::CreditBalanceLbp)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::PaymentTermsDays)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PosDevices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PosDevices::Id)
                            .string()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PosDevices::CompanyId).uuid().not_null())
                    .col(
                        ColumnDef::new(PosDevices::LinkedCompanyIds)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PosDevices::WarehouseId).uuid().null())
                    .col(
                        ColumnDef::new(PosDevices::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccountRoleMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccountRoleMappings::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountRoleMappings::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountRoleMappings::RoleCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountRoleMappings::AccountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AccountRoleMappings::AccountCode)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_account_role_mappings_company_role")
                    .table(AccountRoleMappings::Table)
                    .col(AccountRoleMappings::CompanyId)
                    .col(AccountRoleMappings::RoleCode)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExchangeRates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExchangeRates::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExchangeRates::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(ExchangeRates::RateDate).date().not_null())
                    .col(ColumnDef::new(ExchangeRates::RateType).string().not_null())
                    .col(
                        ColumnDef::new(ExchangeRates::UsdToLbp)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_exchange_rates_company_date_type")
                    .table(ExchangeRates::Table)
                    .col(ExchangeRates::CompanyId)
                    .col(ExchangeRates::RateDate)
                    .col(ExchangeRates::RateType)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PeriodLocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PeriodLocks::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PeriodLocks::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(PeriodLocks::StartDate).date().not_null())
                    .col(ColumnDef::new(PeriodLocks::EndDate).date().not_null())
                    .col(
                        ColumnDef::new(PeriodLocks::Locked)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(PeriodLocks::Reason).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DocumentSequences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DocumentSequences::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DocumentSequences::Prefix).string().not_null())
                    .col(
                        ColumnDef::new(DocumentSequences::NextValue)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(DocumentSequences::CompanyId)
                            .col(DocumentSequences::Prefix),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DocumentSequences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PeriodLocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExchangeRates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccountRoleMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PosDevices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CatalogItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaxCodes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaxCodes {
    Table,
    Id,
    CompanyId,
    Code,
    Rate,
    IsActive,
}

#[derive(DeriveIden)]
enum CatalogItems {
    Table,
    Id,
    CompanyId,
    Sku,
    Name,
    UnitPriceUsd,
    UnitPriceLbp,
    StandardCostUsd,
    StandardCostLbp,
    TaxCodeId,
    IsActive,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    CompanyId,
    Name,
    CreditLimitUsd,
    CreditLimitLbp,
    CreditBalanceUsd,
    CreditBalanceLbp,
    PaymentTermsDays,
    IsActive,
}

#[derive(DeriveIden)]
enum PosDevices {
    Table,
    Id,
    CompanyId,
    LinkedCompanyIds,
    WarehouseId,
    IsActive,
}

#[derive(DeriveIden)]
enum AccountRoleMappings {
    Table,
    Id,
    CompanyId,
    RoleCode,
    AccountId,
    AccountCode,
}

#[derive(DeriveIden)]
enum ExchangeRates {
    Table,
    Id,
    CompanyId,
    RateDate,
    RateType,
    UsdToLbp,
}

#[derive(DeriveIden)]
enum PeriodLocks {
    Table,
    Id,
    CompanyId,
    StartDate,
    EndDate,
    Locked,
    Reason,
}

#[derive(DeriveIden)]
enum DocumentSequences {
    Table,
    CompanyId,
    Prefix,
    NextValue,
}
