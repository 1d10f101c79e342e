use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000003_create_document_tables"
    }
}

/// Money column stored at four decimal places, defaulting to zero.
fn amount<T: IntoIden>(column: T) -> ColumnDef {
    ColumnDef::new(column)
        .decimal_len(16, 4)
        .not_null()
        .default(0)
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Documents::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Documents::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Documents::OriginCompanyId).uuid().not_null())
                    .col(ColumnDef::new(Documents::SourceEventId).uuid().not_null())
                    .col(ColumnDef::new(Documents::DocType).string().not_null())
                    .col(ColumnDef::new(Documents::DocNo).string().not_null())
                    .col(ColumnDef::new(Documents::Status).string().not_null())
                    .col(ColumnDef::new(Documents::DocDate).date().not_null())
                    .col(ColumnDef::new(Documents::DueDate).date().null())
                    .col(amount(Documents::ExchangeRate))
                    .col(amount(Documents::SubtotalUsd))
                    .col(amount(Documents::SubtotalLbp))
                    .col(amount(Documents::TaxUsd))
                    .col(amount(Documents::TaxLbp))
                    .col(amount(Documents::TotalUsd))
                    .col(amount(Documents::TotalLbp))
                    .col(amount(Documents::RoundingUsd))
                    .col(amount(Documents::RoundingLbp))
                    .col(amount(Documents::CostUsd))
                    .col(amount(Documents::CostLbp))
                    .col(ColumnDef::new(Documents::CustomerId).uuid().null())
                    .col(ColumnDef::new(Documents::WarehouseId).uuid().null())
                    .col(ColumnDef::new(Documents::CounterWarehouseId).uuid().null())
                    .col(ColumnDef::new(Documents::ShiftId).uuid().null())
                    .col(ColumnDef::new(Documents::DeviceId).string().null())
                    .col(ColumnDef::new(Documents::ReferenceDocumentId).uuid().null())
                    .col(ColumnDef::new(Documents::Memo).text().null())
                    .col(ColumnDef::new(Documents::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Documents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Documents::PostedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One document per source event; replays can never create a second.
        manager
            .create_index(
                Index::create()
                    .name("ux_documents_source_event")
                    .table(Documents::Table)
                    .col(Documents::SourceEventId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_documents_company_doc_no")
                    .table(Documents::Table)
                    .col(Documents::CompanyId)
                    .col(Documents::DocType)
                    .col(Documents::DocNo)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DocumentLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DocumentLines::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DocumentLines::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(DocumentLines::LineNo).integer().not_null())
                    .col(ColumnDef::new(DocumentLines::ItemId).uuid().null())
                    .col(ColumnDef::new(DocumentLines::Sku).string().null())
                    .col(ColumnDef::new(DocumentLines::Description).string().null())
                    .col(amount(DocumentLines::Qty))
                    .col(amount(DocumentLines::UnitPriceUsd))
                    .col(amount(DocumentLines::UnitPriceLbp))
                    .col(
                        ColumnDef::new(DocumentLines::DiscountPct)
                            .decimal_len(9, 6)
                            .not_null()
                            .default(0),
                    )
                    .col(amount(DocumentLines::LineTotalUsd))
                    .col(amount(DocumentLines::LineTotalLbp))
                    .col(amount(DocumentLines::TaxUsd))
                    .col(amount(DocumentLines::TaxLbp))
                    .col(ColumnDef::new(DocumentLines::TaxCodeId).uuid().null())
                    .col(amount(DocumentLines::CostUsd))
                    .col(amount(DocumentLines::CostLbp))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_document_lines_document")
                            .from(DocumentLines::Table, DocumentLines::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DocumentPayments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DocumentPayments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DocumentPayments::DocumentId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DocumentPayments::Method).string().not_null())
                    .col(amount(DocumentPayments::AmountUsd))
                    .col(amount(DocumentPayments::AmountLbp))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_document_payments_document")
                            .from(DocumentPayments::Table, DocumentPayments::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockMoves::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(StockMoves::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(StockMoves::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(StockMoves::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(StockMoves::LineNo).integer().not_null())
                    .col(ColumnDef::new(StockMoves::ItemId).uuid().not_null())
                    .col(ColumnDef::new(StockMoves::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(StockMoves::BatchId).uuid().null())
                    .col(amount(StockMoves::QtyIn))
                    .col(amount(StockMoves::QtyOut))
                    .col(amount(StockMoves::UnitCostUsd))
                    .col(amount(StockMoves::UnitCostLbp))
                    .col(ColumnDef::new(StockMoves::MoveDate).date().not_null())
                    .col(
                        ColumnDef::new(StockMoves::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JournalEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalEntries::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalEntries::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(JournalEntries::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(JournalEntries::JournalNo).string().not_null())
                    .col(ColumnDef::new(JournalEntries::EntryDate).date().not_null())
                    .col(amount(JournalEntries::ExchangeRate))
                    .col(ColumnDef::new(JournalEntries::Memo).text().null())
                    .col(amount(JournalEntries::TotalDebitUsd))
                    .col(amount(JournalEntries::TotalDebitLbp))
                    .col(
                        ColumnDef::new(JournalEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_journal_entries_document")
                    .table(JournalEntries::Table)
                    .col(JournalEntries::DocumentId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JournalLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalLines::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalLines::EntryId).uuid().not_null())
                    .col(ColumnDef::new(JournalLines::LineNo).integer().not_null())
                    .col(ColumnDef::new(JournalLines::AccountId).uuid().not_null())
                    .col(ColumnDef::new(JournalLines::RoleCode).string().not_null())
                    .col(amount(JournalLines::DebitUsd))
                    .col(amount(JournalLines::CreditUsd))
                    .col(amount(JournalLines::DebitLbp))
                    .col(amount(JournalLines::CreditLbp))
                    .col(ColumnDef::new(JournalLines::Memo).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_journal_lines_entry")
                            .from(JournalLines::Table, JournalLines::EntryId)
                            .to(JournalEntries::Table, JournalEntries::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JournalLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StockMoves::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DocumentPayments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DocumentLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
    CompanyId,
    OriginCompanyId,
    SourceEventId,
    DocType,
    DocNo,
    Status,
    DocDate,
    DueDate,
    ExchangeRate,
    SubtotalUsd,
    SubtotalLbp,
    TaxUsd,
    TaxLbp,
    TotalUsd,
    TotalLbp,
    RoundingUsd,
    RoundingLbp,
    CostUsd,
    CostLbp,
    CustomerId,
    WarehouseId,
    CounterWarehouseId,
    ShiftId,
    DeviceId,
    ReferenceDocumentId,
    Memo,
    Metadata,
    CreatedAt,
    PostedAt,
}

#[derive(DeriveIden)]
enum DocumentLines {
    Table,
    Id,
    DocumentId,
    LineNo,
    ItemId,
    Sku,
    Description,
    Qty,
    UnitPriceUsd,
    UnitPriceLbp,
    DiscountPct,
    LineTotalUsd,
    LineTotalLbp,
    TaxUsd,
    TaxLbp,
    TaxCodeId,
    CostUsd,
    CostLbp,
}

#[derive(DeriveIden)]
enum DocumentPayments {
    Table,
    Id,
    DocumentId,
    Method,
    AmountUsd,
    AmountLbp,
}

#[derive(DeriveIden)]
enum StockMoves {
    Table,
    Id,
    CompanyId,
    DocumentId,
    LineNo,
    ItemId,
    WarehouseId,
    BatchId,
    QtyIn,
    QtyOut,
    UnitCostUsd,
    UnitCostLbp,
    MoveDate,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JournalEntries {
    Table,
    Id,
    CompanyId,
    DocumentId,
    JournalNo,
    EntryDate,
    ExchangeRate,
    Memo,
    TotalDebitUsd,
    TotalDebitLbp,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JournalLines {
    Table,
    Id,
    EntryId,
    LineNo,
    AccountId,
    RoleCode,
    DebitUsd,
    CreditUsd,
    DebitLbp,
    CreditLbp,
    Memo,
}
