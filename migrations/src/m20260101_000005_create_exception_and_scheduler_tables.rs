use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000005_create_exception_and_scheduler_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExceptionItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExceptionItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExceptionItems::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ExceptionItems::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(ExceptionItems::EventId).uuid().not_null())
                    .col(ColumnDef::new(ExceptionItems::DocumentId).uuid().null())
                    .col(ColumnDef::new(ExceptionItems::ReasonCode).string().not_null())
                    .col(
                        ColumnDef::new(ExceptionItems::Details)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExceptionItems::Status)
                            .string()
                            .not_null()
                            .default("open"),
                    )
                    .col(
                        ColumnDef::new(ExceptionItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExceptionItems::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ExceptionItems::ResolvedBy).string().null())
                    .col(ColumnDef::new(ExceptionItems::ResolutionNote).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_exception_items_tenant_status")
                    .table(ExceptionItems::Table)
                    .col(ExceptionItems::TenantId)
                    .col(ExceptionItems::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExceptionActions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExceptionActions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExceptionActions::ExceptionId)
                            .uuid()
                            .null(),
                    )
                    .col(ColumnDef::new(ExceptionActions::EventId).uuid().not_null())
                    .col(ColumnDef::new(ExceptionActions::Action).string().not_null())
                    .col(ColumnDef::new(ExceptionActions::Actor).string().not_null())
                    .col(ColumnDef::new(ExceptionActions::Note).text().null())
                    .col(
                        ColumnDef::new(ExceptionActions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JournalTemplates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalTemplates::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalTemplates::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(JournalTemplates::Name).string().not_null())
                    .col(ColumnDef::new(JournalTemplates::Memo).text().null())
                    .col(
                        ColumnDef::new(JournalTemplates::RateType)
                            .string()
                            .not_null()
                            .default("market"),
                    )
                    .col(
                        ColumnDef::new(JournalTemplates::IsActive)
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
                    .table(JournalTemplateLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JournalTemplateLines::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalTemplateLines::TemplateId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalTemplateLines::LineNo)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalTemplateLines::RoleCode)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JournalTemplateLines::Side).string().not_null())
                    .col(
                        ColumnDef::new(JournalTemplateLines::AmountUsd)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JournalTemplateLines::AmountLbp)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(JournalTemplateLines::Memo).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_journal_template_lines_template")
                            .from(JournalTemplateLines::Table, JournalTemplateLines::TemplateId)
                            .to(JournalTemplates::Table, JournalTemplates::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RecurringJournalRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecurringJournalRules::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::CompanyId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::TemplateId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::Cadence)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::DayOfWeek)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::DayOfMonth)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::NextRunDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::State)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::PausedReason)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::LastRunDate)
                            .date()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RecurringJournalRules::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RecurringJournalRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalTemplateLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JournalTemplates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExceptionActions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExceptionItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExceptionItems {
    Table,
    Id,
    TenantId,
    CompanyId,
    EventId,
    DocumentId,
    ReasonCode,
    Details,
    Status,
    CreatedAt,
    ResolvedAt,
    ResolvedBy,
    ResolutionNote,
}

#[derive(DeriveIden)]
enum ExceptionActions {
    Table,
    Id,
    ExceptionId,
    EventId,
    Action,
    Actor,
    Note,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JournalTemplates {
    Table,
    Id,
    CompanyId,
    Name,
    Memo,
    RateType,
    IsActive,
}

#[derive(DeriveIden)]
enum JournalTemplateLines {
    Table,
    Id,
    TemplateId,
    LineNo,
    RoleCode,
    Side,
    AmountUsd,
    AmountLbp,
    Memo,
}

#[derive(DeriveIden)]
enum RecurringJournalRules {
    Table,
    Id,
    CompanyId,
    TemplateId,
    Cadence,
    DayOfWeek,
    DayOfMonth,
    NextRunDate,
    State,
    PausedReason,
    LastRunDate,
    UpdatedAt,
}
