use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000001_create_outbox_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxEvents::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(OutboxEvents::DeviceId).string().not_null())
                    .col(
                        ColumnDef::new(OutboxEvents::DeviceSeq)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::EventType).string().not_null())
                    .col(
                        ColumnDef::new(OutboxEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::ClaimedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::LastError).text().null())
                    .col(
                        ColumnDef::new(OutboxEvents::VarianceApproved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_outbox_events_device_seq")
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::DeviceId)
                    .col(OutboxEvents::DeviceSeq)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_events_tenant_status")
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::TenantId)
                    .col(OutboxEvents::Status)
                    .col(OutboxEvents::ReceivedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProcessedEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProcessedEvents::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProcessedEvents::EventId).uuid().not_null())
                    .col(ColumnDef::new(ProcessedEvents::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ProcessedEvents::DeviceId).string().not_null())
                    .col(
                        ColumnDef::new(ProcessedEvents::DeviceSeq)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProcessedEvents::Outcome).string().not_null())
                    .col(ColumnDef::new(ProcessedEvents::DocumentId).uuid().null())
                    .col(ColumnDef::new(ProcessedEvents::JournalEntryId).uuid().null())
                    .col(ColumnDef::new(ProcessedEvents::ReasonCode).string().null())
                    .col(
                        ColumnDef::new(ProcessedEvents::ProcessedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The guard: at most one recorded outcome per natural key.
        manager
            .create_index(
                Index::create()
                    .name("ux_processed_events_device_seq")
                    .table(ProcessedEvents::Table)
                    .col(ProcessedEvents::DeviceId)
                    .col(ProcessedEvents::DeviceSeq)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkerHeartbeats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkerHeartbeats::WorkerName)
                            .string()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkerHeartbeats::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkerHeartbeats::Details).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobRuns::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(JobRuns::JobCode).string().not_null())
                    .col(
                        ColumnDef::new(JobRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobRuns::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(JobRuns::Status).string().not_null())
                    .col(ColumnDef::new(JobRuns::Error).text().null())
                    .col(ColumnDef::new(JobRuns::Details).json_binary().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkerHeartbeats::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessedEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OutboxEvents {
    Table,
    Id,
    TenantId,
    DeviceId,
    DeviceSeq,
    EventType,
    Payload,
    OccurredAt,
    ReceivedAt,
    Status,
    AttemptCount,
    NextAttemptAt,
    ClaimedAt,
    ProcessedAt,
    LastError,
    VarianceApproved,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProcessedEvents {
    Table,
    Id,
    EventId,
    TenantId,
    DeviceId,
    DeviceSeq,
    Outcome,
    DocumentId,
    JournalEntryId,
    ReasonCode,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum WorkerHeartbeats {
    Table,
    WorkerName,
    LastSeenAt,
    Details,
}

#[derive(DeriveIden)]
enum JobRuns {
    Table,
    Id,
    JobCode,
    StartedAt,
    FinishedAt,
    Status,
    Error,
    Details,
}
