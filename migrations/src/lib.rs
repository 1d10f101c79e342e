pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_outbox_tables;
mod m20260101_000002_create_master_data_tables;
mod m20260101_000003_create_document_tables;
mod m20260101_000004_create_inventory_tables;
mod m20260101_000005_create_exception_and_scheduler_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_outbox_tables::Migration),
            Box::new(m20260101_000002_create_master_data_tables::Migration),
            Box::new(m20260101_000003_create_document_tables::Migration),
            Box::new(m20260101_000004_create_inventory_tables::Migration),
            Box::new(m20260101_000005_create_exception_and_scheduler_tables::Migration),
        ]
    }
}
