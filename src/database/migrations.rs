pub use sea_orm_migration::prelude::*;

mod m20260701_000001_create_queue_tables;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260701_000001_create_queue_tables::Migration)]
    }
}

pub struct Migrator;
