use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202608310001_create_submissions::Migration),
            Box::new(migrations::m202608310002_create_feedback_reports::Migration),
            Box::new(migrations::m202608310003_create_jobs::Migration),
        ]
    }
}
