use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202608310002_create_feedback_reports"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("feedback_reports"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("submission_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("overall_score"))
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("summary")).text().not_null())
                    .col(ColumnDef::new(Alias::new("strengths")).json().not_null())
                    .col(
                        ColumnDef::new(Alias::new("improvements"))
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("suggestions")).json().not_null())
                    .col(
                        ColumnDef::new(Alias::new("criterion_scores"))
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("raw_response"))
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("model")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("processing_ms"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("superseded"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                Alias::new("feedback_reports"),
                                Alias::new("submission_id"),
                            )
                            .to(Alias::new("submissions"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("feedback_reports"))
                    .to_owned(),
            )
            .await
    }
}
