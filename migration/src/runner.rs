use colored::*;
use sea_orm_migration::prelude::*;
use std::io::{self, Write};
use std::time::Instant;

/// Applies every migration in order, printing one progress line per step.
/// Exits the process on the first failure.
pub async fn run_all_migrations(url: &str) {
    let db = sea_orm::Database::connect(url)
        .await
        .expect("DB connection failed");
    let manager = SchemaManager::new(&db);

    let migrations = <migration::Migrator as MigratorTrait>::migrations();
    println!("Applying {} migration(s)...", migrations.len());

    let started = Instant::now();
    for step in migrations {
        apply_step(&manager, step).await;
    }
    println!("All migrations applied in {:.2?}.", started.elapsed());
}

async fn apply_step(manager: &SchemaManager<'_>, step: Box<dyn MigrationTrait>) {
    print!("  {:<60} ", step.name().bold());
    io::stdout().flush().ok();

    let start = Instant::now();
    match step.up(manager).await {
        Ok(()) => {
            println!("{} {}", "ok".green(), format!("({:.2?})", start.elapsed()).dimmed());
        }
        Err(err) => {
            println!("{}", "failed".red());
            eprintln!("{}: {}", step.name(), err);
            std::process::exit(1);
        }
    }
}
