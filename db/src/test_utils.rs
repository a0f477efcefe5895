use migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

/// In-memory database with the full schema applied.
///
/// The pool is pinned to a single connection: an in-memory sqlite database
/// lives and dies with its connection, so a second pooled connection would
/// see an empty schema.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// File-backed database with the full schema applied and a real connection
/// pool, for tests that need genuine cross-connection concurrency.
///
/// The returned directory owns the database file; keep it alive for the
/// duration of the test.
pub async fn setup_file_test_db() -> (DatabaseConnection, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create db directory");
    let path = dir.path().join("test.db");

    let db = crate::connect(path.to_str().expect("db path is not valid utf-8"))
        .await
        .expect("Failed to connect to file-backed db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    (db, dir)
}
