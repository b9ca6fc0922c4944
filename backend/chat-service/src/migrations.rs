use crate::error::AppError;
use deadpool_postgres::Pool;

// Embedded at compile time; every statement is idempotent
const MIGRATIONS: [(&str, &str); 3] = [
    (
        "0001_create_principals",
        include_str!("../migrations/0001_create_principals.sql"),
    ),
    (
        "0002_create_relationships",
        include_str!("../migrations/0002_create_relationships.sql"),
    ),
    (
        "0003_create_chat_messages",
        include_str!("../migrations/0003_create_chat_messages.sql"),
    ),
];

pub async fn run_all(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client.batch_execute(sql).await.map_err(|e| {
            tracing::error!(migration = name, error = %e, "Migration failed");
            AppError::StartServer(format!("migration {name}: {e}"))
        })?;
        tracing::info!(migration = name, "Migration applied");
    }
    Ok(())
}
