use crate::config::DbConfig;
use crate::error::AppError;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::NoTls;

/// Build the connection pool and verify the database answers `SELECT 1`
/// within the configured connect timeout
pub async fn init_pool(config: &DbConfig) -> Result<Pool, AppError> {
    tracing::debug!(
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout_secs,
        "Creating database pool"
    );

    let pg_config: tokio_postgres::Config = config
        .database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| AppError::Config(format!("DATABASE_URL: {e}")))?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| AppError::StartServer(format!("db pool: {e}")))?;

    let verify = async {
        let client = pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok::<(), AppError>(())
    };
    let verified = tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await;
    match verified {
        Ok(Ok(())) => {
            tracing::info!("Database pool created and verified");
            Ok(pool)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Database connection verification failed");
            Err(AppError::StartServer(format!("db: {e}")))
        }
        Err(_) => {
            tracing::error!(
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(AppError::StartServer("db: connection verification timed out".into()))
        }
    }
}
