use actix_web::{web, App, HttpServer};
use chat_service::{
    config::{self, StoreBackend},
    db, error, logging, metrics, migrations, routes,
    state::AppState,
    store::{MemoryStore, PgStore, SharedStore},
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let store: SharedStore = match (&cfg.store_backend, &cfg.db) {
        (StoreBackend::Postgres, Some(db_cfg)) => {
            let pool = db::init_pool(db_cfg).await?;
            migrations::run_all(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        (StoreBackend::Postgres, None) => {
            return Err(error::AppError::Config("DATABASE_URL missing".into()));
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = MemoryStore::new();
            for name in &cfg.seed_users {
                let profile = store.add_user(name).await;
                tracing::info!(user_id = %profile.id, user_name = %profile.user_name, "Seeded user");
            }
            Arc::new(store)
        }
    };

    let identity = actix_middleware::TrustedIdentity::new(&cfg.identity_header)
        .map_err(|e| error::AppError::Config(format!("IDENTITY_HEADER: {e}")))?;
    let state = AppState::new(store, cfg.clone());

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, backend = ?cfg.store_backend, "starting chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(identity.clone())
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::RequestId::new())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::metrics_handler))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
