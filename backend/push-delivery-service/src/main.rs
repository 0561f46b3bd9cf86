use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpServer};
use anyhow::Context;
use push_delivery_service::{
    metrics, register_routes, services::PgSubscriptionStore, AppState, Config, Dispatcher,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting push delivery service");

    let config = Config::from_env().context("Invalid configuration")?;
    tracing::info!(env = %config.app.env, "Configuration loaded");

    let dispatcher =
        Arc::new(Dispatcher::from_config(&config).context("Failed to initialize push channels")?);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Successfully connected to database");

    let state = AppState {
        dispatcher,
        store: Arc::new(PgSubscriptionStore::new(db_pool)),
        service_key: config.auth.service_key.clone(),
    };

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let allowed_origins = config.cors.allowed_origins.clone();
    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "HEAD", "POST", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .max_age(3600);
        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .configure(register_routes)
    })
    .bind(&addr)?
    .run()
    .await?;

    Ok(())
}
