use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travelcost_store::postgres::{PostgresConfig, PostgresStore};
use travelcost_store::{AuditStore, MemoryAuditStore};

use travelcost_api::{create_router, ApiConfig, AppState, CalculationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "travelcost_api=info,travelcost_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env();
    let calculation_config = config
        .calculation_config()
        .context("Failed to load calculation configuration")?;

    let mut entries: Vec<_> = calculation_config.to_inspection_map().into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, (value, source)) in entries {
        tracing::info!(key = %key, value = %value, source = ?source, "Calculation setting");
    }

    let settings = calculation_config.calculation_settings();

    tracing::info!(
        port = config.port,
        cache_enabled = settings.cache_enabled,
        "Starting travel-cost API server"
    );

    // Audit backend based on DATABASE_URL
    let audit_store: Arc<dyn AuditStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("DATABASE_URL found, connecting to PostgreSQL...");
            let store = init_postgres_audit(database_url).await.context(
                "Failed to connect to PostgreSQL. Ensure the server is running, \
                 DATABASE_URL is correct and the database exists",
            )?;
            tracing::info!("Connected to PostgreSQL");
            store
        }
        None => {
            tracing::info!("Using in-memory audit log (set DATABASE_URL for PostgreSQL)");
            Arc::new(MemoryAuditStore::new())
        }
    };

    let service = Arc::new(CalculationService::new(audit_store, settings.clone()));

    if let Some(interval) = settings.cleanup_interval {
        tracing::info!(interval_secs = interval.as_secs(), "Background cache sweep enabled");
        Arc::clone(&service).spawn_cleanup(interval);
    }

    let state = Arc::new(AppState::new(service));

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid TRAVELCOST_CORS_ORIGIN: {}", config.cors_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = create_router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("CORS enabled for {}", config.cors_origin);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize the PostgreSQL audit log from a database URL
async fn init_postgres_audit(database_url: &str) -> anyhow::Result<Arc<dyn AuditStore>> {
    let config = PostgresConfig::from_database_url(database_url).context("Invalid DATABASE_URL")?;
    let store = PostgresStore::with_migrations(config).await?;
    Ok(Arc::new(store))
}
