use library_lending_ledger::{
    adapters::{
        SystemClock,
        memory::{InMemoryAuthorizationService, InMemoryLedgerStore},
        postgres::PostgresLedgerStore,
    },
    api::{create_router, handlers::AppState},
    application::lending::ServiceDependencies,
    config::AppConfig,
    ports::{Catalog, LedgerStore},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_lending_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().expect("Failed to load configuration");

    // Ledger store: PostgreSQL when a database URL is configured, in-memory otherwise
    let (ledger_store, catalog): (Arc<dyn LedgerStore>, Arc<dyn Catalog>) =
        match &config.database.url {
            Some(database_url) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .connect(database_url)
                    .await
                    .expect("Failed to connect to database");

                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .expect("Failed to run migrations");

                tracing::info!("Using PostgreSQL ledger store");
                let store = Arc::new(PostgresLedgerStore::new(pool));
                (store.clone() as Arc<dyn LedgerStore>, store as Arc<dyn Catalog>)
            }
            None => {
                tracing::warn!("No database URL configured, using in-memory ledger store");
                let store = Arc::new(InMemoryLedgerStore::new());
                (store.clone() as Arc<dyn LedgerStore>, store as Arc<dyn Catalog>)
            }
        };

    let authorization = Arc::new(InMemoryAuthorizationService::new());
    for (user_id, role) in config.user_roles().expect("Invalid authorization roles") {
        authorization.add_user(user_id, role);
    }

    // Create service dependencies
    let service_deps = ServiceDependencies {
        ledger_store,
        catalog,
        authorization,
        clock: Arc::new(SystemClock),
        lending_policy: config.lending_policy(),
        fine_policy: config.fine_policy(),
    };

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
