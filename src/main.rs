use rusty_library_loans::{
    adapters::{memory::InMemoryLoanLedger, postgres::PostgresLoanLedger},
    api::{handlers::AppState, router::create_router},
    application::loan::ServiceDependencies,
    config::{AppConfig, StorageBackend},
    ports::LoanLedger,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 設定に応じて貸出台帳の実装を構築する
async fn build_ledger(
    config: &AppConfig,
) -> Result<Arc<dyn LoanLedger>, Box<dyn std::error::Error>> {
    match config.storage {
        StorageBackend::Postgres => {
            tracing::info!("Connecting to database: {}", config.database_url);

            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await?;

            if config.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Migrations applied");
            }

            let ledger: Arc<dyn LoanLedger> = Arc::new(PostgresLoanLedger::new(pool));
            Ok(ledger)
        }
        StorageBackend::Memory => {
            let ledger = InMemoryLoanLedger::seeded();

            for book in ledger.books() {
                tracing::info!(book_id = %book.book_id.value(), title = %book.title, "Seeded book");
            }
            for member in ledger.members() {
                tracing::info!(member_id = %member.member_id.value(), name = %member.name, "Seeded member");
            }

            let ledger: Arc<dyn LoanLedger> = Arc::new(ledger);
            Ok(ledger)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envは任意
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rusty_library_loans=debug,tower_http=debug,axum=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(storage = ?config.storage, "Configuration loaded");

    let loan_ledger = build_ledger(&config).await?;

    // Create application state
    let app_state = Arc::new(AppState {
        service_deps: ServiceDependencies { loan_ledger },
    });

    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Library API listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
