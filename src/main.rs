use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use algo_app::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    database::Database,
    log_system_event,
    models::SeedQuestion,
    notifications::{InMemoryNotificationCenter, NotificationCenter},
    question_service::QuestionService,
    reconciler::ListSync,
    reminders::{ReminderScheduler, ReminderService},
    solutions::SolutionService,
};

const SYNC_QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Initialize logging with console and rolling file output
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting AlgoApp server");

    // Initialize database
    let db = Database::new(&config.database.url).await?;
    info!("Database initialized successfully");

    if let Some(seed_path) = &config.database.seed_path {
        seed_from_file(&db, seed_path).await?;
    }

    // Initialize services
    let question_service = QuestionService::new(db.clone());
    let (list_sync, _sync_worker) =
        ListSync::spawn(question_service.reconciler().clone(), SYNC_QUEUE_CAPACITY);

    let center: Arc<dyn NotificationCenter> = Arc::new(InMemoryNotificationCenter::new());
    if !center.request_authorization().await? {
        warn!("Notification authorization denied, reminders will not be delivered");
    }
    let reminder_service = ReminderService::new(db.clone(), ReminderScheduler::new(center));
    let scheduled = reminder_service.resync().await?;
    info!(scheduled, "Pending reminder triggers restored");

    let solution_service = SolutionService::from_config(db.clone(), &config.solutions)?;
    info!(
        languages = solution_service.sources().len(),
        "Initialized solution service"
    );

    spawn_event_logger(&db);

    // Create application state
    let state = AppState {
        question_service,
        list_sync,
        reminder_service,
        solution_service,
    };

    // Build the application router
    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

async fn seed_from_file(db: &Database, path: &str) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed dataset {}", path))?;
    let seeds: Vec<SeedQuestion> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid seed dataset {}", path))?;
    let inserted = db.seed_questions(&seeds).await?;
    info!(path = %path, total = seeds.len(), inserted, "Seed dataset applied");
    Ok(())
}

/// Trace every committed store change
fn spawn_event_logger(db: &Database) {
    let mut events = db.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = ?event, "Store changed"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind, events skipped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    log_system_event!(shutdown, component = "server", "Shutdown signal received");
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,algo_app=debug"));

    // Configure console output
    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    // Configure file output (no ANSI colors for files) with daily rotation
    let mut guard = None;
    let file_layer = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "algo-app.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
