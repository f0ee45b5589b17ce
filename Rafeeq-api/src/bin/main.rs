use anyhow::Context;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use rafeeq_api::providers::{LoggingCallProvider, TwilioCallProvider, TwilioConfig};
use rafeeq_api::{create_app, AppState};
use rafeeq_data::database::{initialize_database_pool, DatabaseConfig};
use rafeeq_data::repository::{EscalationLogRepository, EscalationLogRepositoryTrait};
use rafeeq_domain::health::EngineHealthService;
use rafeeq_domain::services::{CallProviderTrait, MonitoringLoop, SimulatedVitalSource, VitalSource};
use rafeeq_domain::MonitorConfig;

/// The main entry point for the Rafeeq monitor
///
/// Starts the monitoring loop and the HTTP surface, then waits for a
/// shutdown signal. On shutdown the HTTP server stops first, then the
/// monitor settles in-flight calls and flushes the escalation log.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        eprintln!("Warning: .env file not found or couldn't be read. Using environment variables.");
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_ansi(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stdout),
        )
        .with(env_filter)
        .init();

    info!("Starting Rafeeq monitor");

    let config = MonitorConfig::from_env().context("invalid monitor configuration")?;
    config.validate_config().context("invalid monitor configuration")?;

    let db_config = DatabaseConfig::from_env().context("invalid database configuration")?;
    let pool = match initialize_database_pool(&db_config) {
        Ok(pool) => {
            info!(in_memory = pool.is_in_memory(), "Database pool initialized");
            Some(pool)
        }
        Err(e) => {
            // The log falls back to process memory
            error!(error = %e, "Failed to initialize database pool");
            None
        }
    };
    let repository: Arc<dyn EscalationLogRepositoryTrait> = Arc::new(EscalationLogRepository::new(pool.clone()));

    let provider = call_provider(&config)?;

    let (monitor, handle) =
        MonitoringLoop::new(&config, provider, repository.clone()).context("failed to build monitoring loop")?;

    let health = Arc::new(EngineHealthService::new(pool, handle.status().clone(), config.cooldown()));

    let source: Option<Box<dyn VitalSource>> = if config.simulate {
        info!(patients = config.patients.len(), "Using simulated sensor source");
        Some(Box::new(SimulatedVitalSource::new(config.patient_ids())))
    } else {
        None
    };
    let monitor_task = tokio::spawn(monitor.run(source));

    let app = create_app(
        AppState {
            monitor: handle.clone(),
            repository,
        },
        health,
    );

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .context("PORT must be a number")?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped, shutting down monitor");
    handle.shutdown();
    match monitor_task.await {
        Ok(Ok(())) => info!("Monitor shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "Monitor stopped with an error"),
        Err(e) => error!(error = %e, "Monitor task panicked"),
    }

    Ok(())
}

/// Twilio when credentials and a caregiver number are configured, dry run otherwise
fn call_provider(config: &MonitorConfig) -> anyhow::Result<Arc<dyn CallProviderTrait>> {
    match TwilioConfig::from_env() {
        Some(twilio) if config.has_caregiver_contact() => {
            info!(from = %twilio.from_number, "Placing calls through Twilio");
            let templates = config.templates()?;
            let provider = TwilioCallProvider::new(twilio, &templates, config.retry_policy().call_timeout)
                .context("failed to build Twilio client")?;
            Ok(Arc::new(provider))
        }
        Some(_) => {
            warn!("CAREGIVER_PHONE is not set, emergency calls are logged only");
            Ok(Arc::new(LoggingCallProvider::new()))
        }
        None => {
            warn!("Twilio credentials are not set, emergency calls are logged only");
            Ok(Arc::new(LoggingCallProvider::new()))
        }
    }
}

/// Sets up a signal handler for graceful shutdown
///
/// Waits for either CTRL+C or SIGTERM (on Unix systems).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down server...");
}
