use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::TelemetryConfig;

/// Guard returned by [`init_tracing`]. Must be held for the process lifetime
/// when file logging is enabled — dropping it stops the non-blocking writer
/// from flushing.
pub struct TracingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_tracing(config: &TelemetryConfig) -> TracingGuard {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());

    let (file_writer, file_guard) = match &config.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("powerbox.log");
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);

    match (file_writer, config.log_json) {
        (Some(writer), true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        (Some(writer), false) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init(),
        (None, true) => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        (None, false) => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    TracingGuard {
        _file_guard: file_guard,
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}
