use mt5_bridge::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},mt5_bridge={level},tower_http=info",
            level = config.level
        ))
    });

    // Console layer
    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    // `rolling::daily` panics if it cannot create the first file, so check writability first
    let mut guard = None;
    let file_layer = match config.dir.as_deref() {
        Some(log_dir) if log_dir_writable(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "mt5-bridge.log");
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false) // No color codes in file
                    .with_target(true),
            )
        }
        Some(log_dir) => {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                log_dir
            );
            None
        }
        None => None,
    };

    // Combine layers
    let file_logging_enabled = file_layer.is_some();
    if let Err(e) = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
    {
        eprintln!("Warning: logging already initialized: {}", e);
    }

    if let (true, Some(dir)) = (file_logging_enabled, config.dir.as_deref()) {
        eprintln!("Logging to: {}/mt5-bridge.log", dir);
    }

    guard
}

fn log_dir_writable(log_dir: &str) -> bool {
    if std::fs::create_dir_all(log_dir).is_err() {
        return false;
    }
    let test_path = std::path::Path::new(log_dir).join(".mt5_bridge_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            true
        }
        Err(_) => false,
    }
}
