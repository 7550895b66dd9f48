use tracing_subscriber::EnvFilter;

use threat_modeling::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!(host = %config.server.host, port = config.server.port, "starting threat-modeling-service");

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&config.database.url)
        .await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = threat_modeling::build_app(config, pool).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Installs the `tracing` subscriber, optionally tee-ing to a rolling
/// log file. Returns the file-appender guard; dropping it would stop
/// flushing to disk, so `main` keeps it alive for the process lifetime.
fn init_logging(logging: &threat_modeling::config::LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &logging.file {
        Some(path) => {
            let directory = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "threat-modeling.log".to_string());
            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}
