use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;

/// Create an in-memory SQLite database with migrations applied, for
/// HTTP-level integration tests.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("failed to create test database");

    sqlx::migrate!("./migrations").run(&pool).await.expect("failed to run migrations");

    pool
}

/// A `Config` with in-memory-friendly defaults: no LLM providers
/// configured (the analyzer surface is not exercised by these tests),
/// generous guardrail thresholds, and a temp upload directory.
pub fn test_config(upload_dir: &std::path::Path) -> threat_modeling::config::Config {
    let mut config = threat_modeling::config::Config::default();
    config.storage.upload_dir = upload_dir.to_string_lossy().to_string();
    config.server.worker_count = 1;
    config
}

/// A small, real PNG encoded in memory, for tests that need a valid upload.
pub fn tiny_png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(48, 48, image::Rgb([20, 40, 60]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
