/*!
 * @file main.rs
 * @brief Persistor main entry point - document-store service proxy
 */

use std::sync::Arc;

use anyhow::anyhow;

use persistor::logger::LogLevel;
use persistor::shutdown::{ShutdownConfig, ShutdownManager, ShutdownReason};
use persistor::{
    persistor_error, persistor_info, Config, DocStore, MemoryStore, MongoStore, PersistorServer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🚀 Persistor starting...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/persistor.toml".to_string());
    let config = Config::load(&config_path).await?;
    println!("✅ Configuration loaded from {}", config_path);

    persistor::init_tracing_logger(
        log_level(&config.logging.level),
        config.logging.format == "detailed",
    )
    .map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    // Connect the backing store
    let store: Arc<dyn DocStore> = match config.driver.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        _ => Arc::new(MongoStore::connect(&config.driver).await?),
    };
    store.start().await?;
    println!("✅ Store backend ready ({})", config.driver.backend);

    // Shutdown coordination
    let shutdown = Arc::new(ShutdownManager::new(ShutdownConfig::default()));
    shutdown
        .start_signal_handling()
        .await
        .map_err(|e| anyhow!("failed to install signal handlers: {}", e))?;

    let server = PersistorServer::new(config.clone(), Arc::clone(&store));

    let reason = tokio::select! {
        result = server.start() => match result {
            Ok(()) => ShutdownReason::Request,
            Err(e) => {
                persistor_error!("Server terminated: {}", e);
                ShutdownReason::Error(e.to_string())
            }
        },
        reason = shutdown.wait_for_shutdown() => reason,
    };

    persistor_info!("Shutting down ({})", reason.as_str());
    shutdown.initiate_shutdown(reason).await;

    let store_for_cleanup = Arc::clone(&store);
    let _ = shutdown
        .graceful_shutdown(|| async move {
            store_for_cleanup.stop().await.map_err(|e| e.to_string())
        })
        .await;

    println!("👋 Persistor stopped");
    Ok(())
}

fn log_level(name: &str) -> LogLevel {
    match name.to_ascii_lowercase().as_str() {
        "debug" => LogLevel::Debug,
        "warn" | "warning" => LogLevel::Warning,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
