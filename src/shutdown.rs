/*
 * Copyright (c) 2025 Persistor Team. All rights reserved.
 *
 * Persistor - Asynchronous document-store service proxy
 * Built with Rust for superior performance and reliability
 *
 * @file shutdown.rs
 * @brief Graceful shutdown and signal handling
 */

use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(i32),
    Request,
    Error(String),
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::Request => "request",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub graceful_timeout: Duration,
    pub signal_handling: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            signal_handling: true,
        }
    }
}

#[derive(Debug)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    is_shutting_down: RwLock<bool>,
    shutdown_reason: Mutex<Option<ShutdownReason>>,
    config: ShutdownConfig,
}

impl ShutdownManager {
    pub fn new(config: ShutdownConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(16);

        Self {
            shutdown_tx,
            is_shutting_down: RwLock::new(false),
            shutdown_reason: Mutex::new(None),
            config,
        }
    }

    pub async fn start_signal_handling(
        &self,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.signal_handling {
            return Ok(());
        }

        // Handle SIGTERM
        let shutdown_tx_sigterm = self.shutdown_tx.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };

            sigterm.recv().await;
            info!("Received SIGTERM, initiating graceful shutdown");
            let _ = shutdown_tx_sigterm.send(ShutdownReason::Signal(15));
        });

        // Handle SIGINT (Ctrl+C)
        let shutdown_tx_sigint = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    let _ = shutdown_tx_sigint.send(ShutdownReason::Signal(2));
                }
                Err(e) => error!("Failed to wait for SIGINT: {}", e),
            }
        });

        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.is_shutting_down.read().await
    }

    pub async fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.shutdown_reason.lock().await.clone()
    }

    pub async fn initiate_shutdown(&self, reason: ShutdownReason) {
        let mut is_shutting_down = self.is_shutting_down.write().await;
        if *is_shutting_down {
            debug!("Shutdown already in progress");
            return;
        }

        *is_shutting_down = true;
        drop(is_shutting_down);

        let mut shutdown_reason = self.shutdown_reason.lock().await;
        *shutdown_reason = Some(reason.clone());
        drop(shutdown_reason);

        info!("Initiating graceful shutdown: {:?}", reason);

        // Notify all subscribers
        let _ = self.shutdown_tx.send(reason);
    }

    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut rx = self.subscribe();
        rx.recv().await.expect("Shutdown channel closed")
    }

    /// Runs the cleanup under the configured timeout. Must be called after
    /// `initiate_shutdown`.
    pub async fn graceful_shutdown<F, Fut>(&self, cleanup_fn: F) -> Result<(), String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        if !self.is_shutting_down().await {
            return Err("Shutdown not initiated".to_string());
        }

        let start_time = Instant::now();
        info!("Starting graceful shutdown process");

        match timeout(self.config.graceful_timeout, cleanup_fn()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Cleanup failed: {}", e),
            Err(_) => warn!(
                "Cleanup timed out after {:?}",
                self.config.graceful_timeout
            ),
        }

        info!("Graceful shutdown completed in {:?}", start_time.elapsed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_manager() {
        let config = ShutdownConfig::default();
        let manager = ShutdownManager::new(config);

        assert!(!manager.is_shutting_down().await);
        assert!(manager.shutdown_reason().await.is_none());

        manager.initiate_shutdown(ShutdownReason::Request).await;

        assert!(manager.is_shutting_down().await);
        assert_eq!(manager.shutdown_reason().await, Some(ShutdownReason::Request));
    }

    #[tokio::test]
    async fn test_shutdown_subscription() {
        let config = ShutdownConfig::default();
        let manager = ShutdownManager::new(config);

        let mut rx = manager.subscribe();

        // Initiate shutdown
        manager.initiate_shutdown(ShutdownReason::Signal(15)).await;

        // Wait for shutdown signal
        let reason = rx.recv().await.unwrap();
        assert_eq!(reason, ShutdownReason::Signal(15));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_runs_cleanup() {
        let manager = ShutdownManager::new(ShutdownConfig::default());
        manager.initiate_shutdown(ShutdownReason::Request).await;

        let cleaned = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = cleaned.clone();
        let result = manager
            .graceful_shutdown(|| async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.is_ok());
        assert!(cleaned.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_requires_initiation() {
        let manager = ShutdownManager::new(ShutdownConfig::default());
        let result = manager.graceful_shutdown(|| async { Ok(()) }).await;
        assert!(result.is_err());
    }
}
