/*
 * Copyright (c) 2025 Persistor Team. All rights reserved.
 *
 * Persistor - Asynchronous document-store service proxy
 * Built with Rust for superior performance and reliability
 *
 * @file lib.rs
 * @brief Persistor library entry point
 */

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod logger;
pub mod memory;
pub mod mongo;
pub mod options;
pub mod server;
pub mod shutdown;
pub mod store;

// Re-export main types for external use
pub use config::{Config, DriverConfig};
pub use dispatch::ActionDispatcher;
pub use envelope::{Reply, Request, ACTION_HEADER, FAILURE_CODE};
pub use error::{PersistorError, Result};
pub use logger::{init_logger, init_tracing_logger, LogLevel, PersistorLogger};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use options::{FindOptions, UpdateOptions, WriteOption};
pub use server::PersistorServer;
pub use shutdown::{ShutdownConfig, ShutdownManager, ShutdownReason};
pub use store::DocStore;
