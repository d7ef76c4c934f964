/*
 * Copyright (c) 2025 Persistor Team. All rights reserved.
 *
 * Persistor - Asynchronous document-store service proxy
 * Built with Rust for superior performance and reliability
 *
 * @file config.rs
 * @brief Persistor configuration management
 */

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub driver: DriverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: u64,
}

/// Connection surface for the document-store backend. When
/// `connection_string` is set it wins over every other connection-related
/// field; the remaining fields still supply the database name and the
/// id-generation mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    pub backend: String,
    pub connection_string: Option<String>,
    pub db_name: String,
    pub host: String,
    pub port: u16,
    pub hosts: Vec<String>,
    pub replica_set: Option<String>,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub max_idle_time_ms: u64,
    pub connect_timeout_ms: u64,
    pub server_selection_timeout_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: String,
    pub use_object_id: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9017,
                max_connections: 1000,
                connection_timeout_ms: 5000,
                idle_timeout_ms: 60000,
            },
            driver: DriverConfig {
                backend: "mongodb".to_string(),
                connection_string: None,
                db_name: "default_db".to_string(),
                host: "127.0.0.1".to_string(),
                port: 27017,
                hosts: Vec::new(),
                replica_set: None,
                max_pool_size: 100,
                min_pool_size: 0,
                max_idle_time_ms: 0,
                connect_timeout_ms: 10000,
                server_selection_timeout_ms: 30000,
                username: None,
                password: None,
                auth_source: "admin".to_string(),
                use_object_id: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                output: "stderr".to_string(),
            },
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await?;

        let config: Config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        // parent() is Some("") for a bare file name
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
