/*!
 * @file server.rs
 * @brief Persistor server implementation
 */

use crate::config::Config;
use crate::dispatch::ActionDispatcher;
use crate::envelope::{Reply, Request};
use crate::error::Result;
use crate::logger::ConnectionTracker;
use crate::store::DocStore;
use crate::{persistor_debug, persistor_error, persistor_warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// TCP host for the service proxy. One JSON envelope per line in, one reply
/// line out. Requests on a single connection are processed in arrival
/// order; connections are independent of each other.
pub struct PersistorServer {
    config: Config,
    dispatcher: Arc<ActionDispatcher>,
    tracker: Arc<ConnectionTracker>,
    next_connection_id: AtomicU32,
}

impl PersistorServer {
    pub fn new(config: Config, store: Arc<dyn DocStore>) -> Self {
        let dispatcher = Arc::new(ActionDispatcher::new(store));
        let tracker = Arc::new(ConnectionTracker::new(config.server.max_connections));

        Self {
            config,
            dispatcher,
            tracker,
            next_connection_id: AtomicU32::new(1),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;

        println!("🚀 Persistor server listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener. Used directly by tests
    /// with an ephemeral port.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                    if let Err(reason) = self
                        .tracker
                        .add_connection(connection_id, addr.to_string())
                    {
                        persistor_warn!("Refusing connection from {}: {}", addr, reason);
                        drop(stream);
                        continue;
                    }

                    persistor_debug!(
                        "New connection {} from {} ({} active)",
                        connection_id,
                        addr,
                        self.tracker.get_connection_count()
                    );

                    let dispatcher = Arc::clone(&self.dispatcher);
                    let tracker = Arc::clone(&self.tracker);
                    tokio::spawn(handle_client(stream, dispatcher, tracker, connection_id));
                }
                Err(e) => {
                    eprintln!("❌ Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    dispatcher: Arc<ActionDispatcher>,
    tracker: Arc<ConnectionTracker>,
    connection_id: u32,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                persistor_error!("Connection {}: read failed: {}", connection_id, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let received = line.len() as u64;

        let request = match Request::from_json(&line) {
            Ok(request) => request,
            Err(e) => {
                // Malformed frames are fatal for the connection.
                let _ = write_reply(&mut writer, &Reply::failure(e.to_string())).await;
                persistor_error!("Connection {}: bad frame: {}", connection_id, e);
                break;
            }
        };

        tracker.increment_requests(connection_id);

        match dispatcher.dispatch(&request).await {
            Ok(Some(reply)) => {
                let sent = match write_reply(&mut writer, &reply).await {
                    Ok(sent) => sent,
                    Err(e) => {
                        persistor_error!("Connection {}: write failed: {}", connection_id, e);
                        break;
                    }
                };
                tracker.update_activity(connection_id, received, sent);
            }
            Ok(None) => {
                // Lifecycle actions complete silently.
                tracker.update_activity(connection_id, received, 0);
            }
            Err(e) => {
                // Protocol error: no facade call happened; report and close.
                let _ = write_reply(&mut writer, &Reply::failure(e.to_string())).await;
                persistor_error!("Connection {}: protocol error: {}", connection_id, e);
                break;
            }
        }
    }

    match tracker.get_connection_info(connection_id) {
        Some(info) => {
            persistor_debug!(
                "Connection {} from {} closed ({} requests, {} bytes in, {} bytes out)",
                connection_id,
                info.client_addr,
                info.requests_dispatched,
                info.bytes_received,
                info.bytes_sent
            );
        }
        None => {
            persistor_debug!("Connection {} closed", connection_id);
        }
    }
    tracker.remove_connection(connection_id);
}

async fn write_reply(
    writer: &mut (impl AsyncWriteExt + Unpin),
    reply: &Reply,
) -> Result<u64> {
    let frame = reply.to_json()?;
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(frame.len() as u64 + 1)
}
