//! Read and write loops for a single transport (spec.md §4.1).
//!
//! Mirrors the shape of the teacher's shard processor loop
//! (`gateway/src/shard/processor/impl.rs`): two independent tasks sharing a
//! [`Connection`] handle, one driving inbound frames into a dispatch
//! callback, the other draining the outbound channel onto the socket with
//! a periodic keepalive ping.

use super::{Connection, ConnectionConfig};
use crate::error::{Error, ErrorKind};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the read loop hands each inbound text frame to.
///
/// Implemented by the event manager; kept as a trait here so `io.rs` has no
/// dependency on `crate::manager`, avoiding a cycle between the connection
/// and manager modules.
#[async_trait::async_trait]
pub trait InboundDispatch: Send + Sync {
    async fn dispatch(&self, connection: &Connection, raw: &str);
}

/// Split `socket` and spawn its read and write loops, returning their join
/// handles so the caller (the shard) can await both at unregistration.
pub fn spawn_io_loops(
    socket: WebSocket,
    connection: Connection,
    outbound_rx: mpsc::Receiver<String>,
    config: ConnectionConfig,
    dispatch: Arc<dyn InboundDispatch>,
    unregister: mpsc::UnboundedSender<crate::ids::ConnectionId>,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let (sink, stream) = socket.split();

    let read_handle = tokio::spawn(read_loop(
        stream,
        connection.clone(),
        config.clone(),
        dispatch,
        unregister.clone(),
    ));

    let write_handle = tokio::spawn(write_loop(
        sink,
        connection,
        outbound_rx,
        config,
        unregister,
    ));

    (read_handle, write_handle)
}

async fn read_loop(
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    connection: Connection,
    config: ConnectionConfig,
    dispatch: Arc<dyn InboundDispatch>,
    unregister: mpsc::UnboundedSender<crate::ids::ConnectionId>,
) {
    let max_bytes = config.max_inbound_frame_bytes();

    loop {
        let next = tokio::time::timeout(config.pong_wait(), stream.next()).await;

        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(source))) => {
                let err = Error::with_source(
                    ErrorKind::TransportRead {
                        connection: connection.id().to_string(),
                    },
                    source,
                );
                debug!(error = %err, "read loop exiting on transport error");
                break;
            }
            Ok(None) => break,
            Err(_elapsed) => {
                debug!(connection = %connection.id(), "read loop timed out waiting for activity");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                connection.touch();
                if text.len() > max_bytes {
                    warn!(
                        connection = %connection.id(),
                        len = text.len(),
                        max = max_bytes,
                        "dropping oversized inbound frame"
                    );
                    continue;
                }
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                dispatch.dispatch(&connection, trimmed).await;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                connection.touch();
            }
            WsMessage::Close(_) => {
                debug!(connection = %connection.id(), "peer initiated close");
                break;
            }
            WsMessage::Binary(_) => {
                // Non-goal per spec.md §4.1: binary frame support is out of
                // scope. Treat as activity and otherwise ignore.
                connection.touch();
            }
        }
    }

    connection.close();
    let _ = unregister.send(connection.id());
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    connection: Connection,
    mut outbound_rx: mpsc::Receiver<String>,
    config: ConnectionConfig,
    unregister: mpsc::UnboundedSender<crate::ids::ConnectionId>,
) {
    let keepalive = config.ping_period();
    let mut ticker = tokio::time::interval(keepalive);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately; consume it so the first real keepalive
    // is one full period out.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            frame = outbound_rx.recv() => {
                let Some(mut frame) = frame else { break };

                // Coalesce whatever else is already queued so a burst of
                // broadcasts doesn't serialize into one frame per syscall.
                while let Ok(more) = outbound_rx.try_recv() {
                    frame.push('\n');
                    frame.push_str(&more);
                }

                let write = tokio::time::timeout(
                    config.write_wait(),
                    sink.send(WsMessage::Text(frame)),
                )
                .await;

                match write {
                    Ok(Ok(())) => {}
                    Ok(Err(source)) => {
                        let err = Error::with_source(
                            ErrorKind::TransportWrite {
                                connection: connection.id().to_string(),
                            },
                            source,
                        );
                        debug!(error = %err, "write loop exiting on transport error");
                        break;
                    }
                    Err(_elapsed) => {
                        warn!(connection = %connection.id(), "write deadline exceeded");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    connection.close();
    let _ = unregister.send(connection.id());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_shorter_than_pong_wait() {
        let config = ConnectionConfig::default();
        assert!(config.ping_period() < config.pong_wait());
    }
}
