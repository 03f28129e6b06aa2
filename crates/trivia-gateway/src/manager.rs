//! The event manager façade (spec.md §3 `EventManager`, §4.7, C8).
//!
//! Sits in front of the [`Hub`]: owns the inbound type→handler map, resolves
//! outbound priority statically from [`Priority::for_message_type`], and
//! exposes the small set of domain helper methods (`broadcast_quiz_start`
//! and friends) that the rest of the platform actually calls, so callers
//! never construct a raw [`trivia_model::Message`] themselves.

use crate::connection::io::InboundDispatch;
use crate::connection::Connection;
use crate::hub::Hub;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};
use trivia_model::{Message, MessageType};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
type Handler = Arc<dyn Fn(Connection, Value) -> HandlerFuture + Send + Sync>;

/// Dispatches inbound frames to registered handlers and exposes outbound
/// broadcast/unicast helpers over a [`Hub`].
pub struct EventManager {
    hub: Arc<Hub>,
    handlers: DashMap<MessageType, Handler>,
}

impl EventManager {
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Arc<Self> {
        Arc::new(EventManager {
            hub,
            handlers: DashMap::new(),
        })
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Register a handler for an inbound message type. Overwrites any
    /// prior handler for the same type.
    pub fn on<F, Fut>(&self, message_type: impl Into<MessageType>, handler: F)
    where
        F: Fn(Connection, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.handlers.insert(
            message_type.into(),
            Arc::new(move |connection, data| Box::pin(handler(connection, data))),
        );
    }

    async fn handle_raw(&self, connection: &Connection, raw: &str) {
        let parsed: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => {
                self.send_system_error(connection, "unparseable_message").await;
                return;
            }
        };

        let Some(message_type) = parsed.get("type").and_then(Value::as_str) else {
            self.send_system_error(connection, "missing_message_type").await;
            return;
        };
        let message_type = MessageType::from(message_type);
        let data = parsed.get("data").cloned().unwrap_or(Value::Null);

        let Some(handler) = self.handlers.get(&message_type).map(|entry| Arc::clone(&entry)) else {
            debug!(%message_type, "no handler registered");
            self.send_system_error(connection, "unsupported_message_type").await;
            return;
        };

        if let Err(reason) = handler(connection.clone(), data).await {
            warn!(%message_type, %reason, "handler failed");
            self.send_processing_error(connection, &message_type, &reason).await;
        }
    }

    async fn send_system_error(&self, connection: &Connection, reason: &str) {
        let message = Message::new(
            MessageType::from("system:error"),
            serde_json::json!({ "reason": reason }),
        );
        connection.send(message.to_frame());
    }

    async fn send_processing_error(&self, connection: &Connection, message_type: &MessageType, reason: &str) {
        let message = Message::new(
            MessageType::from("processing_error"),
            serde_json::json!({ "type": message_type.0, "reason": reason }),
        );
        connection.send(message.to_frame());
    }

    /// Broadcast an arbitrary typed message to every subscriber.
    pub async fn broadcast(&self, message_type: impl Into<MessageType>, data: Value) {
        let message_type = message_type.into();
        let message = Message::new(message_type.clone(), data);
        self.hub.broadcast(message_type, message.to_frame()).await;
    }

    pub async fn unicast(&self, user_id: &str, message_type: impl Into<MessageType>, data: Value) {
        let message = Message::new(message_type.into(), data);
        let _ = self.hub.unicast(user_id, message.to_frame()).await;
    }

    pub async fn broadcast_quiz_start(&self, quiz_id: &str) {
        self.broadcast("QUIZ_START", serde_json::json!({ "quiz_id": quiz_id })).await;
    }

    pub async fn broadcast_quiz_end(&self, quiz_id: &str) {
        self.broadcast("QUIZ_END", serde_json::json!({ "quiz_id": quiz_id })).await;
    }

    pub async fn broadcast_question_start(&self, quiz_id: &str, question_id: &str) {
        self.broadcast(
            "QUESTION_START",
            serde_json::json!({ "quiz_id": quiz_id, "question_id": question_id }),
        )
        .await;
    }

    pub async fn broadcast_question_end(&self, quiz_id: &str, question_id: &str) {
        self.broadcast(
            "QUESTION_END",
            serde_json::json!({ "quiz_id": quiz_id, "question_id": question_id }),
        )
        .await;
    }

    pub async fn broadcast_result_update(&self, quiz_id: &str, results: Value) {
        self.broadcast(
            "RESULT_UPDATE",
            serde_json::json!({ "quiz_id": quiz_id, "results": results }),
        )
        .await;
    }

    pub async fn send_token_expiry_warning(&self, user_id: &str, expires_in_seconds: u64) {
        self.unicast(
            user_id,
            "token_about_to_expire",
            serde_json::json!({ "expires_in_seconds": expires_in_seconds }),
        )
        .await;
    }

    pub async fn broadcast_token_revoked(&self, user_id: &str) {
        self.broadcast(
            "token_revoked",
            serde_json::json!({ "user_id": user_id }),
        )
        .await;
    }
}

#[async_trait]
impl InboundDispatch for EventManager {
    async fn dispatch(&self, connection: &Connection, raw: &str) {
        self.handle_raw(connection, raw).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;

    #[tokio::test]
    async fn unregistered_type_gets_a_system_error_reply() {
        let hub = Arc::new(Hub::new(HubConfig::builder().shard_count(1).build()));
        let manager = EventManager::new(hub);
        let (conn, mut rx) = Connection::new("user-1".into(), 4);

        manager
            .handle_raw(&conn, r#"{"type":"NOT_REGISTERED","data":{}}"#)
            .await;

        let frame = rx.try_recv().expect("expected a system:error reply");
        assert!(frame.contains("system:error"));
    }

    #[tokio::test]
    async fn registered_handler_runs() {
        let hub = Arc::new(Hub::new(HubConfig::builder().shard_count(1).build()));
        let manager = EventManager::new(hub);
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);

        manager.on("PING", move |_conn, _data| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });

        let (conn, _rx) = Connection::new("user-1".into(), 4);
        manager.handle_raw(&conn, r#"{"type":"PING","data":{}}"#).await;
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
    }
}
