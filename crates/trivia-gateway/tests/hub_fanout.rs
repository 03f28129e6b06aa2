//! Scenario S1: a broadcast reaches every subscribed connection across
//! every shard and skips unsubscribed ones, end to end through [`Hub`]'s
//! real priority-queue-backed dispatch loops (not the inline per-shard
//! fanout helpers the unit tests exercise directly).

use trivia_gateway::connection::Connection;
use trivia_gateway::{Hub, HubConfig};
use trivia_model::MessageType;

#[tokio::test]
async fn broadcast_respects_subscriptions_across_shards() {
    let hub = Hub::new(HubConfig::builder().shard_count(4).worker_count(2).build());

    let mut subscribed = Vec::new();
    for i in 0..8 {
        let (conn, rx) = Connection::new(format!("subscribed-{i}"), 8);
        conn.subscribe(MessageType::from("QUIZ_START"));
        hub.register(format!("subscribed-{i}"), conn);
        subscribed.push(rx);
    }

    let mut unsubscribed = Vec::new();
    for i in 0..8 {
        let (conn, rx) = Connection::new(format!("unsubscribed-{i}"), 8);
        conn.subscribe(MessageType::from("RESULT_UPDATE"));
        hub.register(format!("unsubscribed-{i}"), conn);
        unsubscribed.push(rx);
    }

    hub.broadcast(MessageType::from("QUIZ_START"), r#"{"type":"QUIZ_START"}"#.into())
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    for mut rx in subscribed {
        assert!(rx.try_recv().is_ok(), "subscribed connection should have received the frame");
    }
    for mut rx in unsubscribed {
        assert!(rx.try_recv().is_err(), "unsubscribed connection should not have received the frame");
    }
}

#[tokio::test]
async fn system_distinguished_types_bypass_subscriptions() {
    let hub = Hub::new(HubConfig::builder().shard_count(2).build());
    let (conn, mut rx) = Connection::new("user-1".into(), 8);
    conn.subscribe(MessageType::from("QUIZ_START"));
    hub.register("user-1".into(), conn);

    hub.broadcast(MessageType::from("token_revoked"), r#"{"type":"token_revoked"}"#.into())
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(rx.try_recv().is_ok());
}
