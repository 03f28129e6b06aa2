//! Scenario S4 / Testable Properties 7-8: a hot shard gets rebalanced
//! toward a colder one, and migrated connections keep receiving broadcasts
//! afterward from their new shard.

use trivia_gateway::connection::Connection;
use trivia_gateway::{Hub, HubConfig};
use trivia_model::MessageType;

#[tokio::test]
async fn hot_shard_sheds_load_onto_the_coldest_shard() {
    let hub = Hub::new(
        HubConfig::builder()
            .shard_count(2)
            .rebalance_min_clients(5)
            .rebalance_ratio_trigger(1.2)
            .rebalance_batch(50)
            .build(),
    );

    // Bypass hash routing and register everyone directly on shard 0 so it's
    // unambiguously the hot one, same as the crate's own inline rebalance
    // tests do.
    let mut receivers = Vec::new();
    for i in 0..20 {
        let (conn, rx) = Connection::new(format!("user-{i}"), 8);
        conn.subscribe(MessageType::from("QUIZ_START"));
        hub.shard(0).register(format!("user-{i}"), conn);
        receivers.push((format!("user-{i}"), rx));
    }

    let plan = hub.plan_rebalance().expect("hot shard 0 should trigger a plan");
    assert_eq!(plan.from, 0);
    assert_eq!(plan.to, 1);

    let migrated = hub.apply_rebalance(plan).await;
    assert!(migrated > 0);
    assert!(hub.shard(1).client_count() >= migrated);
    assert_eq!(hub.shard(0).client_count() + hub.shard(1).client_count(), 20);

    hub.broadcast(MessageType::from("QUIZ_START"), r#"{"type":"QUIZ_START"}"#.into())
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    for (_user_id, mut rx) in receivers {
        assert!(rx.try_recv().is_ok(), "migrated connections must still receive broadcasts");
    }
}

#[tokio::test]
async fn balanced_shards_produce_no_plan() {
    let hub = Hub::new(
        HubConfig::builder()
            .shard_count(2)
            .rebalance_min_clients(5)
            .build(),
    );

    for i in 0..3 {
        let (conn, _rx) = Connection::new(format!("a-{i}"), 4);
        hub.shard(0).register(format!("a-{i}"), conn);
    }
    for i in 0..3 {
        let (conn, _rx) = Connection::new(format!("b-{i}"), 4);
        hub.shard(1).register(format!("b-{i}"), conn);
    }

    assert!(hub.plan_rebalance().is_none());
}
