//! Scenario S2: a second connection for an already-connected user demotes
//! the old one rather than dropping it outright, then force-closes it once
//! the grace window elapses unless it closed itself first.

use std::time::Duration;
use trivia_gateway::connection::{Connection, Stage};
use trivia_gateway::shard::{RegisterOutcome, Shard, ShardConfig};

#[tokio::test]
async fn replaced_connection_is_force_closed_after_grace_window() {
    let config = ShardConfig::builder()
        .replacement_grace(Duration::from_millis(20))
        .build();
    let shard = Shard::new_shared(0, config);

    let (first, _rx1) = Connection::new("user-1".into(), 4);
    let (second, _rx2) = Connection::new("user-1".into(), 4);

    matches!(shard.register("user-1".into(), first.clone()), RegisterOutcome::Fresh);
    let outcome = shard.register("user-1".into(), second.clone());

    let RegisterOutcome::Replaced { previous } = outcome else {
        panic!("expected Replaced, got a different outcome");
    };
    assert_eq!(previous.id(), first.id());
    assert_eq!(previous.stage(), Stage::Replaced);
    assert!(!previous.is_closed());

    shard.spawn_replacement_watchdog(previous.clone());
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(previous.is_closed());
    assert!(!second.is_closed());
    assert_eq!(shard.connection_for("user-1").unwrap().id(), second.id());
}

#[tokio::test]
async fn replaced_connection_that_closes_itself_is_left_alone() {
    let config = ShardConfig::builder()
        .replacement_grace(Duration::from_millis(50))
        .build();
    let shard = Shard::new_shared(0, config);

    let (first, _rx1) = Connection::new("user-1".into(), 4);
    let (second, _rx2) = Connection::new("user-1".into(), 4);

    shard.register("user-1".into(), first.clone());
    let outcome = shard.register("user-1".into(), second.clone());
    let RegisterOutcome::Replaced { previous } = outcome else {
        panic!("expected Replaced");
    };

    // Simulate the old client sending a close frame shortly after the new
    // one connects, before the grace window elapses.
    previous.close();
    shard.spawn_replacement_watchdog(previous.clone());
    tokio::time::sleep(Duration::from_millis(70)).await;

    assert!(previous.is_closed());
    assert!(!second.is_closed());
}
