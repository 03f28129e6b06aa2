//! TriviaHub's real-time WebSocket fan-out core, wired up as an axum
//! service.

mod routes;
mod ticket;

use axum::routing::{get, post};
use axum::Router;
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use trivia_gateway::cluster::ClusterBridge;
use trivia_gateway::{EventManager, GatewayConfig, Hub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::default();
    let cluster_config = config.cluster.clone();
    let hub = Arc::new(Hub::with_shard_config(config.hub, config.shard));
    let _background = hub.start();

    if let Some(cluster_config) = cluster_config {
        match ClusterBridge::connect(
            &cluster_config.redis_url,
            cluster_config.channel,
            hub.origin_id().to_owned(),
            hub.alert_sink(),
            hub.metrics(),
        )
        .await
        {
            Ok(bridge) => {
                hub.attach_cluster(Arc::clone(&bridge));
                let subscriber_hub = Arc::clone(&hub);
                bridge.spawn_subscriber(move |frame, target_user_id| match target_user_id {
                    Some(user_id) => subscriber_hub.deliver_local_unicast(&user_id, frame),
                    None => subscriber_hub.deliver_local(frame),
                });
            }
            Err(error) => tracing::error!(%error, "failed to connect cluster bridge"),
        }
    }

    let manager = EventManager::new(hub);

    let state = AppState {
        manager,
        tickets: Arc::new(ticket::TicketStore::new()),
        connection_config: config.connection,
    };

    let app = Router::new()
        .route("/ws", get(routes::upgrade_ws))
        .route("/auth/ws-ticket", post(routes::issue_ticket))
        .route("/api/ws/metrics", get(routes::metrics))
        .route("/api/ws/health", get(routes::health))
        .route("/api/ws/shards", get(routes::shards))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "trivia-server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
