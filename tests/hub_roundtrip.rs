//! End-to-end relay over real WebSocket connections on loopback

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use simrelay::config::{ClientConfig, HubConfig, PlaybackConfig, SyncConfig};
use simrelay::protocol::MessageType;
use simrelay::{
    ConnectionStatus, ControlSession, HubHandle, RelayHub, SimulatedArm, TransportClient,
    UpdateRate,
};

const WAIT: Duration = Duration::from_secs(5);

async fn start_hub() -> HubHandle {
    let config = HubConfig { listen_address: "127.0.0.1:0".to_string(), ..HubConfig::default() };
    RelayHub::bind(config).await.expect("bind loopback").spawn().expect("spawn hub")
}

fn client_for(hub: &HubHandle, name: &str) -> TransportClient {
    let config = ClientConfig {
        url: hub.url().expect("hub is listening"),
        name: name.to_string(),
        reconnect_delay_ms: 100,
        ..ClientConfig::default()
    };
    TransportClient::websocket(config)
}

#[tokio::test]
async fn robot_state_is_mirrored_to_peers() {
    let hub = start_hub().await;
    let sender = client_for(&hub, "arm");
    let receiver = client_for(&hub, "panel");

    let sender_id = timeout(WAIT, sender.connect()).await.unwrap().unwrap();
    timeout(WAIT, receiver.connect()).await.unwrap().unwrap();
    let mut updates = receiver.subscribe(MessageType::RobotStateUpdate.as_str());
    let mut echoes = sender.subscribe(MessageType::RobotStateUpdate.as_str());

    sender.send(
        MessageType::RobotState,
        &json!({"joints": [{"name": "elbow", "angle": 12.0}], "timestamp": 1}),
    );

    let update = timeout(WAIT, updates.next()).await.unwrap().unwrap();
    assert_eq!(update.data()["sourceClientId"], sender_id);
    assert_eq!(update.data()["joints"][0]["angle"], 12.0);

    // The sender never gets its own state back.
    assert!(timeout(Duration::from_millis(200), echoes.next()).await.is_err());

    let clients = timeout(WAIT, hub.clients()).await.unwrap().unwrap();
    assert_eq!(clients.len(), 2);
    hub.shutdown();
}

#[tokio::test]
async fn sessions_share_state_through_the_hub() {
    let hub = start_hub().await;
    let publisher_client = client_for(&hub, "publisher");
    let observer_client = client_for(&hub, "observer");
    timeout(WAIT, publisher_client.connect()).await.unwrap().unwrap();
    timeout(WAIT, observer_client.connect()).await.unwrap().unwrap();

    let observer = ControlSession::with_observer(
        observer_client,
        Arc::new(SimulatedArm::six_axis()),
        &PlaybackConfig::default(),
        &SyncConfig::default(),
        Arc::new(simrelay::playback::TracingObserver),
    );
    let mut states = observer.remote_states(UpdateRate::Every);

    let sync = SyncConfig { enabled: true, interval_ms: 50, ..SyncConfig::default() };
    let publisher = ControlSession::with_observer(
        publisher_client,
        Arc::new(SimulatedArm::six_axis()),
        &PlaybackConfig::default(),
        &sync,
        Arc::new(simrelay::playback::TracingObserver),
    );

    let update = timeout(WAIT, states.next()).await.unwrap().unwrap();
    assert_eq!(Some(update.source_client_id), publisher.client().client_id());
    assert_eq!(update.state.joints.len(), 6);
    hub.shutdown();
}

#[tokio::test]
async fn hub_shutdown_ends_in_failed_status() {
    let hub = start_hub().await;
    let client = client_for(&hub, "orphan");
    timeout(WAIT, client.connect()).await.unwrap().unwrap();

    hub.shutdown();

    let mut status = client.status_watch();
    timeout(WAIT, status.wait_for(|s| *s == ConnectionStatus::Failed))
        .await
        .expect("reconnection gives up")
        .expect("client still running");
}
