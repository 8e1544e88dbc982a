//! Hub behaviour tests
//!
//! These drive a real hub loop through in-process connections, with tokio's
//! clock paused so scheduled deliveries can be checked against exact offsets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, mpsc as std_mpsc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::*;
use crate::config::HubConfig;
use crate::protocol::{Message, MessageType};
use crate::source::SequenceSource;
use crate::test_utils::{FIXTURE_JOINTS, fixed_source, recv_message, sequence_at};
use crate::types::{ActionSequence, ClientInfo, KeyFrame};
use crate::{RelayError, Result};

fn hub_with_frames(times: &[u64]) -> HubHandle {
    HubHandle::start(HubConfig::default(), fixed_source(times))
}

async fn attached(hub: &HubHandle) -> HubConnection {
    let mut connection = hub.attach().await.unwrap();
    let ack = recv_message(&mut connection).await;
    assert_eq!(ack.message_type(), Some(MessageType::Connection));
    assert_eq!(ack.data()["clientId"], connection.client_id());
    connection
}

fn request(kind: MessageType) -> Message {
    Message::new(kind.as_str(), serde_json::json!({}))
}

/// Serves one sequence, then reports itself unavailable.
struct ServesOnce {
    served: AtomicUsize,
    sequence: ActionSequence,
}

impl SequenceSource for ServesOnce {
    fn load(&self) -> Result<ActionSequence> {
        match self.served.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(self.sequence.clone()),
            _ => Err(RelayError::config("sequence store offline")),
        }
    }

    fn describe(&self) -> String {
        "serves once".to_string()
    }
}

/// Blocks every load until the test lets it through.
struct GatedSource {
    gate: Mutex<std_mpsc::Receiver<()>>,
    sequence: ActionSequence,
}

impl SequenceSource for GatedSource {
    fn load(&self) -> Result<ActionSequence> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.recv().map_err(|_| RelayError::config("gate dropped"))?;
        Ok(self.sequence.clone())
    }

    fn describe(&self) -> String {
        "gated".to_string()
    }
}

async fn attach_to(core: &mut HubCore) -> (u64, mpsc::UnboundedReceiver<Outgoing>) {
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (reply, assigned) = tokio::sync::oneshot::channel();
    core.handle(HubCommand::Attach { outbound, reply });
    (assigned.await.unwrap(), outbound_rx)
}

/// Wait for the blocking sequence load and hand its result to the core.
async fn finish_load(core: &mut HubCore, commands: &mut mpsc::UnboundedReceiver<HubCommand>) {
    let loaded = commands.recv().await.unwrap();
    assert!(matches!(loaded, HubCommand::SequenceLoaded { .. }), "got {loaded:?}");
    core.handle(loaded);
}

/// Message kinds sent so far, with a close as `"close"`.
fn sent_kinds(outbound: &mut mpsc::UnboundedReceiver<Outgoing>) -> Vec<String> {
    let mut kinds = vec![];
    while let Ok(outgoing) = outbound.try_recv() {
        kinds.push(match outgoing {
            Outgoing::Text(text) => Message::decode(&text).unwrap().kind().to_string(),
            Outgoing::Close => "close".to_string(),
        });
    }
    kinds
}

#[tokio::test(start_paused = true)]
async fn ids_are_assigned_in_connect_order() {
    let hub = hub_with_frames(&[0]);
    let a = attached(&hub).await;
    let b = attached(&hub).await;
    assert!(b.client_id() > a.client_id());
    assert_eq!(hub.clients().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn register_and_heartbeat_are_acknowledged() {
    let hub = hub_with_frames(&[0]);
    let mut conn = attached(&hub).await;

    conn.push(&Message::new("register", serde_json::json!({"type": "simulator", "name": "arm-1"})))
        .unwrap();
    let reply = recv_message(&mut conn).await;
    assert_eq!(reply.message_type(), Some(MessageType::RegisterSuccess));
    assert_eq!(reply.data()["name"], "arm-1");
    assert_eq!(reply.data()["type"], "simulator");

    conn.push(&Message::heartbeat()).unwrap();
    let reply = recv_message(&mut conn).await;
    assert_eq!(reply.message_type(), Some(MessageType::HeartbeatResponse));

    let clients: Vec<ClientInfo> = hub.clients().await.unwrap();
    assert_eq!(clients[0].name, "arm-1");
}

#[tokio::test(start_paused = true)]
async fn frames_arrive_at_their_offsets_then_complete() {
    let hub = hub_with_frames(&[0, 100, 250]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    let start = Instant::now();

    let begin = recv_message(&mut conn).await;
    assert_eq!(begin.message_type(), Some(MessageType::SequenceStart));
    assert_eq!(begin.data()["frameCount"], 3);

    for expected in [0u64, 100, 250] {
        let message = recv_message(&mut conn).await;
        assert_eq!(message.message_type(), Some(MessageType::SequenceFrame));
        let frame: KeyFrame = message.payload().unwrap();
        assert_eq!(frame.time, expected);
        assert_eq!(start.elapsed(), Duration::from_millis(expected));
    }

    let done = recv_message(&mut conn).await;
    assert_eq!(done.message_type(), Some(MessageType::SequenceComplete));
    assert_eq!(done.data()["success"], true);
    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_frames_not_yet_sent() {
    let hub = hub_with_frames(&[0, 100, 250, 500]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    let start = Instant::now();
    recv_message(&mut conn).await; // sequence_start
    let mut delivered = vec![];
    for _ in 0..2 {
        let frame: KeyFrame = recv_message(&mut conn).await.payload().unwrap();
        delivered.push(frame.time);
    }
    assert_eq!(delivered, vec![0, 100]);

    tokio::time::sleep_until(start + Duration::from_millis(120)).await;
    conn.push(&request(MessageType::StopSequenceRequest)).unwrap();

    let stopped = recv_message(&mut conn).await;
    assert_eq!(stopped.message_type(), Some(MessageType::SequenceStopped));
    assert_eq!(stopped.data()["success"], true);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(conn.try_recv(), None, "no frame or completion after stop");
}

#[tokio::test(start_paused = true)]
async fn new_request_replaces_scheduled_sequence() {
    let hub = hub_with_frames(&[0, 200, 400]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    recv_message(&mut conn).await; // sequence_start
    recv_message(&mut conn).await; // frame at 0

    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();

    let mut kinds = vec![];
    loop {
        let message = recv_message(&mut conn).await;
        let kind = message.kind().to_string();
        kinds.push(kind.clone());
        if kind == "sequence_complete" {
            break;
        }
    }
    assert_eq!(
        kinds,
        ["sequence_start", "sequence_frame", "sequence_frame", "sequence_frame", "sequence_complete"]
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.try_recv(), None, "first sequence must not complete");
}

#[tokio::test(start_paused = true)]
async fn robot_state_reaches_others_but_not_sender() {
    let hub = hub_with_frames(&[0]);
    let mut a = attached(&hub).await;
    let mut b = attached(&hub).await;
    let mut c = attached(&hub).await;

    let state = serde_json::json!({
        "joints": [{"name": "base", "angle": 12.5}],
        "timestamp": 42
    });
    a.push(&Message::new("robot_state", state)).unwrap();

    for peer in [&mut b, &mut c] {
        let update = recv_message(peer).await;
        assert_eq!(update.message_type(), Some(MessageType::RobotStateUpdate));
        assert_eq!(update.data()["sourceClientId"], a.client_id());
        assert_eq!(update.data()["joints"][0]["angle"], 12.5);
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(a.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn joint_control_is_echoed_to_sender() {
    let hub = hub_with_frames(&[0]);
    let mut a = attached(&hub).await;
    let mut b = attached(&hub).await;

    a.push(&Message::new("joint_control", serde_json::json!({"jointName": "elbow", "angle": 30.0})))
        .unwrap();
    let command = recv_message(&mut a).await;
    assert_eq!(command.message_type(), Some(MessageType::JointControlCommand));
    assert_eq!(command.data()["sourceClientId"], a.client_id());
    assert_eq!(command.data()["jointName"], "elbow");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(b.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn control_intents_echo_with_source() {
    let hub = hub_with_frames(&[0]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::EmergencyStop)).unwrap();
    let echo = recv_message(&mut conn).await;
    assert_eq!(echo.message_type(), Some(MessageType::EmergencyStop));
    assert_eq!(echo.data()["sourceClientId"], conn.client_id());
    assert!(echo.data()["timestamp"].as_u64().is_some());

    conn.push(&request(MessageType::ResetRobot)).unwrap();
    let echo = recv_message(&mut conn).await;
    assert_eq!(echo.message_type(), Some(MessageType::ResetRobot));
    assert_eq!(echo.data()["sourceClientId"], conn.client_id());
}

#[tokio::test(start_paused = true)]
async fn get_clients_returns_roster() {
    let hub = hub_with_frames(&[0]);
    let mut a = attached(&hub).await;
    let _b = attached(&hub).await;

    a.push(&request(MessageType::GetClients)).unwrap();
    let list = recv_message(&mut a).await;
    assert_eq!(list.message_type(), Some(MessageType::ClientsList));
    assert_eq!(list.data()["clients"].as_array().map(Vec::len), Some(2));
}

#[tokio::test(start_paused = true)]
async fn protocol_errors_keep_connection_open() {
    let hub = hub_with_frames(&[0]);
    let mut conn = attached(&hub).await;

    conn.push_text(r#"{"type": "warp_drive", "data": {}}"#).unwrap();
    let error = recv_message(&mut conn).await;
    assert_eq!(error.message_type(), Some(MessageType::Error));
    assert_eq!(error.data()["code"], "UNKNOWN_MESSAGE_TYPE");

    conn.push_text("{{{ not json").unwrap();
    let error = recv_message(&mut conn).await;
    assert_eq!(error.data()["code"], "INVALID_MESSAGE");

    conn.push(&Message::new("robot_state", serde_json::json!([1, 2, 3]))).unwrap();
    let error = recv_message(&mut conn).await;
    assert_eq!(error.data()["code"], "INVALID_MESSAGE");

    conn.push(&Message::heartbeat()).unwrap();
    let reply = recv_message(&mut conn).await;
    assert_eq!(reply.message_type(), Some(MessageType::HeartbeatResponse));
}

#[tokio::test(start_paused = true)]
async fn silent_clients_are_evicted_heartbeating_ones_are_not() {
    let hub = hub_with_frames(&[0]);
    let mut silent = attached(&hub).await;
    let mut chatty = attached(&hub).await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(15)).await;
        chatty.push(&Message::heartbeat()).unwrap();
        let reply = recv_message(&mut chatty).await;
        assert_eq!(reply.message_type(), Some(MessageType::HeartbeatResponse));
    }

    assert_eq!(silent.recv().await, Some(Outgoing::Close));
    assert_eq!(silent.recv().await, None);

    let clients = hub.clients().await.unwrap();
    assert_eq!(clients.iter().map(|c| c.id).collect::<Vec<_>>(), vec![chatty.client_id()]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_deliveries_idempotently() {
    let (commands, mut receiver) = mpsc::unbounded_channel();
    let mut core = HubCore::new(HubConfig::default(), fixed_source(&[0, 1_000, 2_000]), commands);
    let (client_id, mut outbound_rx) = attach_to(&mut core).await;

    let text = request(MessageType::TestSequenceRequest).encode().unwrap();
    core.handle(HubCommand::Inbound { client_id, text });
    assert!(core.is_loading(client_id));
    assert_eq!(core.scheduler().pending(client_id), 0);
    finish_load(&mut core, &mut receiver).await;
    assert!(!core.is_loading(client_id));
    assert_eq!(core.scheduler().pending(client_id), 1);

    core.handle(HubCommand::Detach { client_id });
    core.handle(HubCommand::Detach { client_id });
    assert_eq!(core.scheduler().pending(client_id), 0);
    assert!(core.roster().is_empty());

    // Deliveries queued before the detach are dropped by the loop.
    tokio::time::sleep(Duration::from_secs(3)).await;
    while let Ok(command) = receiver.try_recv() {
        core.handle(command);
    }
    assert_eq!(sent_kinds(&mut outbound_rx), ["connection", "sequence_start"]);
}

#[tokio::test(start_paused = true)]
async fn eviction_cancels_sequence_in_flight() {
    let (commands, mut receiver) = mpsc::unbounded_channel();
    let mut core = HubCore::new(HubConfig::default(), fixed_source(&[0, 1_000, 2_000]), commands);
    let (client_id, mut outbound_rx) = attach_to(&mut core).await;

    let text = request(MessageType::TestSequenceRequest).encode().unwrap();
    core.handle(HubCommand::Inbound { client_id, text });
    finish_load(&mut core, &mut receiver).await;
    let first_frame = receiver.recv().await.unwrap();
    core.handle(first_frame);
    assert_eq!(core.scheduler().pending(client_id), 1);

    let evicted = core.sweep(Instant::now() + Duration::from_secs(31));
    assert_eq!(evicted, vec![client_id]);
    assert_eq!(core.scheduler().pending(client_id), 0);
    assert!(core.roster().is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    while let Ok(command) = receiver.try_recv() {
        core.handle(command);
    }
    assert_eq!(
        sent_kinds(&mut outbound_rx),
        ["connection", "sequence_start", "sequence_frame", "close"]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_source_does_not_stall_the_loop() {
    let (open, gate) = std_mpsc::channel();
    let source = GatedSource { gate: Mutex::new(gate), sequence: sequence_at(&[0], FIXTURE_JOINTS) };
    let hub = HubHandle::start(HubConfig::default(), Box::new(source));
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    conn.push(&Message::heartbeat()).unwrap();
    let reply = recv_message(&mut conn).await;
    assert_eq!(reply.message_type(), Some(MessageType::HeartbeatResponse));
    assert_eq!(hub.clients().await.unwrap().len(), 1);

    open.send(()).unwrap();
    let begin = recv_message(&mut conn).await;
    assert_eq!(begin.message_type(), Some(MessageType::SequenceStart));
}

#[tokio::test(start_paused = true)]
async fn stop_during_load_discards_the_sequence() {
    let hub = hub_with_frames(&[0, 100]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    conn.push(&request(MessageType::StopSequenceRequest)).unwrap();
    let stopped = recv_message(&mut conn).await;
    assert_eq!(stopped.message_type(), Some(MessageType::SequenceStopped));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.try_recv(), None, "superseded load must not start");
}

#[tokio::test(start_paused = true)]
async fn back_to_back_requests_start_one_sequence() {
    let hub = hub_with_frames(&[0]);
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();

    let kinds: Vec<String> = [
        recv_message(&mut conn).await,
        recv_message(&mut conn).await,
        recv_message(&mut conn).await,
    ]
    .iter()
    .map(|m| m.kind().to_string())
    .collect();
    assert_eq!(kinds, ["sequence_start", "sequence_frame", "sequence_complete"]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(conn.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn failed_reload_keeps_current_sequence_running() {
    let source = ServesOnce {
        served: AtomicUsize::new(0),
        sequence: sequence_at(&[0, 100, 250], FIXTURE_JOINTS),
    };
    let hub = HubHandle::start(HubConfig::default(), Box::new(source));
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    let start = Instant::now();
    assert_eq!(recv_message(&mut conn).await.message_type(), Some(MessageType::SequenceStart));
    let first: KeyFrame = recv_message(&mut conn).await.payload().unwrap();
    assert_eq!(first.time, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    let error = recv_message(&mut conn).await;
    assert_eq!(error.message_type(), Some(MessageType::Error));
    assert_eq!(error.data()["code"], "SEQUENCE_UNAVAILABLE");

    for expected in [100u64, 250] {
        let frame: KeyFrame = recv_message(&mut conn).await.payload().unwrap();
        assert_eq!(frame.time, expected);
        assert_eq!(start.elapsed(), Duration::from_millis(expected));
    }
    let done = recv_message(&mut conn).await;
    assert_eq!(done.message_type(), Some(MessageType::SequenceComplete));
}

#[tokio::test(start_paused = true)]
async fn unavailable_source_reports_error() {
    let hub = HubHandle::start(
        HubConfig::default(),
        Box::new(crate::sources::FileSequenceSource::new("/nonexistent/sequence.json", 6)),
    );
    let mut conn = attached(&hub).await;

    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    let error = recv_message(&mut conn).await;
    assert_eq!(error.data()["code"], "SEQUENCE_UNAVAILABLE");
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_every_connection() {
    let hub = hub_with_frames(&[0, 5_000]);
    let mut conn = attached(&hub).await;
    conn.push(&request(MessageType::TestSequenceRequest)).unwrap();
    recv_message(&mut conn).await; // sequence_start
    recv_message(&mut conn).await; // frame at 0

    hub.shutdown();
    assert_eq!(conn.recv().await, Some(Outgoing::Close));
    assert_eq!(conn.recv().await, None);
    assert!(hub.clients().await.is_err());
}
