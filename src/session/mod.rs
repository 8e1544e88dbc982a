//! Session facade binding a transport client, a playback queue and a model
//!
//! [`ControlSession`] turns hub traffic into model motion and operator
//! intents into hub traffic:
//!
//! | inbound | effect |
//! |---|---|
//! | `joint_control_command` | set joints instantly, or animate when `duration` > 0 |
//! | `reset_robot` | animate back to the model's default pose |
//! | `emergency_stop` | cancel model motion, stop playback, ask the hub to stop pushing frames |
//! | `sequence_start` / `sequence_frame` | start a playback session / buffer a frame |
//! | `sequence_stopped` | stop playback |

mod sync;

pub use sync::capture_state;

use futures::{Stream, StreamExt, future};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PlaybackConfig, RelayConfig, SyncConfig};
use crate::model::RobotModel;
use crate::playback::{
    FrameQueue, JointTween, PlaybackObserver, PlaybackSnapshot, TracingObserver, TweenOutcome,
};
use crate::protocol::payloads::{ControlIntent, SequenceRequest, SequenceStart};
use crate::protocol::{Message, MessageType};
use crate::stream::ThrottleExt;
use crate::transport::{ListenerId, TransportClient};
use crate::types::{
    JointControlCommand, JointControlData, KeyFrame, RobotStateData, RobotStateUpdate,
    UpdateRate, timestamp_ms,
};
use crate::Result;

/// Duration of the animated return to the default pose.
const RESET_DURATION: Duration = Duration::from_secs(1);

/// Mirrored robot states from other clients.
pub type RobotStateStream = Pin<Box<dyn Stream<Item = RobotStateUpdate> + Send>>;

struct SessionInner {
    client: TransportClient,
    model: Arc<dyn RobotModel>,
    queue: FrameQueue,
    observer: Arc<dyn PlaybackObserver>,
    tween_step: Duration,
    sync: SyncConfig,
    motion: Mutex<CancellationToken>,
    sync_task: Mutex<Option<CancellationToken>>,
}

/// Binds a [`TransportClient`], a [`FrameQueue`] and a [`RobotModel`].
///
/// Dropping the session unregisters its listeners and stops all motion it
/// started; the client stays usable.
pub struct ControlSession {
    inner: Arc<SessionInner>,
    listeners: Vec<ListenerId>,
}

impl ControlSession {
    pub fn new(client: TransportClient, model: Arc<dyn RobotModel>, config: &RelayConfig) -> Self {
        Self::with_observer(client, model, &config.playback, &config.sync, Arc::new(TracingObserver))
    }

    /// Like [`new`](Self::new) with a custom playback observer.
    pub fn with_observer(
        client: TransportClient,
        model: Arc<dyn RobotModel>,
        playback: &PlaybackConfig,
        sync: &SyncConfig,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            queue: FrameQueue::new(model.clone(), playback),
            client,
            model,
            observer,
            tween_step: playback.tween_step(),
            sync: sync.clone(),
            motion: Mutex::new(CancellationToken::new()),
            sync_task: Mutex::new(None),
        });

        let listeners = vec![
            listen(&inner, MessageType::JointControlCommand, |inner, message| {
                let command: JointControlCommand = message.payload()?;
                debug!(source = command.source_client_id, "Joint control command");
                inner.apply_control(&command.control)
            }),
            listen(&inner, MessageType::ResetRobot, |inner, _| {
                inner.reset_pose();
                Ok(())
            }),
            listen(&inner, MessageType::EmergencyStop, |inner, _| {
                inner.halt("emergency stop from hub");
                Ok(())
            }),
            listen(&inner, MessageType::SequenceStart, |inner, message| {
                let start: SequenceStart = message.payload()?;
                info!(
                    frames = start.frame_count,
                    duration_ms = start.duration_ms,
                    description = %start.meta.description,
                    "Sequence starting"
                );
                inner.queue.start(inner.observer.clone());
                Ok(())
            }),
            listen(&inner, MessageType::SequenceFrame, |inner, message| {
                let frame: KeyFrame = message.payload()?;
                inner.queue.enqueue(frame);
                Ok(())
            }),
            listen(&inner, MessageType::SequenceComplete, |inner, _| {
                info!(buffered = inner.queue.snapshot().buffered, "Sequence delivery complete");
                Ok(())
            }),
            listen(&inner, MessageType::SequenceStopped, |inner, _| {
                inner.queue.stop();
                Ok(())
            }),
        ];

        let session = Self { inner, listeners };
        if sync.enabled {
            session.start_state_sync();
        }
        session
    }

    /// Stop all motion at once and tell the hub. The echoed
    /// `emergency_stop` repeats the same idempotent cancellation.
    pub fn emergency_stop(&self) {
        self.inner.halt("operator emergency stop");
        let intent = ControlIntent {
            source_client_id: self.inner.client.client_id(),
            timestamp: Some(timestamp_ms()),
        };
        self.inner.client.send(MessageType::EmergencyStop, &intent);
    }

    /// Ask the hub to relay a reset; the echo drives the model home.
    pub fn request_reset(&self) {
        let intent = ControlIntent { source_client_id: self.inner.client.client_id(), timestamp: None };
        self.inner.client.send(MessageType::ResetRobot, &intent);
    }

    /// Send a joint control intent through the hub.
    pub fn send_joint_control(&self, control: &JointControlData) {
        self.inner.client.send(MessageType::JointControl, control);
    }

    /// Ask the hub to push its test sequence.
    pub fn request_test_sequence(&self) {
        let request = SequenceRequest { client_id: self.inner.client.client_id() };
        self.inner.client.send(MessageType::TestSequenceRequest, &request);
    }

    /// Stop local playback and ask the hub to stop pushing frames.
    pub fn stop_sequence(&self) {
        self.inner.queue.stop();
        self.inner.request_hub_stop();
    }

    pub fn request_clients(&self) {
        let intent = ControlIntent { source_client_id: self.inner.client.client_id(), timestamp: None };
        self.inner.client.send(MessageType::GetClients, &intent);
    }

    /// Current model state as it would be published.
    pub fn state(&self) -> RobotStateData {
        capture_state(self.inner.model.as_ref(), self.inner.sync.gripping_threshold)
    }

    /// Publish the current state once.
    pub fn publish_state(&self) {
        self.inner.client.send(MessageType::RobotState, &self.state());
    }

    /// Start periodic publication. Does nothing if already running.
    pub fn start_state_sync(&self) {
        let mut task = lock(&self.inner.sync_task);
        if task.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *task = Some(cancel.clone());

        let (client, model, config) =
            (self.inner.client.clone(), self.inner.model.clone(), self.inner.sync.clone());
        tokio::spawn(async move {
            sync::publish_states(client, model, config, cancel).await;
        });
    }

    pub fn stop_state_sync(&self) {
        if let Some(cancel) = lock(&self.inner.sync_task).take() {
            cancel.cancel();
        }
    }

    pub fn is_syncing(&self) -> bool {
        lock(&self.inner.sync_task).is_some()
    }

    /// Robot states published by other clients, at most `rate` per source.
    pub fn remote_states(&self, rate: UpdateRate) -> RobotStateStream {
        let updates = self
            .inner
            .client
            .subscribe(MessageType::RobotStateUpdate.as_str())
            .filter_map(|message| {
                let update = match message.payload::<RobotStateUpdate>() {
                    Ok(update) => Some(update),
                    Err(e) => {
                        warn!("Dropping malformed robot state update: {}", e);
                        None
                    }
                };
                future::ready(update)
            });

        match rate.interval() {
            None => updates.boxed(),
            Some(period) => updates
                .throttle_latest_by(period, |update: &RobotStateUpdate| update.source_client_id)
                .boxed(),
        }
    }

    pub fn playback(&self) -> PlaybackSnapshot {
        self.inner.queue.snapshot()
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.inner.queue
    }

    pub fn client(&self) -> &TransportClient {
        &self.inner.client
    }

    pub fn model(&self) -> &Arc<dyn RobotModel> {
        &self.inner.model
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.inner.client.off(id);
        }
        self.stop_state_sync();
        lock(&self.inner.motion).cancel();
        self.inner.queue.stop();
    }
}

impl SessionInner {
    fn apply_control(&self, control: &JointControlData) -> Result<()> {
        let known = self.model.joint_names();
        let (targets, unknown): (Vec<_>, Vec<_>) =
            control.targets().into_iter().partition(|target| known.contains(&target.name));
        for target in unknown {
            warn!(joint = %target.name, "Unknown joint in control command, skipped");
        }

        match control.transition() {
            Some(duration) => {
                let tween = JointTween::new(targets, duration).with_gripper(control.gripper_openness);
                self.animate(tween, "joint control");
            }
            None => {
                lock(&self.motion).cancel();
                for target in &targets {
                    self.model.set_joint_angle(&target.name, target.angle)?;
                }
                if let Some(openness) = control.gripper_openness {
                    self.model.set_gripper_openness(openness)?;
                }
            }
        }
        Ok(())
    }

    fn reset_pose(&self) {
        info!("Resetting to default pose");
        let tween = JointTween::new(self.model.default_pose(), RESET_DURATION)
            .with_gripper(self.model.default_gripper());
        self.animate(tween, "reset");
    }

    /// Cancel model motion, stop playback and ask the hub to stop pushing.
    fn halt(&self, reason: &str) {
        lock(&self.motion).cancel();
        let stopped_playback = self.queue.stop();
        warn!(reason, stopped_playback, "Emergency stop");
        self.request_hub_stop();
    }

    fn request_hub_stop(&self) {
        let request = SequenceRequest { client_id: self.client.client_id() };
        self.client.send(MessageType::StopSequenceRequest, &request);
    }

    /// Run a tween in the background, superseding any motion in progress.
    fn animate(&self, tween: JointTween, label: &'static str) {
        let cancel = {
            let mut motion = lock(&self.motion);
            motion.cancel();
            *motion = CancellationToken::new();
            motion.clone()
        };
        let (model, step) = (self.model.clone(), self.tween_step);

        tokio::spawn(async move {
            match tween.run(model.as_ref(), step, &cancel).await {
                Ok(TweenOutcome::Completed) => debug!(label, "Motion complete"),
                Ok(TweenOutcome::Interrupted) => debug!(label, "Motion interrupted"),
                Err(e) => warn!(label, "Motion failed: {}", e),
            }
        });
    }
}

/// Register a listener that holds the session weakly.
fn listen<F>(inner: &Arc<SessionInner>, kind: MessageType, handler: F) -> ListenerId
where
    F: Fn(&SessionInner, &Message) -> Result<()> + Send + Sync + 'static,
{
    let weak: Weak<SessionInner> = Arc::downgrade(inner);
    inner.client.on(kind.as_str(), move |message| match weak.upgrade() {
        Some(inner) => handler(&inner, message),
        None => Ok(()),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
