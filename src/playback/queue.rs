//! The frame animation queue

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::duration::DurationPolicy;
use super::tween::{JointTween, TweenOutcome};
use crate::config::PlaybackConfig;
use crate::model::RobotModel;
use crate::types::{JointTarget, KeyFrame};
use crate::{RelayError, Result};

/// Callbacks for one playback session. All methods default to no-ops.
pub trait PlaybackObserver: Send + Sync + 'static {
    /// A frame's transition begins and will take `duration`.
    fn on_frame_update(&self, frame: &KeyFrame, duration: Duration) {
        let _ = (frame, duration);
    }

    /// A frame's transition ran to the end.
    fn on_frame_complete(&self, frame: &KeyFrame) {
        let _ = frame;
    }

    /// A frame failed to apply. The session is already stopped.
    fn on_error(&self, frame: &KeyFrame, error: &RelayError) {
        let _ = (frame, error);
    }
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PlaybackObserver for TracingObserver {
    fn on_frame_update(&self, frame: &KeyFrame, duration: Duration) {
        debug!(frame_id = frame.id, time = frame.time, ?duration, "Frame transition started");
    }

    fn on_frame_complete(&self, frame: &KeyFrame) {
        trace!(frame_id = frame.id, "Frame transition complete");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Stopped,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    /// Frames waiting behind the one in flight
    pub buffered: usize,
    /// A transition is in flight
    pub processing: bool,
    /// Last frame whose transition completed in this session
    pub last_frame_id: Option<u64>,
}

#[derive(Debug)]
struct Session {
    generation: u64,
    status: PlaybackStatus,
    buffer: VecDeque<KeyFrame>,
    last: Option<KeyFrame>,
    processing: bool,
    cancel: CancellationToken,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            generation: 0,
            status: PlaybackStatus::Idle,
            buffer: VecDeque::new(),
            last: None,
            processing: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl Session {
    fn halt(&mut self) -> bool {
        if self.status != PlaybackStatus::Playing {
            return false;
        }
        self.status = PlaybackStatus::Stopped;
        self.cancel.cancel();
        self.buffer.clear();
        self.processing = false;
        true
    }
}

struct QueueInner {
    model: Arc<dyn RobotModel>,
    policy: DurationPolicy,
    tick: Duration,
    step: Duration,
    session: Mutex<Session>,
}

/// Buffers keyframes as they arrive and plays them back one transition at
/// a time, paced by the frame timestamps rather than by arrival.
///
/// `start` begins a session and spawns its scheduling loop, which checks
/// every tick whether it can dequeue the next frame. At most one transition
/// is in flight. An empty buffer just pauses playback until more frames
/// arrive. A frame that fails to apply stops the whole session.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<QueueInner>,
}

impl FrameQueue {
    pub fn new(model: Arc<dyn RobotModel>, config: &PlaybackConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                model,
                policy: DurationPolicy::from(config),
                tick: config.tick_interval(),
                step: config.tween_step(),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Start a fresh session: empty buffer, no frame history, `Playing`.
    /// A session already running is cancelled first.
    pub fn start(&self, observer: Arc<dyn PlaybackObserver>) {
        let (generation, cancel) = {
            let mut session = self.inner.lock();
            session.cancel.cancel();
            *session = Session {
                generation: session.generation + 1,
                status: PlaybackStatus::Playing,
                cancel: CancellationToken::new(),
                ..Session::default()
            };
            (session.generation, session.cancel.clone())
        };
        info!(generation, "Playback session started");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(observer, generation, cancel).await;
        });
    }

    /// Append a frame to the buffer. Frames arriving while no session is
    /// playing are dropped; returns whether the frame was buffered.
    pub fn enqueue(&self, frame: KeyFrame) -> bool {
        let mut session = self.inner.lock();
        if session.status != PlaybackStatus::Playing {
            debug!(frame_id = frame.id, status = ?session.status, "Dropping frame, not playing");
            return false;
        }
        trace!(frame_id = frame.id, buffered = session.buffer.len() + 1, "Frame buffered");
        session.buffer.push_back(frame);
        true
    }

    /// Stop the session: interrupt the transition in flight and empty the
    /// buffer. Does nothing unless playing; returns whether it stopped one.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.lock().halt();
        if stopped {
            info!("Playback session stopped");
        }
        stopped
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().status
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let session = self.inner.lock();
        PlaybackSnapshot {
            status: session.status,
            buffered: session.buffer.len(),
            processing: session.processing,
            last_frame_id: session.last.as_ref().map(|f| f.id),
        }
    }
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drive(&self, observer: Arc<dyn PlaybackObserver>, generation: u64, cancel: CancellationToken) {
        let mut ticks = interval(self.tick);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => {}
            }

            let Some((frame, duration)) = self.begin_next(generation) else {
                continue;
            };
            observer.on_frame_update(&frame, duration);

            match self.execute(&frame, duration, &cancel).await {
                Ok(TweenOutcome::Completed) => {
                    if self.complete(generation, &frame) {
                        observer.on_frame_complete(&frame);
                    }
                }
                Ok(TweenOutcome::Interrupted) => break,
                Err(e) => {
                    let error = RelayError::execution_failed(frame.id, e.to_string());
                    error!(frame_id = frame.id, "Stopping playback: {}", error);
                    {
                        let mut session = self.lock();
                        if session.generation == generation {
                            session.halt();
                        }
                    }
                    observer.on_error(&frame, &error);
                    break;
                }
            }
        }
        debug!(generation, "Playback loop ended");
    }

    /// Dequeue the oldest frame unless a transition is in flight.
    fn begin_next(&self, generation: u64) -> Option<(KeyFrame, Duration)> {
        let mut session = self.lock();
        if session.generation != generation
            || session.status != PlaybackStatus::Playing
            || session.processing
        {
            return None;
        }
        let frame = session.buffer.pop_front()?;
        let duration =
            self.policy.transition_duration(session.last.as_ref(), &frame, session.buffer.front());
        session.processing = true;
        Some((frame, duration))
    }

    fn complete(&self, generation: u64, frame: &KeyFrame) -> bool {
        let mut session = self.lock();
        if session.generation != generation || session.status != PlaybackStatus::Playing {
            return false;
        }
        session.processing = false;
        session.last = Some(frame.clone());
        true
    }

    async fn execute(
        &self,
        frame: &KeyFrame,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<TweenOutcome> {
        let names = self.model.joint_names();
        if frame.joints.len() != names.len() {
            return Err(RelayError::model(format!(
                "frame carries {} joint angles, model has {} joints",
                frame.joints.len(),
                names.len()
            )));
        }
        let joints = names
            .into_iter()
            .zip(&frame.joints)
            .map(|(name, radians)| JointTarget { name, angle: radians.to_degrees() })
            .collect();
        let gripper = frame.gripper_open().map(|open| if open { 1.0 } else { 0.0 });

        JointTween::new(joints, duration)
            .with_gripper(gripper)
            .run(self.model.as_ref(), self.step, cancel)
            .await
    }
}
