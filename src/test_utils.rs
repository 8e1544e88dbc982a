//! Test utilities shared by unit tests, integration tests and benches
//!
//! Sequence builders, an in-process hub reader, a scratch file guard, a
//! connector whose links can be refused or severed on demand and a
//! playback observer that records what it saw.

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::hub::{HubConnection, Outgoing};
use crate::playback::PlaybackObserver;
use crate::protocol::Message;
use crate::source::SequenceSource;
use crate::sources::FixedSequenceSource;
use crate::transport::{CloseReason, Connector, Link, LinkEvent};
use crate::types::{ActionSequence, KeyFrame, SequenceMeta};
use crate::{RelayError, Result};

/// Joint count of fixture sequences; matches the six-axis simulated arm.
pub const FIXTURE_JOINTS: usize = 6;

/// Valid sequence with one frame per entry of `times` (ms offsets).
/// Frame `i` sets every joint to `0.05 * (i + 1)` radians.
pub fn sequence_at(times: &[u64], joint_count: usize) -> ActionSequence {
    let frames = times
        .iter()
        .enumerate()
        .map(|(i, &time)| KeyFrame::new(i as u64, time, vec![0.05 * (i + 1) as f64; joint_count]))
        .collect();
    let meta = SequenceMeta {
        description: "fixture".to_string(),
        version: "1.0".to_string(),
        created_at: None,
        robot_type: "six_axis".to_string(),
    };
    match ActionSequence::new(meta, frames, joint_count) {
        Ok(sequence) => sequence,
        Err(e) => panic!("invalid fixture sequence {times:?}: {e}"),
    }
}

/// Hub sequence source serving [`sequence_at`] with [`FIXTURE_JOINTS`] joints.
pub fn fixed_source(times: &[u64]) -> Box<dyn SequenceSource> {
    Box::new(FixedSequenceSource::new(sequence_at(times, FIXTURE_JOINTS)))
}

/// Next message the hub pushed to `connection`. Panics on close.
pub async fn recv_message(connection: &mut HubConnection) -> Message {
    match connection.recv().await {
        Some(Outgoing::Text(text)) => match Message::decode(&text) {
            Ok(message) => message,
            Err(e) => panic!("hub sent undecodable frame {text}: {e}"),
        },
        Some(Outgoing::Close) => panic!("hub closed connection {}", connection.client_id()),
        None => panic!("hub dropped connection {}", connection.client_id()),
    }
}

/// File in the system temp dir, removed on drop.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn with_contents(name: &str, contents: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("simrelay-{}-{unique}", std::process::id()));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            panic!("cannot create {}: {e}", dir.display());
        }
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, contents) {
            panic!("cannot write {}: {e}", path.display());
        }
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        if let Some(dir) = self.path.parent() {
            let _ = std::fs::remove_dir(dir);
        }
    }
}

/// How [`FlakyConnector`] answers the next connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Pass through to the wrapped connector.
    #[default]
    Online,
    /// Fail the connect call.
    Refuse,
    /// Open a link that closes abnormally at once.
    CloseOnOpen,
    /// Open a link that never produces anything.
    Silent,
}

struct FlakyState {
    mode: Mutex<LinkMode>,
    attempts: AtomicU32,
    severed: Mutex<CancellationToken>,
}

/// Connector wrapper for driving reconnection paths.
#[derive(Clone)]
pub struct FlakyConnector {
    inner: Arc<dyn Connector>,
    state: Arc<FlakyState>,
}

impl FlakyConnector {
    pub fn new(inner: Arc<dyn Connector>) -> Self {
        Self {
            inner,
            state: Arc::new(FlakyState {
                mode: Mutex::new(LinkMode::Online),
                attempts: AtomicU32::new(0),
                severed: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn set_mode(&self, mode: LinkMode) {
        *lock(&self.state.mode) = mode;
    }

    /// Break every open link as if the network dropped.
    pub fn sever(&self) {
        let mut severed = lock(&self.state.severed);
        severed.cancel();
        *severed = CancellationToken::new();
    }

    /// Connect calls so far, successful or not.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *lock(&self.state.mode);
        match mode {
            LinkMode::Refuse => Err(RelayError::connection_failed("connection refused")),
            LinkMode::CloseOnOpen => Ok(Box::new(ScriptedLink { closes: true })),
            LinkMode::Silent => Ok(Box::new(ScriptedLink { closes: false })),
            LinkMode::Online => {
                let severed = lock(&self.state.severed).clone();
                let inner = self.inner.connect().await?;
                Ok(Box::new(SeverableLink { inner, severed }))
            }
        }
    }

    fn describe(&self) -> String {
        format!("flaky {}", self.inner.describe())
    }
}

struct ScriptedLink {
    closes: bool,
}

#[async_trait]
impl Link for ScriptedLink {
    async fn send_text(&mut self, _text: String) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> LinkEvent {
        if self.closes {
            LinkEvent::Closed(CloseReason::abnormal("closed on open"))
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self, _reason: CloseReason) {}
}

struct SeverableLink {
    inner: Box<dyn Link>,
    severed: CancellationToken,
}

#[async_trait]
impl Link for SeverableLink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.severed.is_cancelled() {
            return Err(RelayError::Disconnected);
        }
        self.inner.send_text(text).await
    }

    async fn next_event(&mut self) -> LinkEvent {
        let event = tokio::select! {
            biased;
            _ = self.severed.cancelled() => None,
            event = self.inner.next_event() => Some(event),
        };
        match event {
            Some(event) => event,
            None => {
                self.inner.close(CloseReason::abnormal("link severed")).await;
                LinkEvent::Closed(CloseReason::abnormal("link severed"))
            }
        }
    }

    async fn close(&mut self, reason: CloseReason) {
        self.inner.close(reason).await;
    }
}

/// One observer callback.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Update { frame_id: u64, duration: Duration },
    Complete { frame_id: u64 },
    Error { frame_id: u64, message: String },
}

/// Playback observer that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PlaybackEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<PlaybackEvent> {
        lock(&self.events).clone()
    }

    /// Transition durations in update order.
    pub fn durations(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlaybackEvent::Update { duration, .. } => Some(duration),
                _ => None,
            })
            .collect()
    }

    /// Ids of completed frames in completion order.
    pub fn completed(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlaybackEvent::Complete { frame_id } => Some(frame_id),
                _ => None,
            })
            .collect()
    }
}

impl PlaybackObserver for RecordingObserver {
    fn on_frame_update(&self, frame: &KeyFrame, duration: Duration) {
        lock(&self.events).push(PlaybackEvent::Update { frame_id: frame.id, duration });
    }

    fn on_frame_complete(&self, frame: &KeyFrame) {
        lock(&self.events).push(PlaybackEvent::Complete { frame_id: frame.id });
    }

    fn on_error(&self, frame: &KeyFrame, error: &RelayError) {
        lock(&self.events).push(PlaybackEvent::Error { frame_id: frame.id, message: error.to_string() });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
