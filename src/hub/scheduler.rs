//! Scheduled sequence delivery
//!
//! Each scheduled sequence runs as one task that sleeps until each frame's
//! offset and hands the frame back to the hub loop. Running the frames of a
//! sequence in one task keeps equal-offset frames in sequence order and puts
//! `sequence_complete` strictly after the last frame.
//!
//! Every task owns a [`CancellationToken`]. The hub re-checks the token when
//! a delivery arrives, so a frame that was already in flight when the
//! sequence got cancelled is dropped instead of sent.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::core::HubCommand;
use crate::protocol::Message;
use crate::types::{ActionSequence, KeyFrame};

struct ScheduledSequence {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to one scheduled sequence, carried by its deliveries.
#[derive(Debug, Clone)]
pub struct ScheduleTicket {
    pub id: u64,
    pub token: CancellationToken,
}

/// Outstanding scheduled deliveries, keyed by client id.
#[derive(Default)]
pub struct SequenceScheduler {
    active: HashMap<u64, Vec<ScheduledSequence>>,
    next_id: u64,
}

impl SequenceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule every frame of `sequence` relative to `start`, followed by
    /// `sequence_complete` at the last frame's offset.
    ///
    /// Callers cancel previous deliveries first; this only appends.
    pub fn schedule(
        &mut self,
        client_id: u64,
        sequence: &ActionSequence,
        start: Instant,
        commands: mpsc::UnboundedSender<HubCommand>,
    ) -> ScheduleTicket {
        self.next_id += 1;
        let ticket = ScheduleTicket { id: self.next_id, token: CancellationToken::new() };
        let frames = sequence.frames().to_vec();
        debug!(client_id, schedule = ticket.id, frames = frames.len(), "Scheduling sequence delivery");

        let handle = tokio::spawn(deliver_frames(client_id, frames, start, ticket.clone(), commands));
        self.active.entry(client_id).or_default().push(ScheduledSequence {
            id: ticket.id,
            token: ticket.token.clone(),
            handle,
        });
        ticket
    }

    /// Cancel every outstanding delivery for `client_id`. Returns how many
    /// sequences were cancelled; calling it again returns 0.
    pub fn cancel_all(&mut self, client_id: u64) -> usize {
        let Some(scheduled) = self.active.remove(&client_id) else {
            return 0;
        };
        for sequence in &scheduled {
            sequence.token.cancel();
            sequence.handle.abort();
        }
        debug!(client_id, cancelled = scheduled.len(), "Cancelled scheduled deliveries");
        scheduled.len()
    }

    /// Forget a sequence whose delivery ran to completion.
    pub fn finish(&mut self, client_id: u64, schedule_id: u64) {
        if let Some(scheduled) = self.active.get_mut(&client_id) {
            scheduled.retain(|s| s.id != schedule_id);
            if scheduled.is_empty() {
                self.active.remove(&client_id);
            }
        }
    }

    /// Number of sequences still scheduled for `client_id`.
    pub fn pending(&self, client_id: u64) -> usize {
        self.active.get(&client_id).map_or(0, Vec::len)
    }

    /// Cancel everything, for hub shutdown.
    pub fn cancel_everything(&mut self) {
        let ids: Vec<u64> = self.active.keys().copied().collect();
        for id in ids {
            self.cancel_all(id);
        }
    }
}

async fn deliver_frames(
    client_id: u64,
    frames: Vec<KeyFrame>,
    start: Instant,
    ticket: ScheduleTicket,
    commands: mpsc::UnboundedSender<HubCommand>,
) {
    for frame in frames {
        tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return,
            _ = sleep_until(start + frame.offset()) => {}
        }

        trace!(client_id, frame_id = frame.id, time = frame.time, "Frame due");
        let delivery = HubCommand::Deliver {
            client_id,
            ticket: ticket.clone(),
            message: Message::sequence_frame(&frame),
            last: false,
        };
        if commands.send(delivery).is_err() {
            return;
        }
    }

    let _ = commands.send(HubCommand::Deliver {
        client_id,
        ticket,
        message: Message::sequence_complete(),
        last: true,
    });
}
