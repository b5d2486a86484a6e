//! Single-slot debounced activation scheduler
//!
//! At most one activation is pending. Scheduling a new one drops the previous
//! slot, and dropping a slot aborts its timer task. A timer that already fired
//! before the abort is caught by the ticket check in [`ActivationScheduler::take_due`].

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::bridge::BridgeEvent;
use crate::host::{InstrumentDescriptor, TrackId};

/// Identifies one scheduled activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationTicket(u64);

/// Activation waiting for the debounce delay to elapse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingActivation {
    pub track: TrackId,
    pub index: usize,
    pub instrument: Option<InstrumentDescriptor>,
}

/// Timer task that is aborted when the handle goes away
struct TimerHandle(JoinHandle<()>);

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Slot {
    ticket: ActivationTicket,
    activation: PendingActivation,
    _timer: TimerHandle,
}

pub struct ActivationScheduler {
    delay: Duration,
    events: mpsc::UnboundedSender<BridgeEvent>,
    next_ticket: u64,
    slot: Option<Slot>,
}

impl ActivationScheduler {
    pub fn new(delay: Duration, events: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            delay,
            events,
            next_ticket: 0,
            slot: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending activation with `activation`
    ///
    /// Must be called from within a Tokio runtime; the timer posts
    /// [`BridgeEvent::ActivationDue`] once the delay has elapsed.
    pub fn schedule(&mut self, activation: PendingActivation) -> ActivationTicket {
        if let Some(previous) = self.cancel() {
            debug!(
                "Activation of track {} superseded by track {}",
                previous.track, activation.track
            );
        }

        self.next_ticket += 1;
        let ticket = ActivationTicket(self.next_ticket);

        let delay = self.delay;
        let events = self.events.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(BridgeEvent::ActivationDue(ticket));
        });

        trace!("Scheduled activation {:?} for track {}", ticket, activation.track);
        self.slot = Some(Slot {
            ticket,
            activation,
            _timer: TimerHandle(timer),
        });
        ticket
    }

    /// Drop the pending activation, if any
    pub fn cancel(&mut self) -> Option<PendingActivation> {
        self.slot.take().map(|slot| slot.activation)
    }

    /// Cancel only if the pending activation targets `track`
    pub fn cancel_for(&mut self, track: TrackId) -> Option<PendingActivation> {
        if self.pending().is_some_and(|p| p.track == track) {
            self.cancel()
        } else {
            None
        }
    }

    /// Claim the activation for a fired timer; `None` if it was superseded
    pub fn take_due(&mut self, ticket: ActivationTicket) -> Option<PendingActivation> {
        let current = self.slot.as_ref().is_some_and(|slot| slot.ticket == ticket);
        if current {
            self.cancel()
        } else {
            None
        }
    }

    pub fn pending(&self) -> Option<&PendingActivation> {
        self.slot.as_ref().map(|slot| &slot.activation)
    }
}
