//! Per-track listener handle
//!
//! A [`TrackWatch`] subscribes to one track's arm, implicit-arm and device-list
//! notifications and turns raw notifications into [`WatchEvent`]s. Notifications
//! are posted to the bridge's event channel tagged with the watch generation so
//! that anything queued before a rebuild can be recognised as stale.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::bridge::BridgeEvent;
use crate::config::DeviceRole;
use crate::host::{Host, HostError, Subscription, Topic, TrackId, TrackProperty, TrackSnapshot};

/// Arm state tracked per watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Unarmed,
    Armed,
    ImplicitArmed,
}

impl ArmState {
    pub fn of(track: &TrackSnapshot) -> Self {
        if track.arm {
            ArmState::Armed
        } else if track.implicit_arm {
            ArmState::ImplicitArmed
        } else {
            ArmState::Unarmed
        }
    }

    pub fn is_armed(self) -> bool {
        self != ArmState::Unarmed
    }
}

/// Normalised per-track event delivered to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Track went from unarmed to (implicitly) armed
    ActivationCandidate { index: usize, track: TrackId },
    /// Track went back to unarmed
    Deactivated { index: usize, track: TrackId },
    /// Device list changed on an armed track
    DevicesChanged { index: usize, track: TrackId },
}

/// Listener registrations and arm state for one track
#[derive(Debug)]
pub struct TrackWatch {
    index: usize,
    track: TrackId,
    state: ArmState,
    can_activate: bool,
    subscriptions: Vec<Subscription>,
}

impl TrackWatch {
    /// Subscribe to `track` on behalf of watch generation `epoch`
    ///
    /// Only armable tracks in the DAW role listen to arm changes; every other watch
    /// listens to device changes alone and never produces events.
    pub fn new(
        host: &Arc<dyn Host>,
        index: usize,
        track: &TrackSnapshot,
        role: DeviceRole,
        epoch: u64,
        events: &mpsc::UnboundedSender<BridgeEvent>,
    ) -> Result<Self, HostError> {
        let can_activate = role == DeviceRole::Daw && track.can_be_armed;

        let properties: &[TrackProperty] = if can_activate {
            &[TrackProperty::Arm, TrackProperty::ImplicitArm, TrackProperty::Devices]
        } else {
            &[TrackProperty::Devices]
        };

        let mut subscriptions = Vec::with_capacity(properties.len());
        for &property in properties {
            let tx = events.clone();
            let listener = Arc::new(move || {
                // The bridge may already be gone during shutdown
                let _ = tx.send(BridgeEvent::TrackNotification {
                    epoch,
                    index,
                    property,
                });
            });
            subscriptions.push(Subscription::new(
                host.clone(),
                Topic::Track(track.id, property),
                listener,
            )?);
        }

        trace!(
            "Watching track {} '{}' at {} (activatable: {})",
            track.id,
            track.name,
            index,
            can_activate
        );

        Ok(Self {
            index,
            track: track.id,
            state: ArmState::of(track),
            can_activate,
            subscriptions,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn state(&self) -> ArmState {
        self.state
    }

    pub fn can_activate(&self) -> bool {
        self.can_activate
    }

    pub fn is_released(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Apply a notification against the track's current snapshot
    pub fn observe(&mut self, property: TrackProperty, track: &TrackSnapshot) -> Option<WatchEvent> {
        if !self.can_activate || self.is_released() {
            return None;
        }

        let index = self.index;
        let id = self.track;

        match property {
            TrackProperty::Arm | TrackProperty::ImplicitArm => {
                let next = ArmState::of(track);
                let previous = std::mem::replace(&mut self.state, next);

                match (previous.is_armed(), next.is_armed()) {
                    (false, true) => Some(WatchEvent::ActivationCandidate { index, track: id }),
                    (true, false) => Some(WatchEvent::Deactivated { index, track: id }),
                    _ => None,
                }
            }
            TrackProperty::Devices if self.state.is_armed() => {
                Some(WatchEvent::DevicesChanged { index, track: id })
            }
            TrackProperty::Devices => None,
        }
    }

    /// Remove every host listener; safe to call repeatedly
    pub fn release(&mut self) {
        for mut subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }
}

impl Drop for TrackWatch {
    fn drop(&mut self) {
        self.release();
    }
}
