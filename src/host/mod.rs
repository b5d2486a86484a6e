//! Host collaborator interface
//!
//! The audio host owns tracks, devices and the transport. The bridge talks to it
//! only through the [`Host`] trait: it reads [`SongSnapshot`]s, registers change
//! listeners and issues a handful of mutations (arm, select, stop).

mod model;
pub mod session;
pub mod simulated;

pub use model::{
    Chain, Device, DeviceKind, InstrumentDescriptor, Parameter, SongSnapshot, TrackId,
    TrackSnapshot,
};
pub use simulated::SimulatedHost;

use std::sync::Arc;
use thiserror::Error;

/// Callback registered with the host; invoked on the host's processing thread
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Observable per-track property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackProperty {
    Arm,
    ImplicitArm,
    Devices,
}

/// What a listener is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A property of one track
    Track(TrackId, TrackProperty),
    /// Tracks inserted, deleted or reordered
    TrackList,
    /// Transport started or stopped
    IsPlaying,
}

/// Host-side registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Failures reported by the host
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("track {0} no longer exists")]
    UnknownTrack(TrackId),

    #[error("track {0} cannot be armed")]
    NotArmable(TrackId),

    #[error("listener registration failed: {0}")]
    Subscription(String),
}

/// The host's song model as seen by the bridge
///
/// Implementations must invoke listeners synchronously after the change they
/// describe is visible through [`Host::snapshot`].
pub trait Host: Send + Sync {
    /// Immutable copy of the current song state
    fn snapshot(&self) -> SongSnapshot;

    /// Register a change listener
    fn add_listener(&self, topic: Topic, listener: Listener) -> Result<ListenerId, HostError>;

    /// Remove a listener; unknown ids are ignored
    fn remove_listener(&self, id: ListenerId);

    /// Set or clear the record-arm flag of a track
    fn set_arm(&self, track: TrackId, arm: bool) -> Result<(), HostError>;

    /// Make a track the host's selected track
    fn select_track(&self, track: TrackId) -> Result<(), HostError>;

    /// Stop the transport
    fn stop_playing(&self);
}

/// RAII listener registration
///
/// Dropping the subscription removes the listener from the host, so a watch that
/// is discarded on any path (including unwinding) never leaks a registration.
pub struct Subscription {
    host: Arc<dyn Host>,
    id: Option<ListenerId>,
    topic: Topic,
}

impl Subscription {
    pub fn new(host: Arc<dyn Host>, topic: Topic, listener: Listener) -> Result<Self, HostError> {
        let id = host.add_listener(topic, listener)?;
        Ok(Self {
            host,
            id: Some(id),
            topic,
        })
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Remove the listener; later calls do nothing
    pub fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            self.host.remove_listener(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}
