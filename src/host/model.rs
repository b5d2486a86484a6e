//! Snapshot types for the host's song, tracks and device trees
//!
//! The host's live object graph is never borrowed. Every event is handled against
//! an immutable [`SongSnapshot`] taken at that moment; only [`TrackId`] values are
//! kept between events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a host track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Device category as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Instrument,
    #[default]
    Other,
}

/// Automatable device parameter (only the name matters here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameter {
    pub name: String,
}

impl From<&str> for Parameter {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// One lane of a rack device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chain {
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl Chain {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }
}

/// Device in a track's device list or in a rack chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub class_name: String,
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub kind: DeviceKind,
    #[serde(default)]
    pub can_have_chains: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<Chain>,
}

impl Device {
    /// Plain instrument without chains
    pub fn instrument(class_name: &str, display_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            display_name: display_name.to_string(),
            kind: DeviceKind::Instrument,
            can_have_chains: false,
            parameters: Vec::new(),
            chains: Vec::new(),
        }
    }

    /// Audio/MIDI effect or anything else that is not an instrument
    pub fn effect(class_name: &str, display_name: &str) -> Self {
        Self {
            kind: DeviceKind::Other,
            ..Self::instrument(class_name, display_name)
        }
    }

    /// Instrument rack holding the given chains
    pub fn rack(display_name: &str, chains: Vec<Chain>) -> Self {
        Self {
            can_have_chains: true,
            chains,
            ..Self::instrument("InstrumentGroupDevice", display_name)
        }
    }

    pub fn with_parameters(mut self, names: &[&str]) -> Self {
        self.parameters = names.iter().map(|n| Parameter::from(*n)).collect();
        self
    }

    pub fn is_instrument(&self) -> bool {
        self.kind == DeviceKind::Instrument
    }
}

/// Point-in-time view of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub name: String,
    #[serde(default = "default_true")]
    pub can_be_armed: bool,
    #[serde(default)]
    pub arm: bool,
    #[serde(default)]
    pub implicit_arm: bool,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl TrackSnapshot {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id: TrackId(id),
            name: name.to_string(),
            can_be_armed: true,
            arm: false,
            implicit_arm: false,
            devices: Vec::new(),
        }
    }

    pub fn armed(mut self) -> Self {
        self.arm = true;
        self
    }

    pub fn implicit_armed(mut self) -> Self {
        self.implicit_arm = true;
        self
    }

    pub fn unarmable(mut self) -> Self {
        self.can_be_armed = false;
        self
    }

    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    /// Armed directly or implicitly
    pub fn is_armed(&self) -> bool {
        self.arm || self.implicit_arm
    }

    /// Whether this track competes for the controller's focus
    pub fn is_focus_candidate(&self) -> bool {
        self.can_be_armed && self.is_armed()
    }
}

/// Point-in-time view of the whole song
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SongSnapshot {
    #[serde(default)]
    pub tracks: Vec<TrackSnapshot>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_track: Option<TrackId>,
}

impl SongSnapshot {
    pub fn new(tracks: Vec<TrackSnapshot>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }

    /// Song-order position of a track
    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackSnapshot> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut TrackSnapshot> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }
}

/// Instrument found on a track
///
/// `instance_id` is only set for native plugins following the parameter naming
/// convention; it lets the keyboard attach to that exact plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentDescriptor {
    pub display_name: String,
    pub instance_id: Option<String>,
}

impl InstrumentDescriptor {
    pub fn new(display_name: &str, instance_id: Option<&str>) -> Self {
        Self {
            display_name: display_name.to_string(),
            instance_id: instance_id.map(str::to_string),
        }
    }

    pub fn is_native(&self) -> bool {
        self.instance_id.is_some()
    }
}

impl fmt::Display for InstrumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_id {
            Some(id) => write!(f, "{} [{}]", self.display_name, id),
            None => write!(f, "{}", self.display_name),
        }
    }
}

fn default_true() -> bool {
    true
}
