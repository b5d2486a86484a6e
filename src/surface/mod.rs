//! Outbound MIDI transport to the keyboard
//!
//! The bridge hands complete frames to a [`MidiSink`]. The hardware sink writes
//! them to a `midir` output port; the console sink only logs them, for running
//! against a simulated host without a keyboard attached.

pub mod port;

use anyhow::Result;
use tracing::info;

use crate::midi::{format_hex, MidiMessage};

/// Fire-and-forget byte transport
pub trait MidiSink: Send + Sync {
    /// Send one complete MIDI message
    fn send(&self, bytes: &[u8]) -> Result<()>;
}

/// Logs every frame instead of sending it
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl MidiSink for ConsoleSink {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        match MidiMessage::parse(bytes) {
            Some(MidiMessage::SysEx { .. }) => info!("→ {}  {}", format_hex(bytes), printable(bytes)),
            Some(message) => info!("→ {}  ({})", format_hex(bytes), message),
            None => info!("→ {}", format_hex(bytes)),
        }
        Ok(())
    }
}

/// Printable ASCII view of a SysEx payload, delimiters shown as `|`
fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .skip(7)
        .take(bytes.len().saturating_sub(8))
        .map(|&b| match b {
            0x19 => '|',
            0x20..=0x7E => b as char,
            _ => '.',
        })
        .collect()
}

/// Keeps every frame for assertions
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    frames: parking_lot::Mutex<Vec<Vec<u8>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    pub(crate) fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.lock())
    }
}

#[cfg(test)]
impl MidiSink for RecordingSink {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.frames.lock().push(bytes.to_vec());
        Ok(())
    }
}
