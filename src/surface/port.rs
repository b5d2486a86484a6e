//! Hardware MIDI ports via `midir`
//!
//! Ports are matched by case-insensitive substring of their name, so the same
//! config works across platforms where drivers decorate port names differently.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use super::MidiSink;
use crate::bridge::BridgeEvent;
use crate::midi::format_hex;

const CLIENT_NAME: &str = "Kontrol-Bridge";

/// Find a port whose name contains `pattern`, ignoring case
fn find_port<T: MidiIO>(midi: &T, pattern: &str) -> Option<(T::Port, String)> {
    let pattern = pattern.to_lowercase();
    for port in midi.ports() {
        if let Ok(name) = midi.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Output connection to the keyboard
pub struct HardwareOutput {
    name: String,
    conn: Mutex<MidiOutputConnection>,
}

impl HardwareOutput {
    pub fn connect(pattern: &str) -> Result<Self> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        debug!("Found {} MIDI output ports", midi_out.port_count());

        let (port, name) = find_port(&midi_out, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", name);
        let conn = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to output port '{}': {}", name, e))?;

        Ok(Self {
            name,
            conn: Mutex::new(conn),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MidiSink for HardwareOutput {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.conn
            .lock()
            .send(bytes)
            .with_context(|| format!("Failed to send to '{}'", self.name))?;
        trace!("Sent: {}", format_hex(bytes));
        Ok(())
    }
}

/// Input connection from the keyboard; forwards raw bytes into the bridge
pub struct HardwareInput {
    name: String,
    _conn: MidiInputConnection<()>,
}

impl HardwareInput {
    pub fn connect(pattern: &str, events: mpsc::UnboundedSender<BridgeEvent>) -> Result<Self> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        midi_in.ignore(midir::Ignore::TimeAndActiveSense);
        debug!("Found {} MIDI input ports", midi_in.port_count());

        let (port, name) = find_port(&midi_in, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;

        info!("Connecting to input port: {}", name);
        let conn = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    trace!("Received: {}", format_hex(data));
                    // Bridge already stopped: drop the input
                    let _ = events.send(BridgeEvent::HardwareMidi(data.to_vec()));
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to input port '{}': {}", name, e))?;

        Ok(Self { name, _conn: conn })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Port discovery for `--list-ports`
pub mod discovery {
    use super::*;

    pub fn input_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        Ok(port_names(&midi_in))
    }

    pub fn output_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        Ok(port_names(&midi_out))
    }

    fn port_names<T: MidiIO>(midi: &T) -> Vec<String> {
        midi.ports()
            .iter()
            .filter_map(|port| midi.port_name(port).ok())
            .collect()
    }

    /// Print every port, highlighting names that look like the keyboard
    pub fn print_ports() -> Result<()> {
        let sections = [("MIDI Input Ports", input_ports()?), ("MIDI Output Ports", output_ports()?)];

        for (title, ports) in sections {
            println!("\n{}", format!("=== {} ===", title).bold());
            if ports.is_empty() {
                println!("  {}", "(none)".dimmed());
            }
            for (i, name) in ports.iter().enumerate() {
                if name.to_lowercase().contains("kontrol") {
                    println!("  {}: {}", i, name.green());
                } else {
                    println!("  {}: {}", i, name);
                }
            }
        }
        println!();
        Ok(())
    }
}
