//! Transport buttons and LEDs on the keyboard
//!
//! Switches arrive as notes on channel 1; LEDs are driven by sending the same
//! note back with velocity 127 (lit) or 0 (dark).

use tracing::debug;

use crate::config::DeviceRole;
use crate::host::Host;
use crate::midi::MidiMessage;

const LED_ON: u8 = 127;
const LED_OFF: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSwitch {
    Loop,
    Rewind,
    FastForward,
    Stop,
    Play,
    Record,
}

impl TransportSwitch {
    pub fn from_note(note: u8) -> Option<Self> {
        match note {
            86 => Some(Self::Loop),
            91 => Some(Self::Rewind),
            92 => Some(Self::FastForward),
            93 => Some(Self::Stop),
            94 => Some(Self::Play),
            95 => Some(Self::Record),
            _ => None,
        }
    }

    pub fn note(self) -> u8 {
        match self {
            Self::Loop => 86,
            Self::Rewind => 91,
            Self::FastForward => 92,
            Self::Stop => 93,
            Self::Play => 94,
            Self::Record => 95,
        }
    }

    fn led(self, lit: bool) -> MidiMessage {
        MidiMessage::NoteOn {
            channel: 0,
            note: self.note(),
            velocity: if lit { LED_ON } else { LED_OFF },
        }
    }
}

/// Hold state of the seek buttons and the role-dependent button policy
#[derive(Debug)]
pub struct TransportControl {
    role: DeviceRole,
    rewind_held: bool,
    forward_held: bool,
}

impl TransportControl {
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            rewind_held: false,
            forward_held: false,
        }
    }

    /// Play and stop LEDs for the given transport state
    pub fn play_state_leds(is_playing: bool) -> Vec<MidiMessage> {
        vec![
            TransportSwitch::Play.led(is_playing),
            TransportSwitch::Stop.led(!is_playing),
        ]
    }

    fn seek_leds(&self) -> Vec<MidiMessage> {
        vec![
            TransportSwitch::Rewind.led(self.rewind_held),
            TransportSwitch::FastForward.led(self.forward_held),
        ]
    }

    /// React to a switch; returns the LED messages to send back
    pub fn on_switch(
        &mut self,
        switch: TransportSwitch,
        pressed: bool,
        host: &dyn Host,
    ) -> Vec<MidiMessage> {
        if self.role != DeviceRole::Daw {
            debug!("Ignoring {:?} in keyboard role", switch);
            return Vec::new();
        }

        match switch {
            TransportSwitch::Rewind => {
                self.rewind_held = pressed;
                self.seek_leds()
            }
            TransportSwitch::FastForward => {
                self.forward_held = pressed;
                self.seek_leds()
            }
            TransportSwitch::Stop if pressed => {
                debug!("Stop pressed");
                host.stop_playing();
                Self::play_state_leds(host.snapshot().is_playing)
            }
            _ => Vec::new(),
        }
    }
}
