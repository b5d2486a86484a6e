//! Bridge event loop state
//!
//! Every input the bridge reacts to (host notifications, debounce timers,
//! hardware MIDI, REPL requests) is funnelled into one channel of
//! [`BridgeEvent`]s and handled here one at a time.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::focus::{ActivationTicket, FocusCoordinator};
use crate::host::{Host, HostError, Subscription, Topic, TrackProperty};
use crate::midi::{format_hex, MidiMessage};
use crate::navigation::{self, NavDirection};
use crate::protocol;
use crate::surface::MidiSink;
use crate::transport::{TransportControl, TransportSwitch};

#[derive(Debug)]
pub enum BridgeEvent {
    /// A per-track listener fired
    TrackNotification {
        epoch: u64,
        index: usize,
        property: TrackProperty,
    },
    /// Tracks inserted, removed or reordered
    TrackListChanged,
    /// Transport started or stopped
    IsPlayingChanged,
    /// A debounce timer elapsed
    ActivationDue(ActivationTicket),
    /// Raw bytes from the keyboard
    HardwareMidi(Vec<u8>),
    /// Show text on one display line
    DisplayText { text: String, grid: u8 },
    /// Log the current focus
    ReportFocus,
}

pub struct Bridge {
    host: Arc<dyn Host>,
    sink: Arc<dyn MidiSink>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    focus: FocusCoordinator,
    transport: TransportControl,
    song_subscriptions: Vec<Subscription>,
}

impl Bridge {
    /// Create the bridge and the receiving end of its event channel
    pub fn new(
        host: Arc<dyn Host>,
        sink: Arc<dyn MidiSink>,
        config: &BridgeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let focus = FocusCoordinator::new(host.clone(), sink.clone(), config, tx.clone());

        let bridge = Self {
            host,
            sink,
            events: tx,
            focus,
            transport: TransportControl::new(config.controller.role),
            song_subscriptions: Vec::new(),
        };
        (bridge, rx)
    }

    /// Sender for feeding external events (hardware input, REPL)
    pub fn sender(&self) -> mpsc::UnboundedSender<BridgeEvent> {
        self.events.clone()
    }

    pub fn focus(&self) -> &FocusCoordinator {
        &self.focus
    }

    /// Subscribe to song-level changes, resolve the initial focus and sync LEDs
    pub fn start(&mut self) -> Result<(), HostError> {
        let list_tx = self.events.clone();
        self.song_subscriptions.push(Subscription::new(
            self.host.clone(),
            Topic::TrackList,
            Arc::new(move || {
                let _ = list_tx.send(BridgeEvent::TrackListChanged);
            }),
        )?);

        let playing_tx = self.events.clone();
        self.song_subscriptions.push(Subscription::new(
            self.host.clone(),
            Topic::IsPlaying,
            Arc::new(move || {
                let _ = playing_tx.send(BridgeEvent::IsPlayingChanged);
            }),
        )?);

        let song = self.host.snapshot();
        info!("Bridge started with {} track(s)", song.tracks.len());
        self.focus.rebuild(&song);
        self.send_all(&TransportControl::play_state_leds(song.is_playing));
        Ok(())
    }

    /// Handle one event from the channel
    pub fn handle(&mut self, event: BridgeEvent) {
        trace!("Handling {:?}", event);
        match event {
            BridgeEvent::TrackNotification {
                epoch,
                index,
                property,
            } => {
                let song = self.host.snapshot();
                self.focus.on_track_notification(epoch, index, property, &song);
            }
            BridgeEvent::TrackListChanged => {
                let song = self.host.snapshot();
                self.focus.rebuild(&song);
            }
            BridgeEvent::IsPlayingChanged => {
                let playing = self.host.snapshot().is_playing;
                debug!("Transport {}", if playing { "playing" } else { "stopped" });
                self.send_all(&TransportControl::play_state_leds(playing));
            }
            BridgeEvent::ActivationDue(ticket) => {
                let song = self.host.snapshot();
                self.focus.on_activation_due(ticket, &song);
            }
            BridgeEvent::HardwareMidi(bytes) => self.on_hardware_midi(&bytes),
            BridgeEvent::DisplayText { text, grid } => {
                self.send(&protocol::display_text(&text, grid));
            }
            BridgeEvent::ReportFocus => self.report_focus(),
        }
    }

    /// Release every host listener; the bridge stays idle afterwards
    pub fn disconnect(&mut self) {
        for mut subscription in self.song_subscriptions.drain(..) {
            subscription.cancel();
        }
        self.focus.teardown();
        info!("Bridge disconnected");
    }

    fn on_hardware_midi(&mut self, bytes: &[u8]) {
        let Some(message) = MidiMessage::parse(bytes) else {
            trace!("Ignoring unparsed input {}", format_hex(bytes));
            return;
        };

        match message {
            MidiMessage::NoteOn { channel: 0, note, .. } => self.on_switch(note, true),
            MidiMessage::NoteOff { channel: 0, note, .. } => self.on_switch(note, false),
            MidiMessage::ControlChange {
                channel: 0,
                cc,
                value,
            } if value > 0 => {
                if let Some(direction) = NavDirection::from_cc(cc) {
                    self.navigate(direction);
                }
            }
            other => trace!("Unhandled input {}", other),
        }
    }

    fn on_switch(&mut self, note: u8, pressed: bool) {
        let Some(switch) = TransportSwitch::from_note(note) else {
            return;
        };
        let leds = self.transport.on_switch(switch, pressed, self.host.as_ref());
        self.send_all(&leds);
    }

    fn navigate(&mut self, direction: NavDirection) {
        let song = self.host.snapshot();
        if let Err(e) = navigation::navigate(self.host.as_ref(), &song, direction) {
            warn!("Navigation {:?} failed: {}", direction, e);
        }
    }

    fn report_focus(&self) {
        let song = self.host.snapshot();
        match self.focus.controlled_track().and_then(|id| song.track(id)) {
            Some(track) => info!("Focused track: {} '{}'", track.id, track.name),
            None => info!("No focused track"),
        }
        if let Some(pending) = self.focus.pending_activation() {
            info!("Pending activation: track {}", pending.track);
        }
    }

    fn send_all(&self, messages: &[MidiMessage]) {
        for message in messages {
            self.send(&message.encode());
        }
    }

    fn send(&self, bytes: &[u8]) {
        if let Err(e) = self.sink.send(bytes) {
            warn!("Failed to send {}: {:#}", format_hex(bytes), e);
        }
    }
}
