//! Focus coordinator
//!
//! Owns the per-track watches, the activation scheduler and the focus state.
//! All entry points run on the bridge's event loop, so state is only ever touched
//! from one task and listener callbacks never re-enter the coordinator.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::resolver::resolve;
use super::scanner::InstrumentScanner;
use super::scheduler::{ActivationScheduler, ActivationTicket, PendingActivation};
use super::watch::{TrackWatch, WatchEvent};
use crate::bridge::BridgeEvent;
use crate::config::{BridgeConfig, DeviceRole};
use crate::diagnostics::{DiagnosticBroadcaster, FocusReport};
use crate::host::{Host, InstrumentDescriptor, SongSnapshot, TrackId, TrackProperty, TrackSnapshot};
use crate::protocol;
use crate::surface::MidiSink;

pub struct FocusCoordinator {
    host: Arc<dyn Host>,
    sink: Arc<dyn MidiSink>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    scanner: InstrumentScanner,
    role: DeviceRole,
    watches: Vec<TrackWatch>,
    epoch: u64,
    scheduler: ActivationScheduler,
    controlled: Option<TrackId>,
    diagnostics: Option<DiagnosticBroadcaster>,
}

impl FocusCoordinator {
    pub fn new(
        host: Arc<dyn Host>,
        sink: Arc<dyn MidiSink>,
        config: &BridgeConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            host,
            sink,
            scanner: InstrumentScanner::new(&config.native_plugin),
            role: config.controller.role,
            watches: Vec::new(),
            epoch: 0,
            scheduler: ActivationScheduler::new(config.controller.debounce(), events.clone()),
            controlled: None,
            diagnostics: DiagnosticBroadcaster::from_config(&config.diagnostics),
            events,
        }
    }

    /// Track currently controlled by the keyboard
    pub fn controlled_track(&self) -> Option<TrackId> {
        self.controlled
    }

    pub fn pending_activation(&self) -> Option<&PendingActivation> {
        self.scheduler.pending()
    }

    /// Watch generation; bumped by every rebuild
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn watches(&self) -> &[TrackWatch] {
        &self.watches
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Discard every watch and rebuild from the current track list
    ///
    /// Runs on startup and whenever tracks are inserted, removed or reordered.
    /// Any pending activation is dropped; focus is then resolved from scratch.
    pub fn rebuild(&mut self, song: &SongSnapshot) {
        self.release_watches();
        if let Some(pending) = self.scheduler.cancel() {
            debug!("Pending activation of track {} dropped by rebuild", pending.track);
        }
        self.epoch += 1;

        for (index, track) in song.tracks.iter().enumerate() {
            match TrackWatch::new(&self.host, index, track, self.role, self.epoch, &self.events) {
                Ok(watch) => self.watches.push(watch),
                Err(e) => warn!("Cannot watch track {} '{}': {}", track.id, track.name, e),
            }
        }
        info!(
            "Watching {} of {} track(s) (generation {})",
            self.watches.len(),
            song.tracks.len(),
            self.epoch
        );

        match resolve(&song.tracks, &self.scanner) {
            Some(focus) => {
                if self.controlled == Some(focus.track.id) {
                    debug!("Focus unchanged on track {} '{}'", focus.track.id, focus.track.name);
                    return;
                }
                info!(
                    "Focus on track {} '{}' ({})",
                    focus.track.id,
                    focus.track.name,
                    describe(focus.instrument.as_ref())
                );
                self.controlled = Some(focus.track.id);
                self.emit_status("focus", focus.index, focus.track, focus.instrument.as_ref());
            }
            None => {
                let Some(previous) = self.controlled.take() else {
                    return;
                };
                info!("No track to focus, releasing track {}", previous);
                match song.index_of(previous) {
                    Some(index) => {
                        let track = &song.tracks[index];
                        let instrument = self.scanner.find_instrument(&track.devices);
                        self.emit_status("release", index, track, instrument.as_ref());
                    }
                    None => debug!("Previously focused track {} was removed", previous),
                }
            }
        }
    }

    /// Route a raw listener notification to its watch
    pub fn on_track_notification(
        &mut self,
        epoch: u64,
        index: usize,
        property: TrackProperty,
        song: &SongSnapshot,
    ) {
        if epoch != self.epoch {
            trace!("Dropping notification from watch generation {}", epoch);
            return;
        }

        let Some(watch) = self.watches.iter_mut().find(|w| w.index() == index) else {
            trace!("No watch at index {}", index);
            return;
        };

        // Track deleted but the list change is still queued behind us
        let Some(position) = song.index_of(watch.track()) else {
            debug!("Track {} vanished before its notification was handled", watch.track());
            return;
        };
        let track = &song.tracks[position];

        let Some(event) = watch.observe(property, track) else {
            return;
        };

        // Report the track's position in this snapshot, not the one it was watched at
        match event {
            WatchEvent::ActivationCandidate { .. } => {
                self.on_track_activation_candidate(position, track)
            }
            WatchEvent::Deactivated { .. } => self.on_track_deactivated(position, track, song),
            WatchEvent::DevicesChanged { .. } => {
                self.on_track_devices_changed(position, track, song)
            }
        }
    }

    /// A track became armed or implicitly armed
    pub fn on_track_activation_candidate(&mut self, index: usize, track: &TrackSnapshot) {
        if self.controlled == Some(track.id) {
            debug!("Track {} '{}' is already focused", track.id, track.name);
            return;
        }

        let instrument = self.scanner.find_instrument(&track.devices);
        debug!(
            "Track {} '{}' armed, activating in {:?}",
            track.id,
            track.name,
            self.scheduler.delay()
        );
        self.scheduler.schedule(PendingActivation {
            track: track.id,
            index,
            instrument,
        });
    }

    /// A track lost both arm flags
    pub fn on_track_deactivated(&mut self, index: usize, track: &TrackSnapshot, song: &SongSnapshot) {
        if let Some(pending) = self.scheduler.cancel_for(track.id) {
            debug!("Activation of track {} cancelled, track unarmed", pending.track);
        }

        if self.controlled == Some(track.id) {
            info!("Track {} '{}' released focus", track.id, track.name);
            self.controlled = None;
            let instrument = self.scanner.find_instrument(&track.devices);
            self.emit_status("release", index, track, instrument.as_ref());
        }

        self.hand_over_if_idle(song);
    }

    /// The device list of an armed track changed
    pub fn on_track_devices_changed(
        &mut self,
        index: usize,
        track: &TrackSnapshot,
        song: &SongSnapshot,
    ) {
        if self.controlled != Some(track.id) {
            trace!("Devices changed on unfocused track {}", track.id);
            // A new instrument may settle an ambiguous set of armed tracks
            self.hand_over_if_idle(song);
            return;
        }

        let instrument = self.scanner.find_instrument(&track.devices);
        debug!(
            "Devices changed on focused track {} '{}' ({})",
            track.id,
            track.name,
            describe(instrument.as_ref())
        );
        self.emit_status("refresh", index, track, instrument.as_ref());
    }

    /// With no focus and nothing pending, schedule whatever the song resolves to
    ///
    /// The handover goes through the usual debounce.
    fn hand_over_if_idle(&mut self, song: &SongSnapshot) {
        if self.controlled.is_some() || self.scheduler.pending().is_some() {
            return;
        }
        if let Some(next) = resolve(&song.tracks, &self.scanner) {
            debug!("Handing focus over to track {} '{}'", next.track.id, next.track.name);
            self.scheduler.schedule(PendingActivation {
                track: next.track.id,
                index: next.index,
                instrument: next.instrument,
            });
        }
    }

    /// The debounce timer for `ticket` elapsed
    pub fn on_activation_due(&mut self, ticket: ActivationTicket, song: &SongSnapshot) {
        let Some(pending) = self.scheduler.take_due(ticket) else {
            trace!("Ignoring superseded activation {:?}", ticket);
            return;
        };

        let watched = self
            .watches
            .iter()
            .any(|w| w.track() == pending.track && !w.is_released());
        let Some(index) = song.index_of(pending.track).filter(|_| watched) else {
            debug!("Track {} is gone, activation dropped", pending.track);
            return;
        };

        let track = &song.tracks[index];
        if !track.is_focus_candidate() {
            debug!("Track {} '{}' no longer armed, activation dropped", track.id, track.name);
            return;
        }

        if !track.arm {
            if let Err(e) = self.host.set_arm(track.id, true) {
                warn!("Failed to arm track {} '{}': {}", track.id, track.name, e);
            }
        }

        // Rescan: devices may have changed during the debounce
        let instrument = self.scanner.find_instrument(&track.devices);
        info!(
            "Focus on track {} '{}' ({})",
            track.id,
            track.name,
            describe(instrument.as_ref())
        );
        self.controlled = Some(track.id);
        self.emit_status("focus", index, track, instrument.as_ref());
    }

    /// Release every listener and forget focus; used on disconnect
    pub fn teardown(&mut self) {
        self.release_watches();
        if let Some(pending) = self.scheduler.cancel() {
            debug!("Pending activation of track {} dropped on teardown", pending.track);
        }
        self.controlled = None;
        info!("Focus engine torn down");
    }

    fn release_watches(&mut self) {
        for mut watch in self.watches.drain(..) {
            watch.release();
        }
    }

    fn emit_status(
        &self,
        event: &'static str,
        index: usize,
        track: &TrackSnapshot,
        instrument: Option<&InstrumentDescriptor>,
    ) {
        let bytes = protocol::status_update(&track.name, index, instrument);
        if let Err(e) = self.sink.send(&bytes) {
            warn!("Failed to send status for track '{}': {:#}", track.name, e);
        }

        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.announce(&FocusReport {
                event,
                track: track.name.clone(),
                index,
                instrument: instrument.cloned(),
            });
        }
    }
}

fn describe(instrument: Option<&InstrumentDescriptor>) -> String {
    match instrument {
        Some(instrument) => instrument.to_string(),
        None => "no instrument".to_string(),
    }
}
