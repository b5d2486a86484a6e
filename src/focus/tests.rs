//! Tests for the focus engine driven through a simulated host

use super::*;
use crate::bridge::BridgeEvent;
use crate::config::{BridgeConfig, DeviceRole};
use crate::host::{
    Device, Host, InstrumentDescriptor, SimulatedHost, SongSnapshot, Subscription, Topic, TrackId,
    TrackSnapshot,
};
use crate::protocol;
use crate::surface::RecordingSink;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    host: Arc<SimulatedHost>,
    sink: Arc<RecordingSink>,
    coordinator: FocusCoordinator,
    rx: mpsc::UnboundedReceiver<BridgeEvent>,
    _track_list: Subscription,
}

impl Harness {
    fn new(tracks: Vec<TrackSnapshot>) -> Self {
        Self::with(tracks, false, BridgeConfig::default())
    }

    fn with(tracks: Vec<TrackSnapshot>, exclusive: bool, config: BridgeConfig) -> Self {
        let host = Arc::new(SimulatedHost::new(SongSnapshot::new(tracks)).with_exclusive_arm(exclusive));
        let dyn_host: Arc<dyn Host> = host.clone();
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let list_tx = tx.clone();
        let track_list = Subscription::new(
            dyn_host.clone(),
            Topic::TrackList,
            Arc::new(move || {
                let _ = list_tx.send(BridgeEvent::TrackListChanged);
            }),
        )
        .unwrap();

        let mut coordinator = FocusCoordinator::new(dyn_host, sink.clone(), &config, tx);
        coordinator.rebuild(&host.snapshot());

        Self {
            host,
            sink,
            coordinator,
            rx,
            _track_list: track_list,
        }
    }

    fn dispatch(&mut self, event: BridgeEvent) {
        let song = self.host.snapshot();
        match event {
            BridgeEvent::TrackNotification {
                epoch,
                index,
                property,
            } => self.coordinator.on_track_notification(epoch, index, property, &song),
            BridgeEvent::ActivationDue(ticket) => self.coordinator.on_activation_due(ticket, &song),
            BridgeEvent::TrackListChanged => self.coordinator.rebuild(&song),
            _ => {}
        }
    }

    /// Handle everything already queued, without letting time pass
    fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.dispatch(event);
        }
    }

    /// Handle events until no activation is pending
    async fn settle(&mut self) {
        loop {
            self.drain();
            if self.coordinator.pending_activation().is_none() {
                return;
            }
            match self.rx.recv().await {
                Some(event) => self.dispatch(event),
                None => return,
            }
        }
    }
}

fn kontrol(instance: &str) -> Device {
    Device::instrument("PluginDevice", "Komplete Kontrol")
        .with_parameters(&["Program", &format!("NIKB{}", instance)])
}

fn status(name: &str, index: usize, instrument: Option<InstrumentDescriptor>) -> Vec<u8> {
    protocol::status_update(name, index, instrument.as_ref())
}

fn native(instance: &str) -> Option<InstrumentDescriptor> {
    Some(InstrumentDescriptor::new("Komplete Kontrol", Some(instance)))
}

#[tokio::test(start_paused = true)]
async fn test_startup_focuses_single_armed_track() {
    let harness = Harness::new(vec![
        TrackSnapshot::new(1, "Drums"),
        TrackSnapshot::new(2, "Keys").armed().with_devices(vec![kontrol("01")]),
    ]);

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    assert_eq!(harness.sink.frames(), vec![status("Keys", 1, native("01"))]);
    assert_eq!(harness.coordinator.watches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_startup_without_candidates_is_silent() {
    let harness = Harness::new(vec![
        TrackSnapshot::new(1, "Drums"),
        TrackSnapshot::new(2, "Return").unarmable(),
    ]);

    assert_eq!(harness.coordinator.controlled_track(), None);
    assert!(harness.sink.frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_arming_activates_after_debounce() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Drums"),
        TrackSnapshot::new(2, "Keys").with_devices(vec![kontrol("07")]),
    ]);

    harness.host.set_arm(TrackId(2), true).unwrap();
    harness.drain();
    assert!(harness.sink.frames().is_empty());
    assert_eq!(
        harness.coordinator.pending_activation().map(|p| p.track),
        Some(TrackId(2))
    );

    let start = tokio::time::Instant::now();
    harness.settle().await;
    assert!(start.elapsed() >= Duration::from_millis(100));

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    assert_eq!(harness.sink.frames(), vec![status("Keys", 1, native("07"))]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_candidates_activates_last_only() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "A"),
        TrackSnapshot::new(2, "B"),
        TrackSnapshot::new(3, "C"),
    ]);

    for id in 1..=3 {
        harness.host.set_implicit_arm(TrackId(id), true).unwrap();
    }
    harness.settle().await;

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(3)));
    assert_eq!(harness.sink.frames(), vec![status("C", 2, None)]);

    // Activation makes the implicit arm explicit
    let song = harness.host.snapshot();
    assert!(song.track(TrackId(3)).unwrap().arm);
    assert!(!song.track(TrackId(1)).unwrap().arm);
}

#[tokio::test(start_paused = true)]
async fn test_refocus_of_controlled_track_is_silent() {
    let mut harness = Harness::new(vec![TrackSnapshot::new(1, "Keys").armed()]);
    harness.sink.take();

    let song = harness.host.snapshot();
    harness
        .coordinator
        .on_track_activation_candidate(0, &song.tracks[0]);
    assert!(harness.coordinator.pending_activation().is_none());

    harness.coordinator.rebuild(&song);
    harness.settle().await;
    assert!(harness.sink.frames().is_empty());
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_unarming_controlled_track_releases_focus() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Drums"),
        TrackSnapshot::new(2, "Keys").armed().with_devices(vec![kontrol("01")]),
    ]);
    harness.sink.take();

    harness.host.set_arm(TrackId(2), false).unwrap();
    harness.settle().await;

    assert_eq!(harness.coordinator.controlled_track(), None);
    assert_eq!(harness.sink.frames(), vec![status("Keys", 1, native("01"))]);
}

#[tokio::test(start_paused = true)]
async fn test_unarm_during_debounce_cancels_activation() {
    let mut harness = Harness::new(vec![TrackSnapshot::new(1, "Keys")]);

    harness.host.set_arm(TrackId(1), true).unwrap();
    harness.drain();
    assert!(harness.coordinator.pending_activation().is_some());

    harness.host.set_arm(TrackId(1), false).unwrap();
    harness.drain();
    assert!(harness.coordinator.pending_activation().is_none());

    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.drain();
    assert!(harness.sink.frames().is_empty());
    assert_eq!(harness.coordinator.controlled_track(), None);
}

#[tokio::test(start_paused = true)]
async fn test_exclusive_arm_cascade_lands_on_new_track() {
    let mut harness = Harness::with(
        vec![
            TrackSnapshot::new(1, "Drums").armed(),
            TrackSnapshot::new(2, "Keys").with_devices(vec![kontrol("02")]),
        ],
        true,
        BridgeConfig::default(),
    );
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
    harness.sink.take();

    // Host unarms Drums, then arms Keys, all inside one call
    harness.host.set_arm(TrackId(2), true).unwrap();
    harness.settle().await;

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    assert_eq!(
        harness.sink.frames(),
        vec![status("Drums", 0, None), status("Keys", 1, native("02"))]
    );

    let song = harness.host.snapshot();
    let armed: Vec<TrackId> = song.tracks.iter().filter(|t| t.arm).map(|t| t.id).collect();
    assert_eq!(armed, vec![TrackId(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_release_hands_focus_to_remaining_armed_track() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Bass").armed(),
        TrackSnapshot::new(2, "Keys").armed().with_devices(vec![kontrol("03")]),
    ]);
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    harness.sink.take();

    harness.host.set_arm(TrackId(2), false).unwrap();
    harness.settle().await;

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
    assert_eq!(
        harness.sink.frames(),
        vec![status("Keys", 1, native("03")), status("Bass", 0, None)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rebuild_drops_pending_activation_and_stale_notifications() {
    let mut harness = Harness::new(vec![TrackSnapshot::new(1, "Keys")]);
    let first_epoch = harness.coordinator.epoch();

    harness.host.set_arm(TrackId(1), true).unwrap();
    harness.drain();
    assert!(harness.coordinator.pending_activation().is_some());

    // A new track in front shifts Keys to index 1
    harness.host.insert_track(0, TrackSnapshot::new(9, "Audio"));
    harness.drain();
    assert!(harness.coordinator.epoch() > first_epoch);
    assert!(harness.coordinator.pending_activation().is_none());
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
    assert_eq!(harness.sink.take(), vec![status("Keys", 1, None)]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.drain();
    assert!(harness.sink.frames().is_empty());

    // Queued under the old generation, handled after a rebuild
    harness.host.set_arm(TrackId(9), true).unwrap();
    let song = harness.host.snapshot();
    harness.coordinator.rebuild(&song);
    harness.drain();
    assert!(harness.coordinator.pending_activation().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_removing_focused_track_clears_focus_silently() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Drums"),
        TrackSnapshot::new(2, "Keys").armed(),
    ]);
    harness.sink.take();

    harness.host.remove_track(TrackId(2)).unwrap();
    harness.drain();

    assert_eq!(harness.coordinator.controlled_track(), None);
    assert!(harness.sink.frames().is_empty());
    assert_eq!(harness.coordinator.watches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_device_change_refreshes_focused_track() {
    let mut harness = Harness::new(vec![TrackSnapshot::new(1, "Keys").armed()]);
    harness.sink.take();

    harness.host.set_devices(TrackId(1), vec![kontrol("05")]).unwrap();
    harness.drain();

    assert_eq!(harness.sink.frames(), vec![status("Keys", 0, native("05"))]);
}

#[tokio::test(start_paused = true)]
async fn test_device_change_on_unfocused_track_is_ignored() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Bass").armed(),
        TrackSnapshot::new(2, "Keys").armed().with_devices(vec![kontrol("01")]),
    ]);
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    harness.sink.take();

    harness
        .host
        .set_devices(TrackId(1), vec![Device::instrument("OriginalSimpler", "Simpler")])
        .unwrap();
    harness.settle().await;

    assert!(harness.sink.frames().is_empty());
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
}

#[tokio::test(start_paused = true)]
async fn test_instrument_on_ambiguous_armed_track_takes_focus() {
    // Two armed tracks without instruments: ambiguous, no focus
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "A").armed(),
        TrackSnapshot::new(2, "B").armed(),
    ]);
    assert_eq!(harness.coordinator.controlled_track(), None);

    let simpler = vec![Device::instrument("OriginalSimpler", "Simpler")];
    harness.host.set_devices(TrackId(2), simpler.clone()).unwrap();
    harness.drain();
    assert!(harness.sink.frames().is_empty());
    assert_eq!(
        harness.coordinator.pending_activation().map(|p| p.track),
        Some(TrackId(2))
    );

    harness.settle().await;
    let instrument = InstrumentScanner::default().find_instrument(&simpler);
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    assert_eq!(harness.sink.frames(), vec![status("B", 1, instrument)]);
}

#[tokio::test(start_paused = true)]
async fn test_unarming_pending_track_hands_focus_to_remaining_armed_track() {
    let simpler = vec![Device::instrument("OriginalSimpler", "Simpler")];
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "A").armed().with_devices(simpler.clone()),
        TrackSnapshot::new(2, "B"),
        TrackSnapshot::new(3, "C").armed(),
    ]);
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
    harness.sink.take();

    // B is pending when A lets go, then B is unarmed inside its debounce
    harness.host.set_arm(TrackId(2), true).unwrap();
    harness.drain();
    harness.host.set_arm(TrackId(1), false).unwrap();
    harness.drain();
    assert_eq!(harness.coordinator.controlled_track(), None);
    harness.host.set_arm(TrackId(2), false).unwrap();
    harness.settle().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.drain();

    let instrument = InstrumentScanner::default().find_instrument(&simpler);
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(3)));
    assert_eq!(
        harness.sink.frames(),
        vec![status("A", 0, instrument), status("C", 2, None)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_notification_reports_position_in_current_song() {
    let mut harness = Harness::new(vec![TrackSnapshot::new(1, "Keys").armed()]);
    harness.sink.take();

    // Device change is queued before the list change that moves Keys to index 1
    harness.host.set_devices(TrackId(1), vec![kontrol("05")]).unwrap();
    harness.host.insert_track(0, TrackSnapshot::new(9, "Audio"));
    harness.drain();

    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(1)));
    assert_eq!(harness.sink.frames(), vec![status("Keys", 1, native("05"))]);
}

#[tokio::test(start_paused = true)]
async fn test_keyboard_role_never_activates() {
    let mut config = BridgeConfig::default();
    config.controller.role = DeviceRole::MidiKeyboard;
    let mut harness = Harness::with(
        vec![TrackSnapshot::new(1, "Keys"), TrackSnapshot::new(2, "Bass").armed()],
        false,
        config,
    );
    assert_eq!(harness.coordinator.controlled_track(), Some(TrackId(2)));
    harness.sink.take();

    harness.host.set_arm(TrackId(1), true).unwrap();
    harness.settle().await;

    assert!(harness.coordinator.pending_activation().is_none());
    assert!(harness.sink.frames().is_empty());
    // Devices listener only, plus the harness' track-list listener
    assert_eq!(harness.host.listener_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_releases_every_listener() {
    let mut harness = Harness::new(vec![
        TrackSnapshot::new(1, "Keys"),
        TrackSnapshot::new(2, "Return").unarmable(),
    ]);
    assert_eq!(harness.host.listener_count(), 1 + 3 + 1);

    harness.host.set_arm(TrackId(1), true).unwrap();
    harness.drain();
    harness.coordinator.teardown();

    assert_eq!(harness.host.listener_count(), 1);
    assert!(harness.coordinator.pending_activation().is_none());
    assert_eq!(harness.coordinator.controlled_track(), None);

    tokio::time::sleep(Duration::from_millis(500)).await;
    harness.drain();
    assert!(harness.sink.frames().is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Arm(u64),
    Unarm(u64),
    Implicit(u64, bool),
    Devices(u64, bool),
    Insert,
    Settle,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..=4).prop_map(Op::Arm),
        (1u64..=4).prop_map(Op::Unarm),
        ((1u64..=4), any::<bool>()).prop_map(|(id, on)| Op::Implicit(id, on)),
        ((1u64..=4), any::<bool>()).prop_map(|(id, native)| Op::Devices(id, native)),
        Just(Op::Insert),
        Just(Op::Settle),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_focus_settles_on_an_armed_track(
        ops in prop::collection::vec(op_strategy(), 1..24),
        exclusive in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let tracks = (1..=4).map(|id| TrackSnapshot::new(id, &format!("T{}", id))).collect();
            let mut harness = Harness::with(tracks, exclusive, BridgeConfig::default());
            let mut next_id = 100;

            for op in ops {
                // Ops may target tracks that the host rejects; that is fine
                match op {
                    Op::Arm(id) => { let _ = harness.host.set_arm(TrackId(id), true); }
                    Op::Unarm(id) => { let _ = harness.host.set_arm(TrackId(id), false); }
                    Op::Implicit(id, on) => { let _ = harness.host.set_implicit_arm(TrackId(id), on); }
                    Op::Devices(id, native) => {
                        let devices = if native {
                            vec![kontrol(&id.to_string())]
                        } else {
                            vec![Device::instrument("OriginalSimpler", "Simpler")]
                        };
                        let _ = harness.host.set_devices(TrackId(id), devices);
                    }
                    Op::Insert => {
                        harness.host.insert_track(0, TrackSnapshot::new(next_id, "New"));
                        next_id += 1;
                    }
                    Op::Settle => harness.settle().await,
                }
                harness.drain();
            }
            harness.settle().await;

            let song = harness.host.snapshot();
            if let Some(id) = harness.coordinator.controlled_track() {
                let track = song.track(id).expect("controlled track exists");
                assert!(track.is_focus_candidate(), "controlled track {} is not armed", id);
            }
            if !song.tracks.iter().any(|t| t.is_focus_candidate()) {
                assert_eq!(harness.coordinator.controlled_track(), None);
            }
            if let Some(expected) = resolve(&song.tracks, &InstrumentScanner::default()) {
                assert!(harness.coordinator.pending_activation().is_none());
                assert!(
                    harness.coordinator.controlled_track().is_some(),
                    "track {} resolves but nothing is focused",
                    expected.track.id
                );
            }

            // One watch per track, all from the current generation
            assert_eq!(harness.coordinator.watches().len(), song.tracks.len());
            assert_eq!(harness.host.listener_count(), 1 + 3 * song.tracks.len());
        });
    }
}
