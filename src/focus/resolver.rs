//! Focus resolution over a song snapshot

use super::scanner::InstrumentScanner;
use crate::host::{InstrumentDescriptor, TrackSnapshot};

/// Resolved focus: the controlled track and the instrument found on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Focus<'a> {
    pub index: usize,
    pub track: &'a TrackSnapshot,
    pub instrument: Option<InstrumentDescriptor>,
}

/// Pick the single track the keyboard should control
///
/// Candidates are armable tracks that are armed or implicitly armed. A lone
/// candidate always wins, with or without an instrument. With several candidates
/// the first one carrying a native instrument wins, then the first one carrying
/// any instrument; if none has an instrument there is no focus.
pub fn resolve<'a>(tracks: &'a [TrackSnapshot], scanner: &InstrumentScanner) -> Option<Focus<'a>> {
    let candidates: Vec<(usize, &TrackSnapshot)> = tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_focus_candidate())
        .collect();

    match candidates.as_slice() {
        [] => None,
        [(index, track)] => Some(Focus {
            index: *index,
            track: *track,
            instrument: scanner.find_instrument(&track.devices),
        }),
        _ => {
            let scanned: Vec<Focus<'a>> = candidates
                .into_iter()
                .map(|(index, track)| Focus {
                    index,
                    track,
                    instrument: scanner.find_instrument(&track.devices),
                })
                .collect();

            if let Some(native) = scanned
                .iter()
                .position(|f| f.instrument.as_ref().is_some_and(|i| i.is_native()))
            {
                return scanned.into_iter().nth(native);
            }

            scanned.into_iter().find(|f| f.instrument.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Device, TrackId};

    fn native(id: &str) -> Device {
        Device::instrument("PluginDevice", "Komplete Kontrol")
            .with_parameters(&["Main", &format!("NIKB{}", id)])
    }

    fn resolved_id(tracks: &[TrackSnapshot]) -> Option<TrackId> {
        resolve(tracks, &InstrumentScanner::default()).map(|f| f.track.id)
    }

    #[test]
    fn test_no_candidates() {
        let tracks = vec![
            TrackSnapshot::new(1, "A"),
            TrackSnapshot::new(2, "B").armed().unarmable(),
        ];
        assert_eq!(resolved_id(&tracks), None);
    }

    #[test]
    fn test_single_candidate_without_instrument() {
        let tracks = vec![
            TrackSnapshot::new(1, "Audio"),
            TrackSnapshot::new(2, "Vocals").armed(),
        ];
        let focus = resolve(&tracks, &InstrumentScanner::default()).unwrap();
        assert_eq!(focus.index, 1);
        assert_eq!(focus.track.id, TrackId(2));
        assert_eq!(focus.instrument, None);
    }

    #[test]
    fn test_implicit_arm_counts() {
        let tracks = vec![
            TrackSnapshot::new(1, "A"),
            TrackSnapshot::new(2, "B").implicit_armed(),
        ];
        assert_eq!(resolved_id(&tracks), Some(TrackId(2)));
    }

    #[test]
    fn test_native_match_wins_over_order() {
        let tracks = vec![
            TrackSnapshot::new(1, "Piano")
                .armed()
                .with_devices(vec![Device::instrument("Operator", "Operator")]),
            TrackSnapshot::new(2, "Strings")
                .armed()
                .with_devices(vec![native("05")]),
        ];
        let focus = resolve(&tracks, &InstrumentScanner::default()).unwrap();
        assert_eq!(focus.track.id, TrackId(2));
        assert_eq!(focus.index, 1);
        assert_eq!(
            focus.instrument,
            Some(InstrumentDescriptor::new("Komplete Kontrol", Some("05")))
        );
    }

    #[test]
    fn test_fallback_to_first_any_match() {
        let tracks = vec![
            TrackSnapshot::new(1, "Audio").armed(),
            TrackSnapshot::new(2, "Piano")
                .armed()
                .with_devices(vec![Device::instrument("Operator", "Operator")]),
            TrackSnapshot::new(3, "Bass")
                .implicit_armed()
                .with_devices(vec![Device::instrument("Wavetable", "Wavetable")]),
        ];
        assert_eq!(resolved_id(&tracks), Some(TrackId(2)));
    }

    #[test]
    fn test_ambiguous_without_instruments_has_no_focus() {
        let tracks = vec![
            TrackSnapshot::new(1, "Audio 1").armed(),
            TrackSnapshot::new(2, "Audio 2").armed(),
        ];
        assert_eq!(resolved_id(&tracks), None);
    }

    #[test]
    fn test_single_candidate_skips_native_priority() {
        // One armed plain-instrument track wins even though an unarmed native one exists
        let tracks = vec![
            TrackSnapshot::new(1, "Kontrol").with_devices(vec![native("01")]),
            TrackSnapshot::new(2, "Piano")
                .armed()
                .with_devices(vec![Device::instrument("Operator", "Operator")]),
        ];
        assert_eq!(resolved_id(&tracks), Some(TrackId(2)));
    }
}
