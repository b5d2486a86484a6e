//! Track navigation from the keyboard's arrow buttons
//!
//! Moving left or right selects the neighbouring armable track and arms it
//! exclusively ("smart arm"). Arming a track whose name carries the `[M]` tag
//! also arms every `[MIDISRC]` track, so a dedicated MIDI source track can keep
//! feeding the instrument.

use tracing::debug;

use crate::host::{Host, HostError, SongSnapshot, TrackId};

/// Control change of the left arrow button
pub const NAV_LEFT_CC: u8 = 20;

/// Control change of the right arrow button
pub const NAV_RIGHT_CC: u8 = 21;

/// Name tag of a track that wants the MIDI source tracks armed with it
pub const MIDI_TARGET_TAG: &str = "[M]";

/// Name tag of a MIDI source track
pub const MIDI_SOURCE_TAG: &str = "[MIDISRC]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Left,
    Right,
}

impl NavDirection {
    pub fn from_cc(cc: u8) -> Option<Self> {
        match cc {
            NAV_LEFT_CC => Some(Self::Left),
            NAV_RIGHT_CC => Some(Self::Right),
            _ => None,
        }
    }

    fn step(self) -> isize {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }
}

/// One arm flag to set on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmChange {
    pub track: TrackId,
    pub arm: bool,
}

/// First armable track after `from` in `direction`
///
/// Without a starting position the search starts past the end of the list.
pub fn next_armable(song: &SongSnapshot, from: Option<usize>, direction: NavDirection) -> Option<TrackId> {
    let len = song.tracks.len() as isize;
    let mut position = from.map_or(len, |i| i as isize) + direction.step();

    while (0..len).contains(&position) {
        let track = &song.tracks[position as usize];
        if track.can_be_armed {
            return Some(track.id);
        }
        position += direction.step();
    }
    None
}

/// Arm changes needed to smart-arm `target`; empty if nothing to do
pub fn plan_smart_arm(song: &SongSnapshot, target: TrackId) -> Vec<ArmChange> {
    let Some(track) = song.track(target) else {
        return Vec::new();
    };
    if !track.can_be_armed || track.arm {
        return Vec::new();
    }

    let with_midi_sources = track.name.contains(MIDI_TARGET_TAG);
    let mut changes = Vec::new();

    for other in &song.tracks {
        if other.id == target || !other.can_be_armed {
            continue;
        }
        if with_midi_sources && other.name.contains(MIDI_SOURCE_TAG) {
            if !other.arm {
                changes.push(ArmChange {
                    track: other.id,
                    arm: true,
                });
            }
        } else if other.arm {
            changes.push(ArmChange {
                track: other.id,
                arm: false,
            });
        }
    }

    changes.push(ArmChange {
        track: target,
        arm: true,
    });
    changes
}

/// Apply a smart arm of `target` to the host
pub fn smart_arm(host: &dyn Host, song: &SongSnapshot, target: TrackId) -> Result<(), HostError> {
    for change in plan_smart_arm(song, target) {
        host.set_arm(change.track, change.arm)?;
    }
    Ok(())
}

/// Handle one press of an arrow button
pub fn navigate(host: &dyn Host, song: &SongSnapshot, direction: NavDirection) -> Result<(), HostError> {
    let current = song.selected_track.and_then(|id| song.index_of(id));

    if let Some(index) = current {
        let selected = &song.tracks[index];
        if selected.can_be_armed && !selected.arm {
            debug!("Arming selected track '{}' before moving", selected.name);
            return smart_arm(host, song, selected.id);
        }
    }

    match next_armable(song, current, direction) {
        Some(next) => {
            debug!("Navigating {:?} to track {}", direction, next);
            host.select_track(next)?;
            smart_arm(host, song, next)
        }
        None => match current {
            Some(index) => smart_arm(host, song, song.tracks[index].id),
            None => Ok(()),
        },
    }
}
