//! In-memory host used by the REPL and by tests
//!
//! Mirrors the host behaviour the bridge relies on: listeners fire synchronously
//! after each mutation, and with exclusive arming enabled arming one track unarms
//! every other armed track (the cascade the activation debounce absorbs).

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

use super::{
    Device, Host, HostError, Listener, ListenerId, SongSnapshot, Topic, TrackId, TrackProperty,
    TrackSnapshot,
};

struct Inner {
    song: SongSnapshot,
    listeners: HashMap<ListenerId, (Topic, Listener)>,
    next_listener_id: u64,
    removed_listeners: usize,
    exclusive_arm: bool,
}

/// Host backed by a [`SongSnapshot`] held in memory
pub struct SimulatedHost {
    inner: Mutex<Inner>,
}

impl SimulatedHost {
    pub fn new(song: SongSnapshot) -> Self {
        Self {
            inner: Mutex::new(Inner {
                song,
                listeners: HashMap::new(),
                next_listener_id: 1,
                removed_listeners: 0,
                exclusive_arm: false,
            }),
        }
    }

    /// Arming a track unarms all others, like the host's exclusive-arm preference
    pub fn with_exclusive_arm(self, exclusive: bool) -> Self {
        self.set_exclusive_arm(exclusive);
        self
    }

    pub fn set_exclusive_arm(&self, exclusive: bool) {
        self.inner.lock().exclusive_arm = exclusive;
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Number of successful `remove_listener` calls so far
    pub fn removed_listener_count(&self) -> usize {
        self.inner.lock().removed_listeners
    }

    /// Replace the whole song (session reload) and report a track-list change
    pub fn replace_song(&self, song: SongSnapshot) {
        let playing_changed = {
            let mut inner = self.inner.lock();
            let changed = inner.song.is_playing != song.is_playing;
            inner.song = song;
            changed
        };

        let mut topics = vec![Topic::TrackList];
        if playing_changed {
            topics.push(Topic::IsPlaying);
        }
        self.notify(&topics);
    }

    pub fn insert_track(&self, index: usize, track: TrackSnapshot) {
        {
            let mut inner = self.inner.lock();
            let index = index.min(inner.song.tracks.len());
            inner.song.tracks.insert(index, track);
        }
        self.notify(&[Topic::TrackList]);
    }

    pub fn remove_track(&self, id: TrackId) -> Result<(), HostError> {
        {
            let mut inner = self.inner.lock();
            let index = inner
                .song
                .index_of(id)
                .ok_or(HostError::UnknownTrack(id))?;
            inner.song.tracks.remove(index);
            if inner.song.selected_track == Some(id) {
                inner.song.selected_track = None;
            }
        }
        self.notify(&[Topic::TrackList]);
        Ok(())
    }

    pub fn set_implicit_arm(&self, id: TrackId, implicit_arm: bool) -> Result<(), HostError> {
        let changed = {
            let mut inner = self.inner.lock();
            let track = inner
                .song
                .track_mut(id)
                .ok_or(HostError::UnknownTrack(id))?;
            let changed = track.implicit_arm != implicit_arm;
            track.implicit_arm = implicit_arm;
            changed
        };

        if changed {
            self.notify(&[Topic::Track(id, TrackProperty::ImplicitArm)]);
        }
        Ok(())
    }

    pub fn set_devices(&self, id: TrackId, devices: Vec<Device>) -> Result<(), HostError> {
        {
            let mut inner = self.inner.lock();
            let track = inner
                .song
                .track_mut(id)
                .ok_or(HostError::UnknownTrack(id))?;
            track.devices = devices;
        }
        self.notify(&[Topic::Track(id, TrackProperty::Devices)]);
        Ok(())
    }

    pub fn set_playing(&self, playing: bool) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.song.is_playing != playing;
            inner.song.is_playing = playing;
            changed
        };

        if changed {
            self.notify(&[Topic::IsPlaying]);
        }
    }

    /// Invoke the listeners of each topic in order, outside the lock
    fn notify(&self, topics: &[Topic]) {
        for topic in topics {
            let listeners: Vec<Listener> = {
                let inner = self.inner.lock();
                inner
                    .listeners
                    .values()
                    .filter(|(t, _)| t == topic)
                    .map(|(_, l)| l.clone())
                    .collect()
            };

            trace!("Notifying {} listener(s) of {:?}", listeners.len(), topic);
            for listener in listeners {
                listener();
            }
        }
    }
}

impl Host for SimulatedHost {
    fn snapshot(&self) -> SongSnapshot {
        self.inner.lock().song.clone()
    }

    fn add_listener(&self, topic: Topic, listener: Listener) -> Result<ListenerId, HostError> {
        let mut inner = self.inner.lock();

        if let Topic::Track(id, _) = topic {
            if inner.song.track(id).is_none() {
                return Err(HostError::UnknownTrack(id));
            }
        }

        let id = ListenerId(inner.next_listener_id);
        inner.next_listener_id += 1;
        inner.listeners.insert(id, (topic, listener));
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        let mut inner = self.inner.lock();
        if inner.listeners.remove(&id).is_some() {
            inner.removed_listeners += 1;
        }
    }

    fn set_arm(&self, id: TrackId, arm: bool) -> Result<(), HostError> {
        let mut changed = Vec::new();
        {
            let mut inner = self.inner.lock();
            let exclusive = inner.exclusive_arm;
            let track = inner.song.track(id).ok_or(HostError::UnknownTrack(id))?;
            if !track.can_be_armed {
                return Err(HostError::NotArmable(id));
            }

            if arm && exclusive {
                for other in inner.song.tracks.iter_mut() {
                    if other.id != id && other.arm {
                        other.arm = false;
                        changed.push(other.id);
                    }
                }
            }

            if let Some(track) = inner.song.track_mut(id) {
                if track.arm != arm {
                    track.arm = arm;
                    changed.push(id);
                }
            }
        }

        debug!("Host arm {} = {} ({} track(s) changed)", id, arm, changed.len());
        let topics: Vec<Topic> = changed
            .into_iter()
            .map(|t| Topic::Track(t, TrackProperty::Arm))
            .collect();
        self.notify(&topics);
        Ok(())
    }

    fn select_track(&self, id: TrackId) -> Result<(), HostError> {
        let mut inner = self.inner.lock();
        if inner.song.track(id).is_none() {
            return Err(HostError::UnknownTrack(id));
        }
        inner.song.selected_track = Some(id);
        Ok(())
    }

    fn stop_playing(&self) {
        self.set_playing(false);
    }
}
