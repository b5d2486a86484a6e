//! Session files for the simulated host
//!
//! A session is a YAML serialisation of [`SongSnapshot`] plus the host preferences
//! the simulated host honours. The watcher reloads it on modification so track
//! lists can be edited while the bridge runs.

use anyhow::{bail, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::SongSnapshot;

/// Session file contents
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    /// Arming one track unarms every other track
    #[serde(default)]
    pub exclusive_arm: bool,
    #[serde(flatten)]
    pub song: SongSnapshot,
}

/// Load and validate a session file
pub async fn load_session(path: &str) -> Result<Session> {
    let contents = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read session file: {}", path))?;

    parse_session(&contents).with_context(|| format!("Invalid session file: {}", path))
}

/// Parse a session from YAML text
pub fn parse_session(contents: &str) -> Result<Session> {
    let session: Session =
        serde_yaml::from_str(contents).context("Failed to parse session YAML")?;
    let song = &session.song;

    let mut seen = HashSet::new();
    for track in &song.tracks {
        if !seen.insert(track.id) {
            bail!("Duplicate track id {}", track.id);
        }
    }

    if let Some(selected) = song.selected_track {
        if song.track(selected).is_none() {
            bail!("Selected track {} is not part of the session", selected);
        }
    }

    Ok(session)
}

/// Watches a session file and yields the reloaded session on every modification
pub struct SessionWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Session>,
}

impl SessionWatcher {
    /// Start watching; also returns the initial session
    pub async fn new(session_path: String) -> Result<(Self, Session)> {
        let (tx, rx) = mpsc::channel(10);

        let initial = load_session(&session_path)
            .await
            .context("Failed to load initial session")?;

        let path_clone = session_path.clone();

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        debug!("Session file modified: {:?}", event.paths);

                        let session_path = path_clone.clone();
                        let tx = tx.clone();

                        runtime_handle.spawn(async move {
                            // Let the editor finish writing
                            tokio::time::sleep(Duration::from_millis(100)).await;

                            match load_session(&session_path).await {
                                Ok(session) => {
                                    info!("Session reloaded ({} tracks)", session.song.tracks.len());
                                    if let Err(e) = tx.send(session).await {
                                        error!("Failed to send session update: {}", e);
                                    }
                                }
                                Err(e) => {
                                    warn!("Failed to reload session (keeping old tracks): {:#}", e);
                                }
                            }
                        });
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&session_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch session file: {}", session_path))?;

        info!("Session file watcher started for: {}", session_path);

        Ok((Self { _watcher: watcher, rx }, initial))
    }

    /// Wait for the next reload; `None` once the watcher is closed
    pub async fn next_session(&mut self) -> Option<Session> {
        self.rx.recv().await
    }
}
