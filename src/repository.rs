//! Playlist repository
//!
//! Owns the playlist collection and is its only writer. Every mutation
//! serializes the whole collection and writes it under [`PLAYLISTS_KEY`]
//! before the in-memory copy is replaced, so a failed write changes nothing.
//!
//! Fetches run outside the state lock; their results are applied by playlist
//! id once they land.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{PlaylistError, Result};
use crate::fetcher::{fetch_playlist, PlaylistSource};
use crate::models::{Channel, Playlist};
use crate::storage::{load_json, save_json, KeyValueStore, PLAYLISTS_KEY};

/// Observable repository state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryStatus {
    /// True while any fetch is in flight
    pub loading: bool,
    /// Message of the last failed operation, cleared when the next one starts
    pub error: Option<String>,
}

/// Outcome of [`PlaylistRepository::refresh_all`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    playlists: Vec<Playlist>,
    in_flight: usize,
    error: Option<String>,
}

pub struct PlaylistRepository {
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn PlaylistSource>,
    state: Mutex<RepositoryState>,
}

impl PlaylistRepository {
    /// Load the persisted collection; a missing record is an empty collection
    pub fn open(store: Arc<dyn KeyValueStore>, source: Arc<dyn PlaylistSource>) -> Result<Self> {
        let playlists: Vec<Playlist> = load_json(store.as_ref(), PLAYLISTS_KEY)?.unwrap_or_default();
        info!(count = playlists.len(), "loaded playlists");

        Ok(Self {
            store,
            source,
            state: Mutex::new(RepositoryState { playlists, ..Default::default() }),
        })
    }

    fn state(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.state().playlists.clone()
    }

    pub fn get(&self, id: &str) -> Option<Playlist> {
        self.state().playlists.iter().find(|p| p.id == id).cloned()
    }

    pub fn status(&self) -> RepositoryStatus {
        let state = self.state();
        RepositoryStatus {
            loading: state.in_flight > 0,
            error: state.error.clone(),
        }
    }

    /// Append a playlist and persist
    pub fn add(&self, playlist: Playlist) -> Result<()> {
        let mut state = self.state();
        let mut next = state.playlists.clone();
        info!(id = %playlist.id, name = %playlist.name, "adding playlist");
        next.push(playlist);
        self.commit(&mut state, next)
    }

    /// Fetch a new playlist and add it. On failure the collection is unchanged.
    pub fn add_from_url(&self, url: &str, name: Option<&str>) -> Result<Playlist> {
        let _loading = self.start_loading();
        let result = fetch_playlist(self.source.as_ref(), url, name).and_then(|playlist| {
            self.add(playlist.clone())?;
            Ok(playlist)
        });
        self.record_failure(result)
    }

    /// Remove by id; unknown ids are ignored
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        if !state.playlists.iter().any(|p| p.id == id) {
            debug!(id, "remove: no such playlist");
            return Ok(());
        }

        let next = state.playlists.iter().filter(|p| p.id != id).cloned().collect();
        info!(id, "removing playlist");
        self.commit(&mut state, next)
    }

    /// Re-fetch one playlist from its stored URL, keeping its id and name
    pub fn refresh_one(&self, id: &str) -> Result<()> {
        self.refresh_with_name(id, None)
    }

    /// Re-fetch one playlist; a non-empty `name` replaces the stored one
    pub fn refresh_with_name(&self, id: &str, name: Option<&str>) -> Result<()> {
        let _loading = self.start_loading();

        let Some(existing) = self.get(id) else {
            debug!(id, "refresh: no such playlist");
            return Ok(());
        };

        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(existing.name.as_str());
        let result = fetch_playlist(self.source.as_ref(), &existing.url, Some(name))
            .and_then(|fresh| self.apply_refreshed(vec![(existing.id.clone(), fresh)]))
            .map(|_| ());

        if let Err(e) = &result {
            warn!(id, error = %e, "playlist refresh failed");
        }
        self.record_failure(result)
    }

    /// Re-fetch every playlist concurrently. A playlist whose fetch fails keeps
    /// its previous record; only a failure to persist fails the whole call.
    pub fn refresh_all(&self) -> Result<RefreshReport> {
        let _loading = self.start_loading();
        let result = self.refresh_all_inner();
        self.record_failure(result)
    }

    fn refresh_all_inner(&self) -> Result<RefreshReport> {
        let snapshot = self.playlists();
        if snapshot.is_empty() {
            return Ok(RefreshReport::default());
        }

        let source = self.source.as_ref();
        let outcomes: Vec<(String, Result<Playlist>)> = thread::scope(|scope| {
            let handles: Vec<_> = snapshot
                .iter()
                .map(|p| (p, scope.spawn(move || fetch_playlist(source, &p.url, Some(p.name.as_str())))))
                .collect();

            handles
                .into_iter()
                .map(|(p, handle)| {
                    let outcome = handle
                        .join()
                        .unwrap_or_else(|_| Err(PlaylistError::network("fetch worker panicked")));
                    (p.id.clone(), outcome)
                })
                .collect()
        });

        let mut report = RefreshReport::default();
        let mut fresh = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(playlist) => fresh.push((id, playlist)),
                Err(e) => {
                    warn!(id = %id, error = %e, "keeping previous playlist after failed refresh");
                    report.failed.push(id);
                }
            }
        }

        report.refreshed = self.apply_refreshed(fresh)?;
        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "refreshed all playlists"
        );
        Ok(report)
    }

    /// Replace records by id. Playlists removed while their fetch was in
    /// flight are skipped. Returns the ids actually replaced.
    fn apply_refreshed(&self, refreshed: Vec<(String, Playlist)>) -> Result<Vec<String>> {
        let mut state = self.state();
        let mut next = state.playlists.clone();
        let mut applied = Vec::new();

        for (id, fresh) in refreshed {
            let Some(current) = next.iter_mut().find(|p| p.id == id) else {
                debug!(id = %id, "playlist removed during refresh");
                continue;
            };
            *current = merge_refresh(current, fresh);
            applied.push(id);
        }

        if !applied.is_empty() {
            self.commit(&mut state, next)?;
        }
        Ok(applied)
    }

    /// Persist `next`, then make it the in-memory collection
    fn commit(&self, state: &mut RepositoryState, next: Vec<Playlist>) -> Result<()> {
        save_json(self.store.as_ref(), PLAYLISTS_KEY, &next)?;
        state.playlists = next;
        Ok(())
    }

    fn start_loading(&self) -> LoadingGuard<'_> {
        let mut state = self.state();
        state.in_flight += 1;
        state.error = None;
        LoadingGuard { repo: self }
    }

    fn record_failure<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.state().error = Some(e.to_string());
        }
        result
    }
}

/// Keeps `loading` raised until dropped
struct LoadingGuard<'a> {
    repo: &'a PlaylistRepository,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.repo.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

fn merge_refresh(previous: &Playlist, fresh: Playlist) -> Playlist {
    Playlist {
        id: previous.id.clone(),
        name: fresh.name,
        url: previous.url.clone(),
        channels: carry_over_channel_ids(&previous.channels, fresh.channels),
        last_updated: fresh.last_updated,
        epg_url: fresh.epg_url,
    }
}

/// Reuse the id of a previous channel with the same name and URL, so stored
/// favorites and watch history keep pointing at it after a refresh.
fn carry_over_channel_ids(previous: &[Channel], mut fresh: Vec<Channel>) -> Vec<Channel> {
    let mut known: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
    for channel in previous.iter().rev() {
        known
            .entry((channel.name.as_str(), channel.url.as_str()))
            .or_default()
            .push(channel.id.as_str());
    }

    let reused: Vec<Option<String>> = fresh
        .iter()
        .map(|c| {
            known
                .get_mut(&(c.name.as_str(), c.url.as_str()))
                .and_then(Vec::pop)
                .map(str::to_string)
        })
        .collect();

    for (channel, id) in fresh.iter_mut().zip(reused) {
        if let Some(id) = id {
            channel.id = id;
        }
    }

    fresh
}
