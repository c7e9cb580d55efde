//! Fakes shared by the repository and scheduler tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::error::{PlaylistError, Result, StorageError};
use crate::fetcher::PlaylistSource;
use crate::models::{generate_id, Channel, Playlist, DEFAULT_CATEGORY};
use crate::storage::{KeyValueStore, MemoryStore};

pub fn channel(name: &str, url: &str) -> Channel {
    Channel {
        id: generate_id(),
        name: name.to_string(),
        url: url.to_string(),
        category: DEFAULT_CATEGORY.to_string(),
        logo: None,
        tvg_id: None,
        tvg_name: None,
    }
}

pub fn playlist(name: &str, url: &str) -> Playlist {
    Playlist {
        id: generate_id(),
        name: name.to_string(),
        url: url.to_string(),
        channels: vec![channel(&format!("{} One", name), &format!("{}/1", url))],
        last_updated: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        epg_url: None,
    }
}

/// M3U body with one channel per name
pub fn m3u_body(names: &[&str]) -> String {
    let mut body = String::from("#EXTM3U\n");
    for name in names {
        body.push_str(&format!(
            "#EXTINF:-1 group-title=\"News\",{}\nhttp://stream/{}\n",
            name,
            name.to_lowercase()
        ));
    }
    body
}

/// Serves canned bodies or error statuses by URL
#[derive(Default)]
pub struct FakeSource {
    responses: Mutex<HashMap<String, std::result::Result<String, u16>>>,
    calls: AtomicUsize,
    rendezvous: Option<Rendezvous>,
    gate: Option<Gate>,
}

/// Holds every fetch until `expected` fetches are waiting at once
struct Rendezvous {
    expected: usize,
    arrived: Mutex<usize>,
    all_arrived: Condvar,
    met: AtomicBool,
}

/// Holds every fetch until released
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    blocked: usize,
    open: bool,
}

const WAIT_LIMIT: Duration = Duration::from_secs(5);

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches only return once `expected` of them are in flight together
    /// (or after a timeout).
    pub fn with_rendezvous(expected: usize) -> Self {
        Self {
            rendezvous: Some(Rendezvous {
                expected,
                arrived: Mutex::new(0),
                all_arrived: Condvar::new(),
                met: AtomicBool::new(false),
            }),
            ..Self::default()
        }
    }

    /// Fetches block inside `fetch_text` until [`FakeSource::release`]
    pub fn with_gate() -> Self {
        Self { gate: Some(Gate::default()), ..Self::default() }
    }

    /// Wait until `count` fetches are held at the gate
    pub fn wait_for_blocked(&self, count: usize) -> bool {
        let Some(gate) = &self.gate else { return false };
        let state = gate.state.lock().unwrap();
        let (state, _) = gate
            .changed
            .wait_timeout_while(state, WAIT_LIMIT, |s| s.blocked < count)
            .unwrap();
        state.blocked >= count
    }

    /// Let held fetches through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.state.lock().unwrap().open = true;
            gate.changed.notify_all();
        }
    }

    /// Close the gate again for the next operation
    pub fn reset_gate(&self) {
        if let Some(gate) = &self.gate {
            *gate.state.lock().unwrap() = GateState::default();
        }
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(status));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rendezvous_met(&self) -> bool {
        self.rendezvous.as_ref().is_some_and(|r| r.met.load(Ordering::SeqCst))
    }

    fn wait_for_peers(&self) {
        let Some(r) = &self.rendezvous else { return };
        let mut arrived = r.arrived.lock().unwrap();
        *arrived += 1;
        if *arrived >= r.expected {
            r.met.store(true, Ordering::SeqCst);
            r.all_arrived.notify_all();
            return;
        }
        let _ = r
            .all_arrived
            .wait_timeout_while(arrived, WAIT_LIMIT, |n| *n < r.expected)
            .unwrap();
    }

    fn wait_at_gate(&self) {
        let Some(gate) = &self.gate else { return };
        let mut state = gate.state.lock().unwrap();
        state.blocked += 1;
        gate.changed.notify_all();
        let _ = gate.changed.wait_timeout_while(state, WAIT_LIMIT, |s| !s.open).unwrap();
    }
}

impl PlaylistSource for FakeSource {
    fn fetch_text(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.wait_for_peers();
        self.wait_at_gate();

        match self.responses.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(code)) => Err(PlaylistError::http_status(*code, "Service Unavailable")),
            None => Err(PlaylistError::network("connection refused")),
        }
    }
}

/// Memory store whose writes can be switched off
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_writes: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> std::result::Result<(), StorageError> {
        self.inner.remove(key)
    }
}
