//! Periodic playlist updates
//!
//! The update interval and the time of the last check live in the key-value
//! store. A background thread wakes up every `poll_every` and refreshes all
//! playlists once the interval has elapsed.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::repository::PlaylistRepository;
use crate::storage::{KeyValueStore, LAST_UPDATE_CHECK_KEY, UPDATE_INTERVAL_KEY};

/// How often playlists are refreshed automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateInterval {
    minutes: u32,
}

impl UpdateInterval {
    pub const MANUAL: UpdateInterval = UpdateInterval { minutes: 0 };

    pub const fn from_minutes(minutes: u32) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    /// Zero minutes means playlists are only refreshed on request
    pub fn is_manual(&self) -> bool {
        self.minutes == 0
    }

    /// Get human-readable label
    pub fn label(&self) -> String {
        UPDATE_INTERVALS
            .iter()
            .find(|(_, interval)| interval == self)
            .map(|(label, _)| label.to_string())
            .unwrap_or_else(|| format!("{} minutes", self.minutes))
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        DEFAULT_UPDATE_INTERVAL
    }
}

/// 6 hours
pub const DEFAULT_UPDATE_INTERVAL: UpdateInterval = UpdateInterval::from_minutes(360);

/// Intervals offered in settings
pub const UPDATE_INTERVALS: [(&str, UpdateInterval); 5] = [
    ("1 hour", UpdateInterval::from_minutes(60)),
    ("6 hours", UpdateInterval::from_minutes(360)),
    ("12 hours", UpdateInterval::from_minutes(720)),
    ("24 hours", UpdateInterval::from_minutes(1440)),
    ("Manual only", UpdateInterval::MANUAL),
];

pub struct UpdateScheduler {
    repo: Arc<PlaylistRepository>,
    store: Arc<dyn KeyValueStore>,
}

impl UpdateScheduler {
    pub fn new(repo: Arc<PlaylistRepository>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { repo, store }
    }

    pub fn update_interval(&self) -> Result<UpdateInterval> {
        let Some(raw) = self.store.get(UPDATE_INTERVAL_KEY)? else {
            return Ok(DEFAULT_UPDATE_INTERVAL);
        };

        match raw.trim().parse::<u32>() {
            Ok(minutes) => Ok(UpdateInterval::from_minutes(minutes)),
            Err(_) => {
                warn!(value = %raw, "unreadable update interval, using default");
                Ok(DEFAULT_UPDATE_INTERVAL)
            }
        }
    }

    pub fn set_update_interval(&self, interval: UpdateInterval) -> Result<()> {
        self.store.set(UPDATE_INTERVAL_KEY, &interval.minutes().to_string())?;
        info!(minutes = interval.minutes(), "update interval changed");
        Ok(())
    }

    /// Time of the last automatic update, `None` if there never was one
    pub fn last_update_check(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(LAST_UPDATE_CHECK_KEY)? else {
            return Ok(None);
        };

        Ok(raw.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
    }

    /// Refresh all playlists if the configured interval has elapsed.
    /// Returns whether an update ran.
    pub fn check_for_updates_if_needed(&self, now: DateTime<Utc>) -> Result<bool> {
        let interval = self.update_interval()?;
        if interval.is_manual() {
            return Ok(false);
        }

        if let Some(last) = self.last_update_check()? {
            let elapsed = now.signed_duration_since(last);
            if elapsed < chrono::Duration::minutes(i64::from(interval.minutes())) {
                debug!(elapsed_minutes = elapsed.num_minutes(), "playlists are fresh");
                return Ok(false);
            }
        }

        self.perform_update(now)
    }

    /// Refresh all playlists now and record the check time
    pub fn perform_update(&self, now: DateTime<Utc>) -> Result<bool> {
        let report = self.repo.refresh_all()?;
        self.store.set(LAST_UPDATE_CHECK_KEY, &now.timestamp_millis().to_string())?;
        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "scheduled update finished"
        );
        Ok(true)
    }

    /// Run the check now and then every `poll_every` on a background thread
    pub fn spawn(self: Arc<Self>, poll_every: Duration) -> SchedulerHandle {
        let (stop_tx, stop_rx) = channel::<()>();

        let thread = thread::spawn(move || loop {
            if let Err(e) = self.check_for_updates_if_needed(Utc::now()) {
                warn!(error = %e, "scheduled update failed");
            }

            match stop_rx.recv_timeout(poll_every) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        });

        SchedulerHandle { stop: Some(stop_tx), thread: Some(thread) }
    }
}

/// Stops the background thread when dropped
pub struct SchedulerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Block until the background thread exits (it only does once stopped)
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
