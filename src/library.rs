//! Favorites and recently watched channels
//!
//! Both are lists of channel ids persisted as JSON arrays, written through on
//! every change.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::Result;
use crate::storage::{load_json, save_json, KeyValueStore, FAVORITES_KEY, RECENTLY_WATCHED_KEY};

/// Maximum number of recently watched entries kept
pub const MAX_RECENT_ITEMS: usize = 10;

/// Ordered id list bound to one storage key
struct IdList {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    ids: Mutex<Vec<String>>,
}

impl IdList {
    fn open(store: Arc<dyn KeyValueStore>, key: &'static str) -> Result<Self> {
        let ids: Vec<String> = load_json(store.as_ref(), key)?.unwrap_or_default();
        Ok(Self { store, key, ids: Mutex::new(ids) })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ids(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Apply `change` to a copy, persist it, then keep it
    fn update(&self, change: impl FnOnce(&mut Vec<String>)) -> Result<()> {
        let mut ids = self.lock();
        let mut next = ids.clone();
        change(&mut next);
        if next == *ids {
            return Ok(());
        }
        save_json(self.store.as_ref(), self.key, &next)?;
        debug!(key = self.key, len = next.len(), "saved id list");
        *ids = next;
        Ok(())
    }
}

/// Favorite channel ids, in the order they were added
pub struct Favorites {
    list: IdList,
}

impl Favorites {
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Ok(Self { list: IdList::open(store, FAVORITES_KEY)? })
    }

    pub fn ids(&self) -> Vec<String> {
        self.list.ids()
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.list.lock().iter().any(|id| id == channel_id)
    }

    /// Add if absent, remove if present. Returns whether it is now a favorite.
    pub fn toggle(&self, channel_id: &str) -> Result<bool> {
        let mut now_favorite = false;
        self.list.update(|ids| {
            if ids.iter().any(|id| id == channel_id) {
                ids.retain(|id| id != channel_id);
            } else {
                ids.push(channel_id.to_string());
                now_favorite = true;
            }
        })?;
        Ok(now_favorite)
    }

    pub fn add(&self, channel_id: &str) -> Result<()> {
        self.list.update(|ids| {
            if !ids.iter().any(|id| id == channel_id) {
                ids.push(channel_id.to_string());
            }
        })
    }

    pub fn remove(&self, channel_id: &str) -> Result<()> {
        self.list.update(|ids| ids.retain(|id| id != channel_id))
    }
}

/// Most-recent-first watch history, without duplicates
pub struct RecentlyWatched {
    list: IdList,
}

impl RecentlyWatched {
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Ok(Self { list: IdList::open(store, RECENTLY_WATCHED_KEY)? })
    }

    pub fn ids(&self) -> Vec<String> {
        self.list.ids()
    }

    /// Move `channel_id` to the front, dropping the oldest beyond capacity
    pub fn add(&self, channel_id: &str) -> Result<()> {
        self.list.update(|ids| {
            ids.retain(|id| id != channel_id);
            ids.insert(0, channel_id.to_string());
            ids.truncate(MAX_RECENT_ITEMS);
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.list.update(Vec::clear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_favorites_toggle_and_persist() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let favorites = Favorites::open(store.clone()).unwrap();

        assert!(favorites.toggle("a").unwrap());
        favorites.add("b").unwrap();
        favorites.add("a").unwrap();
        assert_eq!(favorites.ids(), vec!["a", "b"]);
        assert!(favorites.contains("b"));

        assert!(!favorites.toggle("a").unwrap());
        assert_eq!(Favorites::open(store.clone()).unwrap().ids(), vec!["b"]);

        favorites.remove("b").unwrap();
        favorites.remove("missing").unwrap();
        assert!(Favorites::open(store).unwrap().ids().is_empty());
    }

    #[test]
    fn test_recently_watched_dedups_to_front() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recent = RecentlyWatched::open(store.clone()).unwrap();

        recent.add("a").unwrap();
        recent.add("a").unwrap();
        assert_eq!(recent.ids(), vec!["a"]);

        recent.add("b").unwrap();
        recent.add("a").unwrap();
        assert_eq!(recent.ids(), vec!["a", "b"]);
        assert_eq!(RecentlyWatched::open(store).unwrap().ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_recently_watched_capacity() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recent = RecentlyWatched::open(store).unwrap();

        for i in 0..15 {
            recent.add(&format!("ch{}", i)).unwrap();
        }
        let ids = recent.ids();
        assert_eq!(ids.len(), MAX_RECENT_ITEMS);
        assert_eq!(ids[0], "ch14");
        assert_eq!(ids[MAX_RECENT_ITEMS - 1], "ch5");

        recent.clear().unwrap();
        assert!(recent.ids().is_empty());
    }

    #[test]
    fn test_lists_use_separate_keys() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        Favorites::open(store.clone()).unwrap().add("fav").unwrap();
        RecentlyWatched::open(store.clone()).unwrap().add("seen").unwrap();

        assert_eq!(store.get(FAVORITES_KEY).unwrap().as_deref(), Some(r#"["fav"]"#));
        assert_eq!(store.get(RECENTLY_WATCHED_KEY).unwrap().as_deref(), Some(r#"["seen"]"#));
    }
}
