//! Read-only channel queries across playlists

use std::collections::{BTreeSet, HashMap};

use crate::models::{Channel, Playlist};

/// Case-insensitive substring check, allocation-free for ASCII input
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() { return true; }

    if haystack.is_ascii() && needle.is_ascii() {
        if needle.len() > haystack.len() { return false; }
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()));
    }

    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Every channel, playlist order then document order
pub fn all_channels(playlists: &[Playlist]) -> impl Iterator<Item = &Channel> {
    playlists.iter().flat_map(|p| p.channels.iter())
}

/// Distinct category names, sorted
pub fn categories(playlists: &[Playlist]) -> Vec<&str> {
    all_channels(playlists)
        .map(|c| c.category.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn channels_in_category<'a>(playlists: &'a [Playlist], category: &str) -> Vec<&'a Channel> {
    all_channels(playlists).filter(|c| c.category == category).collect()
}

/// Channels whose name or category contains `query`; an empty query finds nothing
pub fn search<'a>(playlists: &'a [Playlist], query: &str) -> Vec<&'a Channel> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    all_channels(playlists)
        .filter(|c| contains_ignore_case(&c.name, query) || contains_ignore_case(&c.category, query))
        .collect()
}

/// Look up channels by id, in the order of `ids`; unknown ids are skipped
pub fn resolve<'a>(playlists: &'a [Playlist], ids: &[String]) -> Vec<&'a Channel> {
    let by_id: HashMap<&str, &Channel> = all_channels(playlists).map(|c| (c.id.as_str(), c)).collect();
    ids.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect()
}

pub fn find_channel<'a>(playlists: &'a [Playlist], id: &str) -> Option<&'a Channel> {
    all_channels(playlists).find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{channel, playlist};

    fn sample() -> Vec<Playlist> {
        let mut uk = playlist("UK", "http://s/uk.m3u");
        uk.channels = vec![channel("BBC One", "http://s/bbc1"), channel("ITV", "http://s/itv")];
        uk.channels[0].category = "News".to_string();
        uk.channels[1].category = "Entertainment".to_string();

        let mut us = playlist("US", "http://s/us.m3u");
        us.channels = vec![channel("CNN", "http://s/cnn"), channel("Fox Sports", "http://s/fox")];
        us.channels[0].category = "News".to_string();
        us.channels[1].category = "Sports".to_string();

        vec![uk, us]
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("BBC One", "bbc"));
        assert!(contains_ignore_case("anything", ""));
        assert!(!contains_ignore_case("CNN", "cnn international"));
        assert!(contains_ignore_case("Österreich 1", "österreich"));
    }

    #[test]
    fn test_categories_sorted_and_unique() {
        assert_eq!(categories(&sample()), vec!["Entertainment", "News", "Sports"]);
        assert!(categories(&[]).is_empty());
    }

    #[test]
    fn test_channels_in_category_keeps_order() {
        let playlists = sample();
        let names: Vec<&str> = channels_in_category(&playlists, "News").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["BBC One", "CNN"]);
    }

    #[test]
    fn test_search_matches_name_or_category() {
        let playlists = sample();
        let names = |q: &str| -> Vec<String> { search(&playlists, q).iter().map(|c| c.name.clone()).collect() };

        assert_eq!(names("sport"), vec!["Fox Sports"]);
        assert_eq!(names("NEWS"), vec!["BBC One", "CNN"]);
        assert_eq!(names("itv"), vec!["ITV"]);
        assert!(names("  ").is_empty());
        assert!(names("weather").is_empty());
    }

    #[test]
    fn test_resolve_follows_id_order() {
        let playlists = sample();
        let ids = vec![
            playlists[1].channels[1].id.clone(),
            "stale-id".to_string(),
            playlists[0].channels[0].id.clone(),
        ];
        let names: Vec<&str> = resolve(&playlists, &ids).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fox Sports", "BBC One"]);

        let id = playlists[0].channels[1].id.clone();
        assert_eq!(find_channel(&playlists, &id).map(|c| c.name.as_str()), Some("ITV"));
        assert_eq!(find_channel(&playlists, "nope"), None);
    }
}
