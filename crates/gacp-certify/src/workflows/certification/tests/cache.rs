use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::workflows::certification::cache::{
    glob_matches, keys, Cache, InMemoryCache, NoopCache,
};
use crate::workflows::certification::clock::ManualClock;
use crate::workflows::certification::domain::ApplicationId;

#[test]
fn glob_matches_star_segments() {
    assert!(glob_matches("applications:list:*", "applications:list:abc"));
    assert!(glob_matches("applications:list:*", "applications:list:"));
    assert!(glob_matches(
        "certificate:verify:*:-",
        "certificate:verify:GACP-2025-CM-0001:-"
    ));
    assert!(glob_matches("*", "anything"));
    assert!(glob_matches("exact", "exact"));

    assert!(!glob_matches("exact", "exactly"));
    assert!(!glob_matches("applications:list:*", "application:42"));
    assert!(!glob_matches(
        "certificate:verify:*:-",
        "certificate:verify:GACP-2025-CM-0001:ab12"
    ));
}

#[test]
fn entries_expire_with_the_clock() {
    let clock = Arc::new(ManualClock::new(start()));
    let cache = InMemoryCache::new(clock.clone());

    cache
        .set("application:1", "{}".to_string(), 60)
        .expect("cache writable");
    assert!(cache.contains("application:1"));

    clock.advance(Duration::seconds(59));
    assert_eq!(
        cache.get("application:1").expect("cache readable").as_deref(),
        Some("{}")
    );

    clock.advance(Duration::seconds(1));
    assert_eq!(cache.get("application:1").expect("cache readable"), None);
    assert!(cache.is_empty());
}

#[test]
fn pattern_delete_only_removes_matching_keys() {
    let cache = InMemoryCache::new(Arc::new(ManualClock::new(start())));
    let id = ApplicationId("app-1".to_string());
    for key in [
        keys::application_list("status=draft"),
        keys::application_list("all"),
        keys::application(&id),
        keys::STATUS_SUMMARY.to_string(),
    ] {
        cache
            .set(&key, "cached".to_string(), 300)
            .expect("cache writable");
    }

    let removed = cache
        .delete_pattern(keys::APPLICATION_LIST_PATTERN)
        .expect("cache writable");
    assert_eq!(removed, 2);
    assert_eq!(cache.len(), 2);
    assert!(cache.contains("application:app-1"));
    assert!(cache.contains(keys::STATUS_SUMMARY));

    cache
        .delete(&keys::application(&id))
        .expect("cache writable");
    assert!(!cache.contains("application:app-1"));
}

#[test]
fn verification_keys_separate_codes() {
    assert_eq!(
        keys::certificate_verification("GACP-2025-CM-0001", None),
        "certificate:verify:GACP-2025-CM-0001:-"
    );
    let with_code = keys::certificate_verification("GACP-2025-CM-0001", Some("ab12"));
    assert!(glob_matches(
        &keys::certificate_verification_pattern("GACP-2025-CM-0001"),
        &with_code
    ));
}

#[test]
fn noop_cache_never_hits() {
    let cache = NoopCache;
    cache.set("k", "v".to_string(), 60).expect("noop write");
    assert_eq!(cache.get("k").expect("noop read"), None);
    assert_eq!(cache.delete_pattern("*").expect("noop delete"), 0);
}
