//! Build log cache unit tests

use runway::cache::BuildLogCache;

#[test]
fn test_build_log_cache_insert_and_get() {
    let cache = BuildLogCache::new(10);

    cache.insert("d1", "Step 1/3 : FROM node:20\n".to_string());

    assert_eq!(cache.get("d1").as_deref(), Some("Step 1/3 : FROM node:20\n"));
    assert!(cache.get("d2").is_none());
}

#[test]
fn test_build_log_cache_eviction() {
    let cache = BuildLogCache::new(2);

    cache.insert("d1", "one".to_string());
    cache.insert("d2", "two".to_string());
    cache.insert("d3", "three".to_string());

    // Cache should have evicted the oldest entry
    assert_eq!(cache.len(), 2);
    assert!(cache.get("d1").is_none());
    assert!(cache.get("d3").is_some());
}

#[test]
fn test_build_log_cache_replace_does_not_evict() {
    let cache = BuildLogCache::new(2);

    cache.insert("d1", "one".to_string());
    cache.insert("d2", "two".to_string());
    cache.insert("d1", "one again".to_string());

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("d1").as_deref(), Some("one again"));
    assert!(cache.get("d2").is_some());
}

#[test]
fn test_build_log_cache_remove() {
    let cache = BuildLogCache::new(10);

    cache.insert("d1", "logs".to_string());
    assert_eq!(cache.remove("d1").as_deref(), Some("logs"));
    assert!(cache.is_empty());
}
