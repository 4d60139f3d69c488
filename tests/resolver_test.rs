//! Integration tests for the resolver frontend, coordinator and store working
//! together against mock providers.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::prelude::*;
use config_resolver::error::Error;

#[test]
fn test_burst_of_distinct_overlays_yields_equal_job_sets() {
    let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
    let resolver = Arc::new(resolver_with(Arc::clone(&provider), 200));
    let base = sha('a', 0);
    let barrier = Arc::new(Barrier::new(100));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let resolver = Arc::clone(&resolver);
            let barrier = Arc::clone(&barrier);
            let base = base.clone();
            thread::spawn(move || {
                barrier.wait();
                resolver.resolve(&identity(), &base, &[sha('b', i)]).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(provider.fetches(), 100);
    let reference = &results[0].job_set;
    for result in &results {
        assert_eq!(&result.job_set, reference);
        assert_eq!(result.source_commits.len(), 2);
    }
    assert_eq!(reference.presubmits.len(), 2);

    let stats = resolver.stats().unwrap();
    assert_eq!(stats.flights_started, 100);
    assert_eq!(stats.cached_entries, 100);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_concurrent_identical_requests_share_one_fetch() {
    let gate = Arc::new(Gate::default());
    let provider = Arc::new(MockProvider::gated(configs::TWO_PRESUBMITS, Arc::clone(&gate)));
    let resolver = Arc::new(resolver_with(Arc::clone(&provider), 8));
    let base = sha('a', 1);
    let overlay = sha('b', 1);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let (base, overlay) = (base.clone(), overlay.clone());
            thread::spawn(move || resolver.resolve(&identity(), &base, &[overlay]).unwrap())
        })
        .collect();

    // Let the requests pile up on the held fetch before releasing it
    thread::sleep(Duration::from_millis(100));
    gate.open();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(provider.fetches(), 1);
    for result in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], result));
    }
    let stats = resolver.stats().unwrap();
    assert_eq!(stats.flights_started, 1);
    assert_eq!(stats.hits + stats.late_hits + stats.flights_joined + 1, 32);
}

#[test]
fn test_sequential_requests_served_from_store() {
    let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
    let resolver = resolver_with(Arc::clone(&provider), 4);
    let base = sha('a', 2);

    let first = resolver.resolve(&identity(), &base, &[sha('b', 2)]).unwrap();
    let second = resolver.resolve(&identity(), &base, &[sha('b', 2)]).unwrap();

    assert_eq!(provider.fetches(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.stats().unwrap().hits, 1);
}

#[test]
fn test_overlay_permutations_share_cache_entry() {
    let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
    let resolver = resolver_with(Arc::clone(&provider), 4);
    let base = sha('a', 3);
    let (x, y, z) = (sha('b', 1), sha('b', 2), sha('b', 3));

    let first = resolver
        .resolve(&identity(), &base, &[&z, &x, &y])
        .unwrap();
    let second = resolver
        .resolve(&identity(), &base, &[&y, &z, &x, &x])
        .unwrap();

    assert_eq!(provider.fetches(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    // Overlays reach the provider in canonical order
    assert_eq!(provider.fetched()[0], vec![base, x, y, z]);
}

#[test]
fn test_compile_failure_not_cached_and_retry_succeeds() {
    let provider = Arc::new(MockProvider::new(configs::DUPLICATE));
    let resolver = resolver_with(Arc::clone(&provider), 4);
    let base = sha('a', 4);

    let err = resolver
        .resolve(&identity(), &base, &[] as &[&str])
        .unwrap_err();
    assert!(matches!(err, Error::CompileFailure { .. }));
    assert!(err.to_string().contains("duplicate presubmit name 'unit'"));
    assert_eq!(resolver.stats().unwrap().cached_entries, 0);

    // Same key again: nothing cached, so the config is fetched and compiled anew
    provider.set_config(configs::TWO_PRESUBMITS);
    let result = resolver
        .resolve(&identity(), &base, &[] as &[&str])
        .unwrap();

    assert_eq!(provider.fetches(), 2);
    assert_eq!(result.job_set.presubmits.len(), 2);
    let stats = resolver.stats().unwrap();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.cached_entries, 1);
}

#[test]
fn test_fetch_failure_fans_out_and_is_not_cached() {
    let gate = Arc::new(Gate::default());
    let provider = Arc::new(MockProvider::gated(configs::TWO_PRESUBMITS, Arc::clone(&gate)));
    provider.set_failure(Some("connection reset"));
    let resolver = Arc::new(resolver_with(Arc::clone(&provider), 4));
    let base = sha('a', 5);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let base = base.clone();
            thread::spawn(move || resolver.resolve(&identity(), &base, &[] as &[&str]))
        })
        .collect();
    thread::sleep(Duration::from_millis(100));
    gate.open();

    for handle in handles {
        let err = handle.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), "fetch_failure");
        assert!(err.to_string().contains("connection reset"));
    }
    assert_eq!(provider.fetches(), 1);
    assert_eq!(resolver.stats().unwrap().cached_entries, 0);

    provider.set_failure(None);
    assert!(resolver.resolve(&identity(), &base, &[] as &[&str]).is_ok());
    assert_eq!(provider.fetches(), 2);
}

#[test]
fn test_eviction_forces_refetch() {
    let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
    let resolver = resolver_with(Arc::clone(&provider), 2);
    let (a, b, c) = (sha('a', 10), sha('a', 11), sha('a', 12));
    let none: &[&str] = &[];

    resolver.resolve(&identity(), &a, none).unwrap();
    resolver.resolve(&identity(), &b, none).unwrap();
    // Touch `a` so `b` becomes least recently used
    resolver.resolve(&identity(), &a, none).unwrap();
    resolver.resolve(&identity(), &c, none).unwrap();
    assert_eq!(provider.fetches(), 3);

    resolver.resolve(&identity(), &a, none).unwrap();
    assert_eq!(provider.fetches(), 3);
    resolver.resolve(&identity(), &b, none).unwrap();
    assert_eq!(provider.fetches(), 4);

    let stats = resolver.stats().unwrap();
    assert_eq!(stats.cached_entries, 2);
    assert_eq!(stats.evictions, 2);
}

#[test]
fn test_caller_timeout_leaves_resolution_running() {
    let gate = Arc::new(Gate::default());
    let provider = Arc::new(MockProvider::gated(configs::TWO_PRESUBMITS, Arc::clone(&gate)));
    let resolver = resolver_with(Arc::clone(&provider), 4);
    let base = sha('a', 6);
    let none: &[&str] = &[];

    let err = resolver
        .resolve_with_timeout(&identity(), &base, none, Some(Duration::from_millis(50)))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    gate.open();
    // The abandoned flight completes and later callers get its result
    let result = resolver.resolve(&identity(), &base, none).unwrap();
    assert_eq!(result.job_set.postsubmits.len(), 1);
    assert_eq!(provider.fetches(), 1);
}

#[test]
fn test_invalid_sha_rejected_without_fetch() {
    let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
    let resolver = resolver_with(Arc::clone(&provider), 4);

    let err = resolver
        .resolve(&identity(), &sha('a', 7), &["not-a-sha"])
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_key_input");
    assert_eq!(provider.fetches(), 0);
}
