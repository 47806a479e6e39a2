mod common;

use common::init_logging;
use grcache::config::ResourceCacheConfig;
use grcache::resource_cache::{
    self, CacheKey, CacheRecord, DiscardableMemoryPool, KeyDomain, ResourceCache,
};
use serial_test::serial;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct Blob {
    key: CacheKey,
    bytes: usize,
    referenced: Arc<AtomicBool>,
}

impl Blob {
    fn new(domain: KeyDomain, id: u32, bytes: usize) -> Box<Self> {
        Box::new(Blob {
            key: CacheKey::new(domain, &[id, 0]),
            bytes,
            referenced: Arc::default(),
        })
    }

    fn pinned(id: u32, bytes: usize, referenced: &Arc<AtomicBool>) -> Box<Self> {
        Box::new(Blob {
            key: key(id),
            bytes,
            referenced: referenced.clone(),
        })
    }
}

impl CacheRecord for Blob {
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn bytes_used(&self) -> usize {
        self.bytes
    }

    fn is_referenced(&self) -> bool {
        self.referenced.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "Blob"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn key(id: u32) -> CacheKey {
    CacheKey::new(KeyDomain::Bitmap, &[id, 0])
}

fn blob(id: u32, bytes: usize) -> Box<Blob> {
    Blob::new(KeyDomain::Bitmap, id, bytes)
}

fn bytes_of(record: &dyn CacheRecord) -> Option<usize> {
    Some(record.bytes_used())
}

#[test]
fn eviction_keeps_most_recently_used() {
    init_logging();
    let mut cache = ResourceCache::new(300);

    assert!(cache.add(blob(1, 100)));
    assert!(cache.add(blob(2, 100)));
    assert!(cache.add(blob(3, 100)));
    assert_eq!(cache.find(&key(1), bytes_of), Some(100));

    assert!(cache.add(blob(4, 100)));

    assert!(cache.contains(&key(1)));
    assert!(!cache.contains(&key(2)));
    assert!(cache.contains(&key(3)));
    assert!(cache.contains(&key(4)));
    assert_eq!(cache.total_bytes_used(), 300);
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn lowering_the_budget_evicts() {
    init_logging();
    let mut cache = ResourceCache::new(1000);
    for id in 0..5 {
        cache.add(blob(id, 100));
    }

    assert_eq!(cache.set_total_byte_limit(250), 1000);
    assert_eq!(cache.count(), 2);
    assert!(cache.contains(&key(3)));
    assert!(cache.contains(&key(4)));
    assert!(cache.total_bytes_used() <= 250);
}

#[test]
fn referenced_records_survive_over_budget() {
    init_logging();
    let mut cache = ResourceCache::new(100);
    let in_use = Arc::new(AtomicBool::new(true));

    assert!(cache.add(Blob::pinned(1, 100, &in_use)));
    assert!(cache.add(Blob::pinned(2, 100, &in_use)));

    assert_eq!(cache.count(), 2);
    assert_eq!(cache.total_bytes_used(), 200);
    assert!(cache.stats().over_budget > 0);

    in_use.store(false, Ordering::Relaxed);
    assert!(cache.add(blob(3, 10)));

    assert_eq!(cache.count(), 1);
    assert!(cache.contains(&key(3)));
    assert_eq!(cache.total_bytes_used(), 10);
}

#[test]
fn unique_domains_reject_duplicate_keys() {
    init_logging();
    let mut cache = ResourceCache::new(1000);

    assert!(cache.add(blob(1, 100)));
    assert!(!cache.add(blob(1, 50)));
    assert_eq!(cache.find(&key(1), bytes_of), Some(100));
    assert_eq!(cache.total_bytes_used(), 100);

    let scratch = CacheKey::new(KeyDomain::ScratchTexture, &[1, 0]);
    assert!(cache.add(Blob::new(KeyDomain::ScratchTexture, 1, 10)));
    assert!(cache.add(Blob::new(KeyDomain::ScratchTexture, 1, 20)));
    assert_eq!(cache.count(), 3);

    let taken = cache.remove(&scratch).and_then(|r| r.into_any().downcast::<Blob>().ok());
    assert_eq!(taken.map(|b| b.bytes), Some(20));
    assert!(cache.contains(&scratch));
}

#[test]
fn stale_records_are_dropped_on_lookup() {
    init_logging();
    let mut cache = ResourceCache::new(1000);
    cache.add(blob(1, 100));

    assert_eq!(cache.find(&key(1), |_| None::<()>), None);
    assert!(!cache.contains(&key(1)));
    assert_eq!(cache.total_bytes_used(), 0);
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 0);
}

#[test]
fn purge_content_drops_only_matching_generation() {
    init_logging();
    let mut cache = ResourceCache::new(1000);
    cache.add(blob(7, 10));
    cache.add(Blob::new(KeyDomain::MipMap, 7, 10));
    cache.add(blob(8, 10));

    assert_eq!(cache.purge_content(7), 2);
    assert_eq!(cache.count(), 1);
    assert!(cache.contains(&key(8)));

    cache.purge_all();
    assert_eq!(cache.count(), 0);
    assert_eq!(cache.total_bytes_used(), 0);
}

#[test]
fn size_changes_apply_before_next_operation() {
    init_logging();
    let mut cache = ResourceCache::new(1000);
    cache.add(blob(1, 100));
    cache.add(blob(2, 100));
    assert_eq!(cache.find(&key(1), bytes_of), Some(100));

    let notifier = cache.size_change_notifier(&key(1)).unwrap();
    notifier.notify(100, 950);
    assert_eq!(cache.total_bytes_used(), 200);

    // growing record 1 pushes the less recently used record 2 out
    assert_eq!(cache.find(&key(1), |_| Some(())), Some(()));
    assert!(!cache.contains(&key(2)));
    assert_eq!(cache.total_bytes_used(), 950);
}

#[test]
fn size_changes_of_removed_records_are_dropped() {
    init_logging();
    let mut cache = ResourceCache::new(1000);
    cache.add(blob(1, 100));
    let stale = cache.size_change_notifier(&key(1)).unwrap();

    assert!(cache.remove(&key(1)).is_some());
    assert!(cache.size_change_notifier(&key(1)).is_none());
    cache.add(blob(1, 100));
    assert_eq!(cache.total_bytes_used(), 100);

    // the replacement record under the same key keeps its own size
    stale.notify(100, 950);
    assert_eq!(cache.find(&key(1), bytes_of), Some(100));
    assert_eq!(cache.total_bytes_used(), 100);

    let current = cache.size_change_notifier(&key(1)).unwrap();
    current.notify(100, 400);
    assert!(cache.contains(&key(1)));
    assert_eq!(cache.find(&key(1), |_| Some(())), Some(()));
    assert_eq!(cache.total_bytes_used(), 400);
}

#[test]
fn single_allocation_limit_defers_to_total() {
    let mut cache = ResourceCache::new(4096);
    assert_eq!(cache.effective_single_allocation_byte_limit(), 4096);

    cache.set_single_allocation_byte_limit(1024);
    assert_eq!(cache.effective_single_allocation_byte_limit(), 1024);

    cache.set_single_allocation_byte_limit(8192);
    assert_eq!(cache.effective_single_allocation_byte_limit(), 4096);
}

#[test]
fn discardable_cache_is_bounded_by_count() {
    init_logging();
    let pool = DiscardableMemoryPool::new(1024);
    let config = ResourceCacheConfig::builder()
        .byte_limit(10)
        .discardable_count_limit(2)
        .build();
    let mut cache = ResourceCache::from_config(&config, Some(pool.factory()));

    assert_eq!(cache.total_byte_limit(), usize::MAX);
    assert!(cache.discardable_factory().is_some());

    cache.add(blob(1, 1000));
    cache.add(blob(2, 1000));
    cache.add(blob(3, 1000));

    assert_eq!(cache.count(), 2);
    assert!(!cache.contains(&key(1)));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
#[serial]
fn global_cache_is_used_without_local() {
    init_logging();
    let marker = key(0xDEAD_0001);

    let added = resource_cache::with_cache(None, |cache| cache.add(blob(0xDEAD_0001, 8)));
    assert!(added);
    assert!(resource_cache::global().contains(&marker));

    let mut local = ResourceCache::new(1000);
    assert!(!resource_cache::with_cache(Some(&mut local), |cache| cache.contains(&marker)));

    assert!(resource_cache::global().remove(&marker).is_some());
}
