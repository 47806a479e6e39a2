mod discardable;
mod key;
mod lru;

pub use discardable::*;
pub use key::*;
pub use lru::RecordId;

use crate::config::ResourceCacheConfig;
use grcache_utils::debug_panic;
use log::{debug, trace, warn};
use lru::LruList;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An artifact owned by the [`ResourceCache`].
pub trait CacheRecord: Send + 'static {
    fn key(&self) -> &CacheKey;
    fn bytes_used(&self) -> usize;

    /// Referenced records are skipped by budget eviction.
    fn is_referenced(&self) -> bool {
        false
    }

    /// Cached artifacts are shared without copy-on-write and must never change once inserted.
    fn is_immutable(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub over_budget: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

struct SizeChange {
    id: RecordId,
    key: CacheKey,
    old_bytes: usize,
    new_bytes: usize,
}

/// Reports size changes of one cached record back to the cache that owns it.
///
/// Notifications are queued and applied before the next cache operation, so they are safe to
/// send while a record is borrowed out of the cache. Once the record is removed its
/// notifications are dropped, even if another record is later added under the same key.
#[derive(Clone)]
pub struct SizeChangeNotifier {
    id: RecordId,
    key: CacheKey,
    queue: Arc<Mutex<Vec<SizeChange>>>,
}

impl SizeChangeNotifier {
    pub fn notify(&self, old_bytes: usize, new_bytes: usize) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SizeChange {
                id: self.id,
                key: self.key.clone(),
                old_bytes,
                new_bytes,
            });
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Keyed, budgeted store of derived artifacts with least-recently-used eviction.
pub struct ResourceCache {
    index: HashMap<CacheKey, SmallVec<[RecordId; 1]>>,
    lru: LruList,
    total_bytes: usize,
    total_byte_limit: usize,
    single_allocation_byte_limit: usize,
    count_limit: usize,
    discardable_factory: Option<DiscardableFactory>,
    size_changes: Arc<Mutex<Vec<SizeChange>>>,
    stats: CacheStats,
}

impl Default for ResourceCache {
    fn default() -> Self {
        ResourceCache::from_config(&ResourceCacheConfig::default(), None)
    }
}

impl ResourceCache {
    pub fn new(byte_limit: usize) -> Self {
        let config = ResourceCacheConfig::builder().byte_limit(byte_limit).build();
        Self::from_config(&config, None)
    }

    pub fn with_discardable_factory(factory: DiscardableFactory) -> Self {
        Self::from_config(&ResourceCacheConfig::default(), Some(factory))
    }

    /// With a discardable factory the cache is bounded by record count and the byte limit is
    /// lifted, since the factory's owner decides when memory is reclaimed.
    pub fn from_config(config: &ResourceCacheConfig, factory: Option<DiscardableFactory>) -> Self {
        let total_byte_limit = match factory {
            Some(_) => usize::MAX,
            None => config.byte_limit,
        };

        ResourceCache {
            index: HashMap::new(),
            lru: LruList::default(),
            total_bytes: 0,
            total_byte_limit,
            single_allocation_byte_limit: config.single_allocation_byte_limit,
            count_limit: config.discardable_count_limit,
            discardable_factory: factory,
            size_changes: Arc::default(),
            stats: CacheStats::default(),
        }
    }

    /// Looks up `key` and hands the record to `visitor`.
    ///
    /// A visitor returning `None` means the record is no longer usable (its discardable
    /// memory was reclaimed): the record is purged and the lookup counts as a miss.
    pub fn find<T>(
        &mut self,
        key: &CacheKey,
        visitor: impl FnOnce(&dyn CacheRecord) -> Option<T>,
    ) -> Option<T> {
        self.apply_size_changes();

        let Some(id) = self.index.get(key).and_then(|ids| ids.last().copied()) else {
            self.note_miss(key);
            return None;
        };

        let found = self
            .lru
            .get(id)
            .and_then(|node| visitor(node.record.as_ref()));

        match found {
            Some(value) => {
                self.lru.touch(id);
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                trace!("[Resource Cache] Dropping stale record {key:?}");
                self.remove_id(id);
                self.note_miss(key);
                None
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts `record`. Returns `false` if the record was dropped instead: a mutable
    /// artifact, or a key already present in a domain with unique keys.
    pub fn add(&mut self, record: Box<dyn CacheRecord>) -> bool {
        self.apply_size_changes();

        if !record.is_immutable() {
            debug_panic!(
                "[Resource Cache] Refusing to cache mutable {} {:?}",
                record.name(),
                record.key()
            );
            return false;
        }

        let key = record.key().clone();
        if !key.domain().allows_duplicates() && self.index.contains_key(&key) {
            trace!("[Resource Cache] {key:?} already cached, keeping resident record");
            return false;
        }

        let bytes = record.bytes_used();
        trace!(
            "[Resource Cache] Added {} {key:?} ({bytes} bytes)",
            record.name()
        );

        let id = self.lru.push_front(record, bytes);
        self.index.entry(key).or_default().push(id);
        self.total_bytes += bytes;

        self.purge_as_needed();
        true
    }

    /// Takes the most recently added record under `key` out of the cache.
    pub fn remove(&mut self, key: &CacheKey) -> Option<Box<dyn CacheRecord>> {
        self.remove_where(key, |_| true)
    }

    /// Takes the first record under `key` accepted by `pred` out of the cache.
    pub fn remove_where(
        &mut self,
        key: &CacheKey,
        mut pred: impl FnMut(&dyn CacheRecord) -> bool,
    ) -> Option<Box<dyn CacheRecord>> {
        self.apply_size_changes();

        let id = self.index.get(key).and_then(|ids| {
            ids.iter()
                .rev()
                .copied()
                .find(|id| self.lru.get(*id).is_some_and(|n| pred(n.record.as_ref())))
        });

        match id.and_then(|id| self.remove_id(id)) {
            Some(record) => {
                self.stats.hits += 1;
                Some(record)
            }
            None => {
                self.note_miss(key);
                None
            }
        }
    }

    /// Drops every record accepted by `pred`. Returns how many were dropped.
    pub fn purge(&mut self, mut pred: impl FnMut(&dyn CacheRecord) -> bool) -> usize {
        self.apply_size_changes();

        let doomed: Vec<RecordId> = self
            .lru
            .ids()
            .filter(|id| self.lru.get(*id).is_some_and(|n| pred(n.record.as_ref())))
            .collect();

        for id in &doomed {
            self.remove_id(*id);
        }

        if !doomed.is_empty() {
            debug!("[Resource Cache] Purged {} records", doomed.len());
        }
        doomed.len()
    }

    /// Drops every record derived from the content with generation id `content_id`.
    pub fn purge_content(&mut self, content_id: u32) -> usize {
        self.purge(|record| record.key().content_id() == Some(content_id))
    }

    pub fn purge_all(&mut self) {
        let dropped = self.lru.clear();
        self.index.clear();
        self.total_bytes = 0;
        debug!("[Resource Cache] Purged all {} records", dropped.len());
    }

    pub fn total_bytes_used(&self) -> usize {
        self.total_bytes
    }

    pub fn total_byte_limit(&self) -> usize {
        self.total_byte_limit
    }

    /// Sets a new byte budget, evicting as needed. Returns the previous budget.
    pub fn set_total_byte_limit(&mut self, limit: usize) -> usize {
        let old = std::mem::replace(&mut self.total_byte_limit, limit);
        if limit < old {
            self.purge_as_needed();
        }
        old
    }

    pub fn single_allocation_byte_limit(&self) -> usize {
        self.single_allocation_byte_limit
    }

    pub fn set_single_allocation_byte_limit(&mut self, limit: usize) -> usize {
        std::mem::replace(&mut self.single_allocation_byte_limit, limit)
    }

    /// The smaller of the single allocation limit and the total limit.
    /// A single allocation limit of 0 defers to the total limit.
    pub fn effective_single_allocation_byte_limit(&self) -> usize {
        match self.single_allocation_byte_limit {
            0 => self.total_byte_limit,
            single => single.min(self.total_byte_limit),
        }
    }

    pub fn count(&self) -> usize {
        self.lru.len()
    }

    pub fn count_limit(&self) -> usize {
        self.count_limit
    }

    pub fn discardable_factory(&self) -> Option<&DiscardableFactory> {
        self.discardable_factory.as_ref()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn dump(&self) {
        debug!(
            "[Resource Cache] {} records, {} / {} bytes, hits: {}, misses: {}, evictions: {}, hit rate: {:.2}",
            self.count(),
            self.total_bytes,
            self.total_byte_limit,
            self.stats.hits,
            self.stats.misses,
            self.stats.evictions,
            self.stats.hit_rate(),
        );
    }

    /// A notifier for the most recently added record under `key`, used by its owner to report
    /// size changes. `None` if no such record is cached.
    pub fn size_change_notifier(&self, key: &CacheKey) -> Option<SizeChangeNotifier> {
        let id = *self.index.get(key)?.last()?;
        Some(SizeChangeNotifier {
            id,
            key: key.clone(),
            queue: self.size_changes.clone(),
        })
    }

    fn apply_size_changes(&mut self) {
        let changed = std::mem::take(
            &mut *self
                .size_changes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if changed.is_empty() {
            return;
        }

        for change in changed {
            let Some(node) = self.lru.get_mut(change.id) else {
                trace!(
                    "[Resource Cache] Dropped size change of removed record {:?}",
                    change.key
                );
                continue;
            };
            let bytes = (node.bytes + change.new_bytes).saturating_sub(change.old_bytes);
            let old = std::mem::replace(&mut node.bytes, bytes);
            self.total_bytes = self.total_bytes - old + bytes;
            trace!(
                "[Resource Cache] {:?} changed size: {old} -> {bytes} bytes",
                change.key
            );
        }

        self.purge_as_needed();
    }

    fn is_over_budget(&self) -> bool {
        if self.discardable_factory.is_some() {
            self.lru.len() > self.count_limit
        } else {
            self.total_bytes > self.total_byte_limit
        }
    }

    fn purge_as_needed(&mut self) {
        let mut cursor = self.lru.tail();
        while self.is_over_budget() {
            let Some(id) = cursor else {
                break;
            };
            cursor = self.lru.newer(id);

            if self.lru.get(id).is_some_and(|n| n.record.is_referenced()) {
                continue;
            }

            if let Some(record) = self.remove_id(id) {
                self.stats.evictions += 1;
                trace!(
                    "[Resource Cache] Evicted {} {:?}",
                    record.name(),
                    record.key()
                );
            }
        }

        if self.is_over_budget() {
            self.stats.over_budget += 1;
            warn!(
                "[Resource Cache] Over budget with every remaining record referenced: {} records, {} / {} bytes",
                self.count(),
                self.total_bytes,
                self.total_byte_limit
            );
        }
    }

    fn remove_id(&mut self, id: RecordId) -> Option<Box<dyn CacheRecord>> {
        let node = self.lru.remove(id)?;
        self.total_bytes -= node.bytes;

        let key = node.record.key();
        if let Some(ids) = self.index.get_mut(key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.index.remove(key);
            }
        }

        Some(node.record)
    }

    fn note_miss(&mut self, key: &CacheKey) {
        self.stats.misses += 1;
        if self.stats.misses % 1000 == 0 {
            warn!(
                "[Resource Cache] Miss on {key:?}, Misses: {}",
                self.stats.misses
            );
        }
    }
}

static GLOBAL_CACHE: Lazy<Mutex<ResourceCache>> = Lazy::new(|| {
    Mutex::new(ResourceCache::from_config(
        &ResourceCacheConfig::from_env(),
        None,
    ))
});

/// The process-wide default cache.
pub fn global() -> MutexGuard<'static, ResourceCache> {
    GLOBAL_CACHE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs `f` against `local` when supplied, otherwise against the process-wide cache.
pub fn with_cache<R>(
    local: Option<&mut ResourceCache>,
    f: impl FnOnce(&mut ResourceCache) -> R,
) -> R {
    match local {
        Some(cache) => f(cache),
        None => f(&mut global()),
    }
}
