use log::trace;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Storage the system may reclaim while it is unlocked.
///
/// Freshly allocated memory starts out locked. Every successful [`lock`](Self::lock) must be
/// paired with an [`unlock`](Self::unlock); once unlocked, the contents may vanish and a later
/// `lock` reports it by returning `false`.
pub trait DiscardableMemory: Send + Sync {
    fn lock(&self) -> bool;
    fn unlock(&self);
    fn is_valid(&self) -> bool;
    fn len(&self) -> usize;

    /// Runs `f` on the contents. Returns `false` if the memory is not locked or was reclaimed.
    fn read(&self, f: &mut dyn FnMut(&[u8])) -> bool;
    fn write(&self, f: &mut dyn FnMut(&mut [u8])) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type DiscardableFactory =
    Arc<dyn Fn(usize) -> Option<Box<dyn DiscardableMemory>> + Send + Sync>;

fn lock_state<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BlockState {
    data: Option<Box<[u8]>>,
    locks: u32,
    last_used: u64,
}

struct Block {
    len: usize,
    state: Mutex<BlockState>,
}

struct PoolInner {
    budget: AtomicUsize,
    clock: AtomicU64,
    blocks: Mutex<Vec<Weak<Block>>>,
}

/// A budgeted pool of discardable allocations.
///
/// Unlocked allocations are reclaimed, least recently unlocked first, whenever the resident
/// size exceeds the budget.
#[derive(Clone)]
pub struct DiscardableMemoryPool {
    inner: Arc<PoolInner>,
}

impl DiscardableMemoryPool {
    pub fn new(budget: usize) -> Self {
        DiscardableMemoryPool {
            inner: Arc::new(PoolInner {
                budget: AtomicUsize::new(budget),
                clock: AtomicU64::new(0),
                blocks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn alloc(&self, len: usize) -> Option<Box<dyn DiscardableMemory>> {
        let block = Arc::new(Block {
            len,
            state: Mutex::new(BlockState {
                data: Some(vec![0; len].into_boxed_slice()),
                locks: 1,
                last_used: self.inner.tick(),
            }),
        });

        lock_state(&self.inner.blocks).push(Arc::downgrade(&block));
        self.inner.purge_to_budget();

        Some(Box::new(PoolMemory {
            block,
            pool: Arc::downgrade(&self.inner),
        }))
    }

    pub fn factory(&self) -> DiscardableFactory {
        let pool = self.clone();
        Arc::new(move |len| pool.alloc(len))
    }

    pub fn budget(&self) -> usize {
        self.inner.budget.load(Ordering::Relaxed)
    }

    pub fn set_budget(&self, budget: usize) {
        self.inner.budget.store(budget, Ordering::Relaxed);
        self.inner.purge_to_budget();
    }

    pub fn resident_bytes(&self) -> usize {
        self.inner.resident_bytes()
    }

    /// Reclaims every unlocked allocation regardless of budget.
    pub fn purge_unlocked(&self) -> usize {
        self.inner.purge_down_to(0)
    }
}

impl PoolInner {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn live_blocks(&self) -> Vec<Arc<Block>> {
        let mut blocks = lock_state(&self.blocks);
        blocks.retain(|b| b.strong_count() > 0);
        blocks.iter().filter_map(Weak::upgrade).collect()
    }

    fn resident_bytes(&self) -> usize {
        self.live_blocks()
            .iter()
            .filter(|b| lock_state(&b.state).data.is_some())
            .map(|b| b.len)
            .sum()
    }

    fn purge_to_budget(&self) -> usize {
        self.purge_down_to(self.budget.load(Ordering::Relaxed))
    }

    fn purge_down_to(&self, target: usize) -> usize {
        let mut blocks = self.live_blocks();
        let mut resident = self.resident_bytes();
        if resident <= target {
            return 0;
        }

        blocks.sort_by_key(|b| lock_state(&b.state).last_used);

        let mut purged = 0;
        for block in blocks {
            if resident <= target {
                break;
            }
            let mut state = lock_state(&block.state);
            if state.locks == 0 && state.data.take().is_some() {
                resident -= block.len;
                purged += 1;
            }
        }

        if purged > 0 {
            trace!("[Discardable Pool] Reclaimed {purged} allocations, {resident} bytes resident");
        }
        purged
    }
}

struct PoolMemory {
    block: Arc<Block>,
    pool: Weak<PoolInner>,
}

impl DiscardableMemory for PoolMemory {
    fn lock(&self) -> bool {
        let mut state = lock_state(&self.block.state);
        if state.data.is_none() {
            return false;
        }
        state.locks += 1;
        true
    }

    fn unlock(&self) {
        {
            let mut state = lock_state(&self.block.state);
            debug_assert!(state.locks > 0, "unbalanced discardable unlock");
            state.locks = state.locks.saturating_sub(1);
            if let Some(pool) = self.pool.upgrade() {
                state.last_used = pool.tick();
            }
        }

        if let Some(pool) = self.pool.upgrade() {
            pool.purge_to_budget();
        }
    }

    fn is_valid(&self) -> bool {
        lock_state(&self.block.state).data.is_some()
    }

    fn len(&self) -> usize {
        self.block.len
    }

    fn read(&self, f: &mut dyn FnMut(&[u8])) -> bool {
        let state = lock_state(&self.block.state);
        match (&state.data, state.locks) {
            (Some(data), 1..) => {
                f(data);
                true
            }
            _ => false,
        }
    }

    fn write(&self, f: &mut dyn FnMut(&mut [u8])) -> bool {
        let mut state = lock_state(&self.block.state);
        if state.locks == 0 {
            return false;
        }
        match &mut state.data {
            Some(data) => {
                f(data);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocked_memory_is_reclaimed_over_budget() {
        let pool = DiscardableMemoryPool::new(1024);
        let a = pool.alloc(800).unwrap();
        assert!(a.write(&mut |d| d.fill(3)));
        a.unlock();
        assert!(a.is_valid());

        let b = pool.alloc(800).unwrap();
        assert!(!a.is_valid());
        assert!(!a.lock());
        assert!(b.is_valid());
        assert_eq!(pool.resident_bytes(), 800);
    }

    #[test]
    fn locked_memory_survives_purge() {
        let pool = DiscardableMemoryPool::new(0);
        let a = pool.alloc(64).unwrap();
        assert_eq!(pool.purge_unlocked(), 0);
        assert!(a.read(&mut |d| assert_eq!(d.len(), 64)));

        a.unlock();
        assert!(!a.is_valid());
        assert!(!a.read(&mut |_| {}));
    }
}
