use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoType {
    Read,
    Write,
    ReadWrite,
}

impl IoType {
    fn reads(self) -> bool {
        matches!(self, IoType::Read | IoType::ReadWrite)
    }

    fn writes(self) -> bool {
        matches!(self, IoType::Write | IoType::ReadWrite)
    }
}

/// Ref and pending IO bookkeeping of one GPU object.
#[derive(Debug, Default)]
pub struct ResourceCounters {
    refs: AtomicU32,
    pending_reads: AtomicU32,
    pending_writes: AtomicU32,
}

impl ResourceCounters {
    pub fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unref(&self) {
        let old = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0, "unbalanced unref");
    }

    pub fn add_pending(&self, io: IoType) {
        if io.reads() {
            self.pending_reads.fetch_add(1, Ordering::Relaxed);
        }
        if io.writes() {
            self.pending_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn complete_pending(&self, io: IoType) {
        if io.reads() {
            let old = self.pending_reads.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(old > 0, "completed a read that was never pending");
        }
        if io.writes() {
            let old = self.pending_writes.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(old > 0, "completed a write that was never pending");
        }
    }

    pub fn has_refs(&self) -> bool {
        self.refs.load(Ordering::Acquire) > 0
    }

    pub fn has_pending_read(&self) -> bool {
        self.pending_reads.load(Ordering::Acquire) > 0
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending_writes.load(Ordering::Acquire) > 0
    }

    pub fn has_pending_io(&self) -> bool {
        self.has_pending_read() || self.has_pending_write()
    }
}

/// Pending IO held for as long as the guard lives. Never owns a ref.
#[derive(Debug)]
pub struct PendingIo {
    counters: Arc<ResourceCounters>,
    io: IoType,
}

impl PendingIo {
    pub fn new(counters: Arc<ResourceCounters>, io: IoType) -> Self {
        counters.add_pending(io);
        PendingIo { counters, io }
    }
}

impl Drop for PendingIo {
    fn drop(&mut self) {
        self.counters.complete_pending(self.io);
    }
}

/// A reference held by a draw that converts into pending IO once the draw is recorded.
///
/// States: owns a ref; owns a ref and pending IO; owns only pending IO.
/// `mark_pending_io` moves from the first to the second, `remove_ref` from the second to the
/// third, `pending_io_complete` from the second back to the first. It may be dropped in any state.
#[derive(Debug)]
pub struct ResourceRef {
    counters: Arc<ResourceCounters>,
    io: IoType,
    owns_ref: bool,
    pending_io: bool,
}

impl ResourceRef {
    pub fn new(counters: Arc<ResourceCounters>, io: IoType) -> Self {
        counters.add_ref();
        ResourceRef {
            counters,
            io,
            owns_ref: true,
            pending_io: false,
        }
    }

    pub fn owns_ref(&self) -> bool {
        self.owns_ref
    }

    pub fn owns_pending_io(&self) -> bool {
        self.pending_io
    }

    pub fn mark_pending_io(&mut self) {
        debug_assert!(self.owns_ref && !self.pending_io, "pending IO marked twice");
        if self.pending_io {
            return;
        }
        self.counters.add_pending(self.io);
        self.pending_io = true;
    }

    pub fn remove_ref(&mut self) {
        debug_assert!(self.owns_ref && self.pending_io, "ref removed before marking pending IO");
        if self.owns_ref {
            self.counters.unref();
            self.owns_ref = false;
        }
    }

    pub fn pending_io_complete(&mut self) {
        debug_assert!(self.owns_ref && self.pending_io, "IO completed without a ref");
        if self.pending_io {
            self.counters.complete_pending(self.io);
            self.pending_io = false;
        }
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        if self.owns_ref {
            self.counters.unref();
        }
        if self.pending_io {
            self.counters.complete_pending(self.io);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_converts_into_pending_io() {
        let counters = Arc::new(ResourceCounters::default());
        let mut r = ResourceRef::new(counters.clone(), IoType::Read);
        assert!(counters.has_refs());
        assert!(!counters.has_pending_io());

        r.mark_pending_io();
        r.remove_ref();
        assert!(!counters.has_refs());
        assert!(counters.has_pending_read());
        assert!(!counters.has_pending_write());

        drop(r);
        assert!(!counters.has_pending_io());
    }

    #[test]
    fn pending_io_guard_balances() {
        let counters = Arc::new(ResourceCounters::default());
        {
            let _io = PendingIo::new(counters.clone(), IoType::ReadWrite);
            assert!(counters.has_pending_read() && counters.has_pending_write());
        }
        assert!(!counters.has_pending_io());
    }
}
