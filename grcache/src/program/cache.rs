use crate::caps::Caps;
use crate::config::ProgramCacheConfig;
use crate::program::desc::{DescBuildError, ProgramDesc};
use crate::program::device::{ProgramBuildError, ProgramDevice};
use crate::program::draw_state::{BlendCoeffs, DrawState, DrawType, DstCopy};
use crate::program::gpu_program::Program;
use log::{trace, warn};
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum ProgramError {
    #[snafu(display("Failed to build program key: {source}"))]
    Desc { source: DescBuildError },

    #[snafu(display("Failed to build program: {source}"))]
    Build { source: ProgramBuildError },
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ProgramCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    program: Program,
    last_used: u64,
}

/// Linked programs keyed by their descriptor, least recently used evicted first.
#[derive(Debug)]
pub struct ProgramCache {
    max_entries: usize,
    entries: HashMap<ProgramDesc, CacheEntry>,
    clock: u64,
    stats: ProgramCacheStats,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new(&ProgramCacheConfig::default())
    }
}

impl ProgramCache {
    pub fn new(config: &ProgramCacheConfig) -> Self {
        ProgramCache {
            max_entries: config.max_entries.max(1),
            entries: HashMap::new(),
            clock: 0,
            stats: ProgramCacheStats::default(),
        }
    }

    /// Builds the key for a draw and returns its program, linking it on a miss.
    pub fn get_or_create(
        &mut self,
        state: &DrawState,
        draw_type: DrawType,
        blend: BlendCoeffs,
        caps: &Caps,
        dst_copy: Option<&DstCopy<'_>>,
        device: &mut dyn ProgramDevice,
    ) -> Result<&Program, ProgramError> {
        let desc = ProgramDesc::build(state, draw_type, blend, caps, dst_copy).context(DescErr)?;
        self.program_for(desc, state, device)
    }

    pub fn program_for(
        &mut self,
        desc: ProgramDesc,
        state: &DrawState,
        device: &mut dyn ProgramDevice,
    ) -> Result<&Program, ProgramError> {
        self.clock += 1;
        let tick = self.clock;

        match self.entries.get_mut(&desc) {
            Some(entry) => {
                self.stats.hits += 1;
                entry.last_used = tick;
            }
            None => {
                self.stats.misses += 1;
                if self.stats.misses % 1000 == 0 {
                    warn!("[Program Cache] Miss on {desc:?}, Misses: {}", self.stats.misses);
                }
                // a failed build leaves the cached programs alone
                let program = Program::create(&desc, state, device).context(BuildErr)?;
                if self.entries.len() >= self.max_entries {
                    self.evict_lru(device);
                }
                self.entries.insert(
                    desc.clone(),
                    CacheEntry {
                        program,
                        last_used: tick,
                    },
                );
            }
        }
        Ok(&self.entries[&desc].program)
    }

    pub fn find(&self, desc: &ProgramDesc) -> Option<&Program> {
        self.entries.get(desc).map(|e| &e.program)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> ProgramCacheStats {
        self.stats
    }

    /// Deletes every program on the device.
    pub fn release_all(&mut self, device: &mut dyn ProgramDevice) {
        for (_, entry) in self.entries.drain() {
            device.delete_program(entry.program.handle());
        }
    }

    /// Forgets every program without touching the device, for when it was lost.
    pub fn abandon(&mut self) {
        self.entries.clear();
    }

    fn evict_lru(&mut self, device: &mut dyn ProgramDevice) {
        let lru = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(desc, _)| desc.clone());
        let Some(desc) = lru else {
            return;
        };
        if let Some(entry) = self.entries.remove(&desc) {
            self.stats.evictions += 1;
            trace!("[Program Cache] Evicted {:?}", entry.program.handle());
            device.delete_program(entry.program.handle());
        }
    }
}
