use bon::Builder;
use log::warn;

pub const DEFAULT_RESOURCE_CACHE_BYTE_LIMIT: usize = 2 * 1024 * 1024;
pub const DEFAULT_DISCARDABLE_COUNT_LIMIT: usize = 1024;
pub const DEFAULT_PROGRAM_CACHE_ENTRIES: usize = 128;

pub const RESOURCE_CACHE_LIMIT_ENV: &str = "GRCACHE_RESOURCE_CACHE_LIMIT";

#[derive(Debug, Clone, Builder)]
pub struct ResourceCacheConfig {
    /// Byte budget used when no discardable factory is installed.
    #[builder(default = DEFAULT_RESOURCE_CACHE_BYTE_LIMIT)]
    pub byte_limit: usize,
    /// Largest single allocation the cache wants to hold. 0 means "use byte_limit".
    #[builder(default = 0)]
    pub single_allocation_byte_limit: usize,
    /// Record count budget used when a discardable factory is installed.
    #[builder(default = DEFAULT_DISCARDABLE_COUNT_LIMIT)]
    pub discardable_count_limit: usize,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        ResourceCacheConfig::builder().build()
    }
}

impl ResourceCacheConfig {
    /// Defaults, with the byte limit overridable by `GRCACHE_RESOURCE_CACHE_LIMIT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let Ok(raw) = std::env::var(RESOURCE_CACHE_LIMIT_ENV) else {
            return config;
        };

        match raw.trim().parse::<usize>() {
            Ok(limit) => config.byte_limit = limit,
            Err(e) => warn!("Ignoring {RESOURCE_CACHE_LIMIT_ENV}={raw:?}: {e}"),
        }

        config
    }
}

#[derive(Debug, Clone, Builder)]
pub struct ProgramCacheConfig {
    #[builder(default = DEFAULT_PROGRAM_CACHE_ENTRIES)]
    pub max_entries: usize,
}

impl Default for ProgramCacheConfig {
    fn default() -> Self {
        ProgramCacheConfig::builder().build()
    }
}
