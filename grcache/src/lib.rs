#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
pub mod caps;
pub mod config;
pub mod content;
pub mod geometry;
pub mod program;
pub mod resource_cache;
pub mod texture;

pub use caps::Caps;
pub use config::*;
pub use geometry::*;
pub use resource_cache::{CacheKey, CacheRecord, KeyDomain, ResourceCache, with_cache};

pub use ::log;
pub use ::wgpu;
