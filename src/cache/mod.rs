//! HTTP response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Request (GET/HEAD only)
//!     → key.rs (normalize absolute URL)
//!     → manager.rs lookup: Fresh | Stale | Miss
//!
//! Origin 2xx response
//!     → policy.rs (Content-Type → fresh / stale-serve windows)
//!     → manager.rs store (background task, last write wins)
//! ```
//!
//! # Design Decisions
//! - Lookup is synchronous and in-memory; the hit path never touches the network
//! - Eviction may happen at any time and is indistinguishable from a miss
//! - Stale entries are served while one background revalidation refreshes them

pub mod key;
pub mod manager;
pub mod policy;

pub use key::{is_cacheable_method, CacheKey};
pub use manager::{
    response_storage_rejection, CacheLookup, CacheManager, CacheStats, CachedResponse, RevalidationClaim,
    StoreRejection, X_CACHE,
};
pub use policy::{CachePolicy, CachePolicyTable};
