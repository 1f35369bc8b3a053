//! Incremental C/C++ type cache.
//!
//! Each project gets a [`CacheStore`] mapping source files to the namespaces and types they
//! declare. Change events flow through the [`DeltaListener`] (synchronous flush, then a
//! background refresh) or [`CacheManager::process_delta`] (background only). A refresh claims
//! every pending [`CacheDelta`], flushes their union, propagates the flush to files including a
//! changed header, and refills the cache from the project's symbol index. Questions the index
//! cannot answer yet (exact declaration offsets, supertypes, subtypes) are resolved by parsing
//! sources directly with the `locate_*_and_wait` family.
//!
//! At most one refresh or locator job touches a store at a time: both hold the store's
//! [`cbrowse_scheduler::SchedulingRule`] for as long as they run.

mod delta;
mod error;
mod jobs;
mod listener;
mod manager;
mod reference;
mod scope;
mod source;
mod store;
mod types;

pub use delta::CacheDelta;
pub use error::{Result, TypeCacheError};
pub use jobs::locator::{LocateGoal, LocateOutcome};
pub use jobs::refresh::{RefreshOutcome, RefreshStats, SkipReason};
pub use jobs::{LOCATOR_FAMILY, REFRESH_FAMILY};
pub use listener::{classify, DeltaListener, Invalidation};
pub use manager::CacheManager;
pub use reference::{IndexFileResolver, ReferenceLocation, ResolvedPath, TypeReference};
pub use scope::SearchScope;
pub use source::{FsSourceProvider, SourceProvider};
pub use store::CacheStore;
pub use types::{DeclKind, QualifiedName, TypeInfo, TypeKey, TypeKind};
