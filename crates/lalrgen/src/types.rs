//! Utility types.

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// Insertion-ordered map. The iteration order is what keeps every pass of
/// the generator deterministic, which the table emitter relies on.
pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;

/// Insertion-ordered set, same rationale as [`Map`].
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;
