//! Centralized capacity and tuning constants.
//!
//! Everything that bounds the pool layer lives here so the memory story can
//! be audited in one place instead of being scattered through the code.

/// Default slot count for [`PoolOptions::default()`](crate::PoolOptions).
///
/// Sized for an engine-scale working set: a few thousand nodes covers deeply
/// nested expressions plus scratch trees for editing, while keeping the
/// default pool footprint small. Callers with bigger workloads pick their own
/// capacity through `PoolOptions`.
pub const DEFAULT_POOL_CAPACITY: usize = 4096;

/// Hard ceiling on a pool's slot count.
///
/// Relocation shifts and parent scans are linear in the pool size, so a pool
/// anywhere near this bound is already the wrong tool; the cap turns a
/// runaway capacity request into an immediate error instead of an opaque
/// slowdown later.
pub const MAX_POOL_CAPACITY: usize = 1 << 24;

/// Inline capacity for per-operation child scratch vectors.
///
/// Operations that collect direct children (destruction, child walks) stay
/// allocation-free up to this arity and spill to the heap beyond it. Eight
/// covers ordinary expression trees; argument lists occasionally exceed it.
pub const INLINE_CHILDREN: usize = 8;
