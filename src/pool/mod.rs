//! Fixed-capacity tree storage with relocation-stable handles.
//!
//! Every node of every tree lives in one preallocated pool, stored in
//! preorder so that a subtree is always one contiguous block of slots. The
//! pool compacts on every structural edit by relocating blocks, which means
//! a node's position is never stable; user code holds [`TreeHandle`]s, which
//! follow a node by identifier through every move. Handles are refcounted:
//! clone to retain, drop to release, last release reclaims the subtree.
//!
//! Allocation never panics on exhaustion. A `create` or `deep_copy` that
//! does not fit hands back a handle to an allocation-failure marker, and
//! attaching such a marker to a live tree converts the receiving node into
//! a marker too, so the failure travels up to whoever checks for it.
//!
//! # Example
//!
//! ```
//! use treepool::{NodePayload, TreePool};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum Calc {
//!     Int(i64),
//!     Add,
//! }
//!
//! impl NodePayload for Calc {
//!     fn kind(&self) -> &'static str {
//!         match self {
//!             Calc::Int(_) => "int",
//!             Calc::Add => "add",
//!         }
//!     }
//! }
//!
//! let pool = TreePool::new();
//! let sum = pool.create(Calc::Add);
//! let one = pool.create(Calc::Int(1));
//! let two = pool.create(Calc::Int(2));
//! // add_child inserts at the front, so the tree is built back to front.
//! sum.add_child(&two);
//! sum.add_child(&one);
//! assert_eq!(sum.child_count(), 2);
//! assert_eq!(sum.child_at(0), one);
//! assert_eq!(one.payload(), Some(Calc::Int(1)));
//!
//! let copy = sum.deep_copy();
//! assert_eq!(copy.child_count(), 2);
//! assert_ne!(copy, sum);
//! ```

pub mod arena;
pub mod handle;
pub mod node;

pub use arena::PoolOptions;
pub use handle::{TreeHandle, TreePool};
pub use node::{NodeId, NodePayload};
