//! Node records stored in the pool.
//!
//! A node occupies one fixed-size slot: a stable identifier, a retain
//! counter, a cached child count, and a body that is either a live payload or
//! the allocation-failure marker. Tree shape is not stored on the node; it is
//! implied by the pool's preorder slot layout plus the cached child counts.

use serde::Serialize;
use std::fmt;

/// Stable logical name for a node, independent of its slot position.
///
/// Identifiers come from a monotonically increasing 64-bit counter and are
/// never recycled: once a node is destroyed its identifier stays permanently
/// unresolvable, so a stale handle is observably invalid instead of silently
/// aliasing an unrelated node. The one deliberate exception is the
/// allocation-failure substitution, which reassigns a dismantled node's
/// identifier to the marker that takes its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Reserved "no node" identifier carried by undefined handles.
    pub const NONE: NodeId = NodeId(u64::MAX);

    /// Identifier of the pool-eternal allocation-failure node handed out by
    /// `create` when no slot is available. Never stored in a slot.
    pub const STATIC_FAILURE: NodeId = NodeId(0);

    /// First identifier issued for ordinary nodes.
    pub(crate) const FIRST: u64 = 1;

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self != Self::NONE
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NodeId::NONE => write!(f, "#none"),
            NodeId::STATIC_FAILURE => write!(f, "#failure"),
            NodeId(raw) => write!(f, "#{raw}"),
        }
    }
}

/// Contract a concrete node kind signs with the pool.
///
/// `Clone` is the payload's deep-copy procedure (a payload never owns its
/// children; copying subtrees is the pool's job) and `Debug` feeds the debug
/// dumps. Storage size is fixed per pool because every slot holds the same
/// payload type.
pub trait NodePayload: Clone + fmt::Debug {
    /// Short label for the concrete kind, used in logs and dumps.
    fn kind(&self) -> &'static str;
}

/// Body of a slot: a live payload, or the allocation-failure marker that a
/// live node is irreversibly replaced by when storage runs out.
#[derive(Debug, Clone)]
pub(crate) enum NodeBody<P> {
    Live(P),
    Failed,
}

/// One pool slot. Handles never expose these records; payloads reach user
/// code through `TreeHandle`'s fallible accessors.
#[derive(Debug, Clone)]
pub(crate) struct Node<P> {
    id: NodeId,
    retain_count: u32,
    child_count: u32,
    body: NodeBody<P>,
}

impl<P> Node<P> {
    pub(crate) fn live(id: NodeId, payload: P) -> Self {
        Node {
            id,
            retain_count: 1,
            child_count: 0,
            body: NodeBody::Live(payload),
        }
    }

    pub(crate) fn failed(id: NodeId) -> Self {
        Node {
            id,
            retain_count: 1,
            child_count: 0,
            body: NodeBody::Failed,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn retain_count(&self) -> u32 {
        self.retain_count
    }

    #[inline]
    pub fn child_count(&self) -> u32 {
        self.child_count
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self.body, NodeBody::Failed)
    }

    pub fn payload(&self) -> Option<&P> {
        match &self.body {
            NodeBody::Live(payload) => Some(payload),
            NodeBody::Failed => None,
        }
    }

    pub(crate) fn payload_mut(&mut self) -> Option<&mut P> {
        match &mut self.body {
            NodeBody::Live(payload) => Some(payload),
            NodeBody::Failed => None,
        }
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub(crate) fn retain(&mut self) {
        assert!(
            self.retain_count < u32::MAX,
            "retain count overflow on node {}",
            self.id
        );
        self.retain_count += 1;
    }

    /// Decrement and return the remaining count.
    pub(crate) fn release(&mut self) -> u32 {
        assert!(
            self.retain_count > 0,
            "release of node {} whose retain count is already 0",
            self.id
        );
        self.retain_count -= 1;
        self.retain_count
    }

    pub(crate) fn set_retain_count(&mut self, count: u32) {
        self.retain_count = count;
    }

    pub(crate) fn increment_child_count(&mut self) {
        self.child_count += 1;
    }

    pub(crate) fn decrement_child_count(&mut self) {
        assert!(
            self.child_count > 0,
            "child count underflow on node {}",
            self.id
        );
        self.child_count -= 1;
    }
}

impl<P: NodePayload> Node<P> {
    /// Label for logs and dumps.
    pub fn kind_label(&self) -> &'static str {
        match &self.body {
            NodeBody::Live(payload) => payload.kind(),
            NodeBody::Failed => "allocation-failure",
        }
    }

    /// Structural copy under a fresh identifier. Retain starts at 1: a copied
    /// root is adopted by a handle, inner copies by their parent link.
    pub(crate) fn copy_with_id(&self, id: NodeId) -> Self {
        Node {
            id,
            retain_count: 1,
            child_count: self.child_count,
            body: self.body.clone(),
        }
    }
}
