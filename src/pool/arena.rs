//! Slot storage and relocation primitives.
//!
//! `PoolState` owns every node in one fixed-capacity vector kept in preorder:
//! a node is immediately followed by its whole subtree, then by its next
//! sibling. Structural editing is expressed as relocation of contiguous slot
//! ranges; a move never duplicates memory, it shifts the slots in between and
//! re-registers every identifier whose position changed. The identifier index
//! is the single source of truth for resolving a handle to a slot.
//!
//! Every slot position returned by these methods is invalidated by any
//! mutation. Callers re-resolve by identifier after each call that can move
//! slots; caching a slot across a mutation is a correctness bug, not a
//! performance trick.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::ops::Range;
use tracing::{debug, trace};

use super::node::{Node, NodeId, NodePayload};
use crate::limits;

/// Configuration for a new pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of node slots; fixed for the pool's lifetime.
    pub capacity: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            capacity: limits::DEFAULT_POOL_CAPACITY,
        }
    }
}

/// Raw slot store. Single-threaded; shared ownership and refcounting live in
/// the handle layer on top.
pub(crate) struct PoolState<P> {
    /// Live nodes in preorder. Length never exceeds `capacity`.
    slots: Vec<Node<P>>,
    /// identifier → current slot position.
    index: FxHashMap<NodeId, usize>,
    /// Next identifier to issue.
    next_id: u64,
    capacity: usize,
    /// Pool-eternal record backing handles from failed `create` calls.
    static_failure: Node<P>,
}

impl<P: NodePayload> PoolState<P> {
    pub(crate) fn new(options: PoolOptions) -> Self {
        assert!(
            options.capacity >= 1 && options.capacity <= limits::MAX_POOL_CAPACITY,
            "pool capacity {} outside 1..={}",
            options.capacity,
            limits::MAX_POOL_CAPACITY
        );
        PoolState {
            slots: Vec::with_capacity(options.capacity),
            index: FxHashMap::default(),
            next_id: NodeId::FIRST,
            capacity: options.capacity,
            static_failure: Node::failed(NodeId::STATIC_FAILURE),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.capacity - self.slots.len()
    }

    /// All slots in physical (preorder) order.
    pub(crate) fn nodes(&self) -> &[Node<P>] {
        &self.slots
    }

    /// Identifiers of all top-level subtrees, in slot order.
    pub(crate) fn root_ids(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        let mut cursor = 0;
        while cursor < self.slots.len() {
            roots.push(self.slots[cursor].id());
            cursor += self.subtree_size(cursor);
        }
        roots
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Current slot of `id`. The static failure node has no slot.
    pub(crate) fn slot_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn is_registered(&self, id: NodeId) -> bool {
        id == NodeId::STATIC_FAILURE || self.index.contains_key(&id)
    }

    pub(crate) fn resolve(&self, id: NodeId) -> Option<&Node<P>> {
        if id == NodeId::STATIC_FAILURE {
            return Some(&self.static_failure);
        }
        self.slot_of(id).map(|slot| &self.slots[slot])
    }

    pub(crate) fn resolve_mut(&mut self, id: NodeId) -> Option<&mut Node<P>> {
        if id == NodeId::STATIC_FAILURE {
            return Some(&mut self.static_failure);
        }
        match self.slot_of(id) {
            Some(slot) => Some(&mut self.slots[slot]),
            None => None,
        }
    }

    fn require_slot(&self, id: NodeId) -> usize {
        match self.slot_of(id) {
            Some(slot) => slot,
            None => panic!("identifier {id} does not resolve to a pool slot"),
        }
    }

    fn require_node_mut(&mut self, id: NodeId) -> &mut Node<P> {
        let slot = self.require_slot(id);
        &mut self.slots[slot]
    }

    /// Whether `id` names an allocation-failure marker, either the static
    /// node or a converted slot. Unresolvable identifiers are merely
    /// undefined, not failures.
    pub(crate) fn is_allocation_failure(&self, id: NodeId) -> bool {
        match self.resolve(id) {
            Some(node) => node.is_failed(),
            None => false,
        }
    }

    // =========================================================================
    // Creation and identifiers
    // =========================================================================

    fn generate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocate a live node at the used end. A full pool hands out the static
    /// failure identifier instead; existing slots are never disturbed.
    pub(crate) fn create(&mut self, payload: P) -> NodeId {
        if self.slots.len() >= self.capacity {
            debug!(
                capacity = self.capacity,
                kind = payload.kind(),
                "pool exhausted, returning the static allocation-failure node"
            );
            return NodeId::STATIC_FAILURE;
        }
        let id = self.generate_id();
        trace!(%id, kind = payload.kind(), slot = self.slots.len(), "create");
        self.index.insert(id, self.slots.len());
        self.slots.push(Node::live(id, payload));
        id
    }

    /// Allocate an allocation-failure marker slot. Callers guarantee room.
    fn create_failed(&mut self) -> NodeId {
        assert!(
            self.slots.len() < self.capacity,
            "no slot available for an allocation-failure marker"
        );
        let id = self.generate_id();
        self.index.insert(id, self.slots.len());
        self.slots.push(Node::failed(id));
        id
    }

    /// Reassign a node's identifier in place, without moving its slot.
    pub(crate) fn rename(&mut self, from: NodeId, to: NodeId) {
        let slot = self.require_slot(from);
        trace!(%from, %to, slot, "rename");
        self.index.remove(&from);
        self.slots[slot].set_id(to);
        let previous = self.index.insert(to, slot);
        assert!(
            previous.is_none(),
            "rename target {to} is already registered to another slot"
        );
    }

    // =========================================================================
    // Preorder geometry
    // =========================================================================

    /// Number of slots in the subtree rooted at `slot`: the node itself plus
    /// all of its descendants.
    pub(crate) fn subtree_size(&self, slot: usize) -> usize {
        let mut end = slot;
        let mut pending = 1usize;
        while pending > 0 {
            assert!(
                end < self.slots.len(),
                "child counts run past the used end at slot {end}"
            );
            pending += self.slots[end].child_count() as usize;
            pending -= 1;
            end += 1;
        }
        end - slot
    }

    /// Slot of the parent of the node at `slot`: the nearest preceding node
    /// whose subtree span covers `slot`. Linear in the pool size.
    pub(crate) fn parent_slot(&self, slot: usize) -> Option<usize> {
        for candidate in (0..slot).rev() {
            if candidate + self.subtree_size(candidate) > slot {
                return Some(candidate);
            }
        }
        None
    }

    pub(crate) fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        if id == NodeId::STATIC_FAILURE {
            return None;
        }
        let slot = self.require_slot(id);
        self.parent_slot(slot).map(|parent| self.slots[parent].id())
    }

    pub(crate) fn child_count(&self, id: NodeId) -> usize {
        match self.resolve(id) {
            Some(node) => node.child_count() as usize,
            None => panic!("identifier {id} does not resolve to a node"),
        }
    }

    /// Identifier of child `index` of `parent`. Walks sibling spans.
    pub(crate) fn child_at(&self, parent: NodeId, index: usize) -> NodeId {
        let count = self.child_count(parent);
        assert!(
            index < count,
            "child index {index} out of range, node {parent} has {count} children"
        );
        let mut cursor = self.require_slot(parent) + 1;
        for _ in 0..index {
            cursor += self.subtree_size(cursor);
        }
        self.slots[cursor].id()
    }

    /// Position of `child` among the children of `parent`.
    pub(crate) fn index_of_child(&self, parent: NodeId, child: NodeId) -> usize {
        let parent_slot = self.require_slot(parent);
        let target = self.require_slot(child);
        let mut cursor = parent_slot + 1;
        for index in 0..self.slots[parent_slot].child_count() as usize {
            if cursor == target {
                return index;
            }
            cursor += self.subtree_size(cursor);
        }
        panic!("node {child} is not a child of node {parent}");
    }

    /// Insertion boundary for a new child of `parent` at `index`: the slot
    /// just past `index` existing sibling spans.
    fn child_boundary_slot(&self, parent: NodeId, index: usize) -> usize {
        let mut cursor = self.require_slot(parent) + 1;
        for _ in 0..index {
            cursor += self.subtree_size(cursor);
        }
        cursor
    }

    /// Direct child slots of the node at `slot`, in sibling order.
    fn child_slots(&self, slot: usize) -> SmallVec<[usize; limits::INLINE_CHILDREN]> {
        let count = self.slots[slot].child_count() as usize;
        let mut children = SmallVec::new();
        let mut cursor = slot + 1;
        for _ in 0..count {
            children.push(cursor);
            cursor += self.subtree_size(cursor);
        }
        children
    }

    // =========================================================================
    // Relocation
    // =========================================================================

    /// Relocate the slot block `span` so it ends up immediately preceding the
    /// current position `dest`, shifting everything in between and
    /// re-registering every identifier whose slot changed.
    pub(crate) fn move_span(&mut self, span: Range<usize>, dest: usize) {
        debug_assert!(span.start <= span.end && span.end <= self.slots.len());
        debug_assert!(dest <= self.slots.len());
        assert!(
            dest <= span.start || dest >= span.end,
            "move destination {dest} lies inside the moved span {span:?}"
        );
        if span.is_empty() || dest == span.start || dest == span.end {
            return;
        }
        trace!(?span, dest, "move");
        let touched = if dest > span.end {
            self.slots[span.start..dest].rotate_left(span.len());
            span.start..dest
        } else {
            self.slots[dest..span.end].rotate_right(span.len());
            dest..span.end
        };
        self.reindex(touched);
    }

    /// Relocate the whole subtree of `id` to precede the current position
    /// `dest`.
    pub(crate) fn move_subtree(&mut self, id: NodeId, dest: usize) {
        let slot = self.require_slot(id);
        let span = self.subtree_size(slot);
        self.move_span(slot..slot + span, dest);
    }

    fn reindex(&mut self, range: Range<usize>) {
        for slot in range {
            let id = self.slots[slot].id();
            self.index.insert(id, slot);
        }
    }

    // =========================================================================
    // Retain, release, destruction
    // =========================================================================

    /// Increment the retain count of `id`. The static failure node is
    /// eternal; retaining it is a no-op.
    pub(crate) fn retain(&mut self, id: NodeId) {
        if id == NodeId::STATIC_FAILURE {
            return;
        }
        match self.resolve_mut(id) {
            Some(node) => node.retain(),
            None => panic!("retain of unresolvable identifier {id}"),
        }
    }

    /// Decrement the retain count of `id`; at zero the subtree is staged at
    /// the used end and reclaimed.
    pub(crate) fn release(&mut self, id: NodeId) {
        if id == NodeId::STATIC_FAILURE {
            return;
        }
        let remaining = match self.resolve_mut(id) {
            Some(node) => node.release(),
            None => panic!("release of unresolvable identifier {id}"),
        };
        if remaining == 0 {
            self.destroy(id);
        }
    }

    /// Reclaim a subtree whose root's retain count reached zero.
    fn destroy(&mut self, id: NodeId) {
        let slot = self.require_slot(id);
        let span = self.subtree_size(slot);
        trace!(%id, slot, span, "destroy");
        let end = self.slots.len();
        self.move_span(slot..slot + span, end);
        self.release_children_and_destroy(id);
    }

    /// Release every direct child of `id`, then drop `id`'s own record no
    /// matter what its retain count says. Children that remain retained
    /// survive as detached roots at the used end. Callers stage the subtree
    /// at the used end first.
    fn release_children_and_destroy(&mut self, id: NodeId) {
        let slot = self.require_slot(id);
        let children: SmallVec<[NodeId; limits::INLINE_CHILDREN]> = self
            .child_slots(slot)
            .into_iter()
            .map(|child| self.slots[child].id())
            .collect();
        for child in children {
            self.release(child);
        }
        let slot = self.require_slot(id);
        self.index.remove(&id);
        self.slots.remove(slot);
        let used = self.slots.len();
        self.reindex(slot..used);
    }

    // =========================================================================
    // Deep copy
    // =========================================================================

    /// Structural copy of the subtree rooted at `id`, with fresh identifiers
    /// at every level. Capacity is checked up front against the whole span,
    /// so a copy either completes or leaves the pool untouched; when it
    /// cannot fit, the static failure identifier is returned.
    pub(crate) fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let src = self.require_slot(id);
        let span = self.subtree_size(src);
        if span > self.available() {
            debug!(
                %id,
                span,
                available = self.available(),
                "deep copy does not fit, returning the static allocation-failure node"
            );
            return NodeId::STATIC_FAILURE;
        }
        let base = self.slots.len();
        for offset in 0..span {
            let copy_id = self.generate_id();
            let copy = self.slots[src + offset].copy_with_id(copy_id);
            self.index.insert(copy_id, base + offset);
            self.slots.push(copy);
        }
        let root = self.slots[base].id();
        trace!(src = %id, %root, span, "deep copy");
        root
    }

    // =========================================================================
    // Hierarchy editing
    // =========================================================================

    /// Structural detach: stage `child`'s subtree at the used end and drop
    /// its parent link. The caller must hold another retain on `child` (a
    /// live handle), otherwise the release here would reclaim it mid-flight.
    fn detach_for_transfer(&mut self, child: NodeId) {
        let Some(prior) = self.parent_of(child) else {
            return;
        };
        let end = self.slots.len();
        self.move_subtree(child, end);
        self.require_node_mut(prior).decrement_child_count();
        self.release(child);
    }

    /// Attach a detached root under `parent` at `index`: retain, walk the
    /// insertion boundary, relocate, bump the child count.
    fn insert_subtree(&mut self, parent: NodeId, child: NodeId, index: usize) {
        self.retain(child);
        let boundary = self.child_boundary_slot(parent, index);
        self.move_subtree(child, boundary);
        self.require_node_mut(parent).increment_child_count();
    }

    /// Insert `child` as the first child of `parent`. A node re-added to its
    /// own parent is detached first, so it ends up at the front.
    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.add_child_at_index(parent, child, 0);
    }

    pub(crate) fn add_child_at_index(&mut self, parent: NodeId, child: NodeId, index: usize) {
        if self.is_allocation_failure(parent) {
            return;
        }
        if self.is_allocation_failure(child) {
            // A failure marker cannot be grafted in as a fresh child; it
            // poisons the receiver instead.
            self.convert_to_failed(parent);
            return;
        }
        self.detach_for_transfer(child);
        let count = self.child_count(parent);
        assert!(
            index <= count,
            "insertion index {index} out of range, node {parent} has {count} children"
        );
        self.attach_subtree(parent, child, index);
    }

    /// Shared attach tail: cycle check, then insertion. `child` is detached
    /// and `index` is already validated.
    fn attach_subtree(&mut self, parent: NodeId, child: NodeId, index: usize) {
        let child_slot = self.require_slot(child);
        let child_span = self.subtree_size(child_slot);
        let parent_slot = self.require_slot(parent);
        assert!(
            !(child_slot <= parent_slot && parent_slot < child_slot + child_span),
            "cannot add node {child} as a child of a node in its own subtree"
        );
        trace!(%parent, %child, index, "add child");
        self.insert_subtree(parent, child, index);
    }

    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let actual = self.parent_of(child);
        assert!(
            actual == Some(parent),
            "node {child} is not a child of node {parent}"
        );
        trace!(%parent, %child, "remove child");
        let end = self.slots.len();
        self.move_subtree(child, end);
        self.require_node_mut(parent).decrement_child_count();
        self.release(child);
    }

    pub(crate) fn replace_child_at_index(
        &mut self,
        parent: NodeId,
        old_index: usize,
        new_child: NodeId,
    ) {
        if self.is_allocation_failure(new_child) {
            // The replacement itself failed; the receiver takes the failure.
            self.convert_to_failed(parent);
            return;
        }
        trace!(%parent, old_index, %new_child, "replace child");
        self.detach_for_transfer(new_child);
        let count = self.child_count(parent);
        assert!(
            old_index < count,
            "child index {old_index} out of range, node {parent} has {count} children"
        );
        let old_child = self.child_at(parent, old_index);
        // The detach above already pulled `new_child` out of `parent`, so it
        // can no longer be the child resolved at `old_index`.
        debug_assert!(
            old_child != new_child,
            "replacing child {old_index} of node {parent} with itself"
        );
        let new_slot = self.require_slot(new_child);
        let new_span = self.subtree_size(new_slot);
        let parent_slot = self.require_slot(parent);
        assert!(
            !(new_slot <= parent_slot && parent_slot < new_slot + new_span),
            "cannot replace a child of node {parent} with a node whose subtree contains it"
        );
        // The new child slides in right after the old child's span; the old
        // child then leaves for the used end, handing the newcomer exactly
        // the vacated position. One child out, one child in: the receiver's
        // child count is untouched.
        let old_slot = self.require_slot(old_child);
        let boundary = old_slot + self.subtree_size(old_slot);
        self.move_subtree(new_child, boundary);
        self.retain(new_child);
        let end = self.slots.len();
        self.move_subtree(old_child, end);
        self.release(old_child);
    }

    pub(crate) fn replace_with(&mut self, receiver: NodeId, new: NodeId) {
        let Some(parent) = self.parent_of(receiver) else {
            return;
        };
        let index = self.index_of_child(parent, receiver);
        self.replace_child_at_index(parent, index, new);
    }

    pub(crate) fn swap_children(&mut self, parent: NodeId, i: usize, j: usize) {
        if i == j {
            return;
        }
        let count = self.child_count(parent);
        assert!(
            i < count && j < count,
            "swap indices ({i}, {j}) out of range, node {parent} has {count} children"
        );
        trace!(%parent, i, j, "swap children");
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let first = self.child_at(parent, lo);
        let second = self.child_at(parent, hi);
        // Two moves, no temporary: the lower child hops to just after the
        // higher child's span, then the displaced higher child drops into the
        // vacated position.
        let first_slot = self.require_slot(first);
        let second_slot = self.require_slot(second);
        let second_end = second_slot + self.subtree_size(second_slot);
        self.move_subtree(first, second_end);
        self.move_subtree(second, first_slot);
    }

    // =========================================================================
    // Allocation-failure conversion
    // =========================================================================

    /// Replace a live node by an allocation-failure marker under the same
    /// identifier, leaving its position in its parent and its retain count
    /// untouched as seen from outside. Children do not survive. Irreversible.
    pub(crate) fn convert_to_failed(&mut self, id: NodeId) {
        if id == NodeId::STATIC_FAILURE {
            return;
        }
        let slot = self.require_slot(id);
        if self.slots[slot].is_failed() {
            return;
        }
        // Capture the anchoring before tearing anything down.
        let parent = self.parent_of(id);
        let index = parent.map(|p| self.index_of_child(p, id));
        let retain = self.slots[slot].retain_count();
        debug!(%id, parent = ?parent, index = ?index, retain, "convert to allocation failure");
        // Detach structurally, then dismantle. The record is dropped no
        // matter how many handles still point at the identifier, because the
        // identifier is about to be reborn as the failure marker.
        let end = self.slots.len();
        self.move_subtree(id, end);
        if let Some(p) = parent {
            self.require_node_mut(p).decrement_child_count();
        }
        self.release_children_and_destroy(id);
        // At least one slot was just vacated, so the marker always fits.
        let fresh = self.create_failed();
        self.rename(fresh, id);
        match (parent, index) {
            (Some(p), Some(k)) => {
                // Re-anchoring retains the marker back up to the captured
                // count.
                self.require_node_mut(id).set_retain_count(retain - 1);
                self.insert_subtree(p, id, k);
            }
            _ => {
                self.require_node_mut(id).set_retain_count(retain);
            }
        }
    }

    // =========================================================================
    // Consistency checking
    // =========================================================================

    /// Walk the whole pool and panic on any structural violation. Meant for
    /// tests and debugging; linear in the pool size.
    pub(crate) fn check_consistency(&self) {
        assert_eq!(
            self.index.len(),
            self.slots.len(),
            "identifier index has {} entries for {} slots",
            self.index.len(),
            self.slots.len()
        );
        for (slot, node) in self.slots.iter().enumerate() {
            let id = node.id();
            assert!(id.is_some(), "slot {slot} holds the reserved none identifier");
            assert!(
                id != NodeId::STATIC_FAILURE,
                "slot {slot} holds the static failure identifier"
            );
            assert!(
                id.0 < self.next_id,
                "slot {slot} holds identifier {id} that was never issued"
            );
            assert_eq!(
                self.slot_of(id),
                Some(slot),
                "identifier {id} is indexed away from its slot {slot}"
            );
            assert!(node.retain_count() > 0, "live node {id} has retain count 0");
        }
        let mut cursor = 0;
        while cursor < self.slots.len() {
            cursor = self.check_subtree(cursor);
        }
        assert_eq!(cursor, self.slots.len(), "subtree spans overrun the used end");
    }

    fn check_subtree(&self, slot: usize) -> usize {
        let node = &self.slots[slot];
        let mut cursor = slot + 1;
        for _ in 0..node.child_count() {
            assert!(
                cursor < self.slots.len(),
                "children of node {} run past the used end",
                node.id()
            );
            cursor = self.check_subtree(cursor);
        }
        cursor
    }
}
