//! Refcounted handles over the slot store.
//!
//! `TreePool` is a cheap clone of a shared single-threaded pool; `TreeHandle`
//! is the only way user code touches a node. A handle carries an identifier,
//! never a slot, so relocation inside the pool is invisible to it. Cloning a
//! handle retains the node, dropping it releases; when the last retain on a
//! subtree root goes away the pool reclaims the whole subtree.
//!
//! Each public operation takes exactly one borrow of the pool state. Calling
//! back into the pool from inside a payload closure is therefore rejected at
//! runtime by the `RefCell` guard.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::arena::{PoolOptions, PoolState};
use super::node::{NodeId, NodePayload};

/// Shared ownership of one pool. All clones see the same nodes.
pub struct TreePool<P: NodePayload> {
    state: Rc<RefCell<PoolState<P>>>,
}

impl<P: NodePayload> TreePool<P> {
    /// Pool with the default capacity.
    pub fn new() -> Self {
        Self::with_options(PoolOptions::default())
    }

    pub fn with_options(options: PoolOptions) -> Self {
        debug!(capacity = options.capacity, "pool created");
        TreePool {
            state: Rc::new(RefCell::new(PoolState::new(options))),
        }
    }

    pub(crate) fn read(&self) -> Ref<'_, PoolState<P>> {
        self.state.borrow()
    }

    pub(crate) fn write(&self) -> RefMut<'_, PoolState<P>> {
        self.state.borrow_mut()
    }

    /// Allocate a node and hand back its first handle. When the pool is
    /// full the handle aliases the pool-eternal allocation-failure node;
    /// callers check with [`TreeHandle::is_allocation_failure`].
    pub fn create(&self, payload: P) -> TreeHandle<P> {
        let id = self.write().create(payload);
        TreeHandle::from_retained(self.clone(), id)
    }

    /// Materialize a handle from a raw identifier, retaining the node. The
    /// identifier must still resolve; resurrecting a reclaimed identifier is
    /// a fatal error.
    pub fn handle(&self, id: NodeId) -> TreeHandle<P> {
        self.write().retain(id);
        TreeHandle::from_retained(self.clone(), id)
    }

    /// Handles to every top-level subtree, in storage order.
    pub fn roots(&self) -> Vec<TreeHandle<P>> {
        let ids = self.read().root_ids();
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    /// Slots still free before `create` starts failing.
    pub fn available(&self) -> usize {
        self.read().available()
    }

    /// Whether `other` shares this pool's storage.
    pub fn same_pool(&self, other: &TreePool<P>) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Panic on any structural violation. Test and debugging aid.
    pub fn check_consistency(&self) {
        self.read().check_consistency();
    }
}

impl<P: NodePayload> Clone for TreePool<P> {
    fn clone(&self) -> Self {
        TreePool {
            state: Rc::clone(&self.state),
        }
    }
}

impl<P: NodePayload> Default for TreePool<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: NodePayload> fmt::Debug for TreePool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("TreePool")
            .field("used", &state.len())
            .field("capacity", &state.capacity())
            .finish()
    }
}

/// Owning reference to one node. Follows the node through every relocation.
pub struct TreeHandle<P: NodePayload> {
    pool: TreePool<P>,
    id: NodeId,
}

impl<P: NodePayload> TreeHandle<P> {
    /// Wrap an identifier whose retain the caller already owns.
    pub(crate) fn from_retained(pool: TreePool<P>, id: NodeId) -> Self {
        TreeHandle { pool, id }
    }

    /// Handle that refers to no node. The parent of a root is undefined.
    pub fn undefined(pool: &TreePool<P>) -> Self {
        TreeHandle {
            pool: pool.clone(),
            id: NodeId::NONE,
        }
    }

    #[inline]
    pub fn identifier(&self) -> NodeId {
        self.id
    }

    pub fn pool(&self) -> &TreePool<P> {
        &self.pool
    }

    /// Whether this handle currently refers to a node.
    pub fn is_defined(&self) -> bool {
        self.id.is_some() && self.pool.read().is_registered(self.id)
    }

    /// Whether this handle refers to an allocation-failure marker, either
    /// the pool-eternal node or a converted slot.
    pub fn is_allocation_failure(&self) -> bool {
        self.id.is_some() && self.pool.read().is_allocation_failure(self.id)
    }

    fn assert_defined(&self, operation: &str) {
        assert!(
            self.is_defined(),
            "{operation} on an undefined handle {}",
            self.id
        );
    }

    // =========================================================================
    // Node inspection
    // =========================================================================

    pub fn retain_count(&self) -> u32 {
        let state = self.pool.read();
        match state.resolve(self.id) {
            Some(node) => node.retain_count(),
            None => panic!("retain count of an undefined handle {}", self.id),
        }
    }

    pub fn child_count(&self) -> usize {
        let state = self.pool.read();
        match state.resolve(self.id) {
            Some(node) => node.child_count() as usize,
            None => panic!("child count of an undefined handle {}", self.id),
        }
    }

    /// Payload kind label; allocation-failure markers report themselves.
    pub fn kind(&self) -> &'static str {
        let state = self.pool.read();
        match state.resolve(self.id) {
            Some(node) => node.kind_label(),
            None => panic!("kind of an undefined handle {}", self.id),
        }
    }

    /// Run `f` against the node's payload, or return `None` when this handle
    /// refers to an allocation-failure marker, which carries no payload. The
    /// pool stays borrowed for the duration, so `f` must not call back into
    /// it.
    pub fn with_payload<R>(&self, f: impl FnOnce(&P) -> R) -> Option<R> {
        let state = self.pool.read();
        let node = match state.resolve(self.id) {
            Some(node) => node,
            None => panic!("payload access on an undefined handle {}", self.id),
        };
        node.payload().map(f)
    }

    /// Mutate the node's payload in place; `None` on a failure marker. Same
    /// borrow rule as [`with_payload`](Self::with_payload).
    pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        let mut state = self.pool.write();
        let id = self.id;
        let node = match state.resolve_mut(id) {
            Some(node) => node,
            None => panic!("payload access on an undefined handle {id}"),
        };
        node.payload_mut().map(f)
    }

    /// Clone of the node's payload; `None` on a failure marker.
    pub fn payload(&self) -> Option<P> {
        self.with_payload(P::clone)
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Handle to the parent node, or an undefined handle for a root.
    pub fn parent(&self) -> TreeHandle<P> {
        self.assert_defined("parent");
        let parent = self.pool.read().parent_of(self.id);
        match parent {
            Some(id) => self.pool.handle(id),
            None => TreeHandle::undefined(&self.pool),
        }
    }

    /// Handle to child `index`. Fatal when out of range.
    pub fn child_at(&self, index: usize) -> TreeHandle<P> {
        self.assert_defined("child_at");
        let child = self.pool.read().child_at(self.id, index);
        self.pool.handle(child)
    }

    /// Position of this node among its parent's children, or `None` for a
    /// root.
    pub fn index_in_parent(&self) -> Option<usize> {
        self.assert_defined("index_in_parent");
        let state = self.pool.read();
        state
            .parent_of(self.id)
            .map(|parent| state.index_of_child(parent, self.id))
    }

    /// Identifiers of this node's whole subtree in preorder, the node first.
    pub fn subtree_ids(&self) -> Vec<NodeId> {
        self.assert_defined("subtree_ids");
        let state = self.pool.read();
        let Some(slot) = state.slot_of(self.id) else {
            // The static failure node has no slot and no children.
            return vec![self.id];
        };
        let span = state.subtree_size(slot);
        state.nodes()[slot..slot + span]
            .iter()
            .map(|node| node.id())
            .collect()
    }

    // =========================================================================
    // Structure editing
    // =========================================================================

    /// Structural copy of this subtree under fresh identifiers. Copying an
    /// allocation-failure marker aliases it instead; a copy that does not
    /// fit yields a handle to the pool-eternal failure node.
    pub fn deep_copy(&self) -> TreeHandle<P> {
        self.assert_defined("deep_copy");
        if self.is_allocation_failure() {
            return self.clone();
        }
        let id = self.pool.write().deep_copy(self.id);
        TreeHandle::from_retained(self.pool.clone(), id)
    }

    /// Insert `child` as the first child of this node, detaching it from any
    /// prior parent first. Shorthand for
    /// [`add_child_at_index`](Self::add_child_at_index) with index 0, with
    /// the same allocation-failure behavior.
    pub fn add_child(&self, child: &TreeHandle<P>) {
        self.assert_defined("add_child");
        child.assert_defined("add_child");
        assert!(
            self.pool.same_pool(&child.pool),
            "nodes from different pools cannot be combined"
        );
        self.pool.write().add_child(self.id, child.id);
    }

    /// Insert `child` as child `index` of this node, detaching it from any
    /// prior parent first; `index` is checked after that detach. Adding to
    /// an allocation-failure marker is a no-op; adding a failure marker as a
    /// child converts this node into one instead.
    pub fn add_child_at_index(&self, child: &TreeHandle<P>, index: usize) {
        self.assert_defined("add_child_at_index");
        child.assert_defined("add_child_at_index");
        assert!(
            self.pool.same_pool(&child.pool),
            "nodes from different pools cannot be combined"
        );
        self.pool.write().add_child_at_index(self.id, child.id, index);
    }

    /// Detach `child` from this node. Fatal when `child` is not a child of
    /// this node. The subtree survives as long as handles to it do.
    pub fn remove_child(&self, child: &TreeHandle<P>) {
        self.assert_defined("remove_child");
        child.assert_defined("remove_child");
        assert!(
            self.pool.same_pool(&child.pool),
            "nodes from different pools cannot be combined"
        );
        self.pool.write().remove_child(self.id, child.id);
    }

    /// Swap out child `old_index` for `new_child`, which is detached from
    /// any prior parent first; `old_index` is checked after that detach.
    /// A failure-marker replacement converts this node into one instead.
    pub fn replace_child_at_index(&self, old_index: usize, new_child: &TreeHandle<P>) {
        self.assert_defined("replace_child_at_index");
        new_child.assert_defined("replace_child_at_index");
        assert!(
            self.pool.same_pool(&new_child.pool),
            "nodes from different pools cannot be combined"
        );
        self.pool
            .write()
            .replace_child_at_index(self.id, old_index, new_child.id);
    }

    /// Replace this node inside its parent by `new`. A no-op when this node
    /// is a root.
    pub fn replace_with(&self, new: &TreeHandle<P>) {
        self.assert_defined("replace_with");
        new.assert_defined("replace_with");
        assert!(
            self.pool.same_pool(&new.pool),
            "nodes from different pools cannot be combined"
        );
        self.pool.write().replace_with(self.id, new.id);
    }

    /// Exchange the positions of children `i` and `j`, subtrees included.
    pub fn swap_children(&self, i: usize, j: usize) {
        self.assert_defined("swap_children");
        self.pool.write().swap_children(self.id, i, j);
    }

    /// Turn this node into an allocation-failure marker in place: same
    /// identifier, same position in its parent, same retain count, children
    /// reclaimed. Irreversible.
    pub fn replace_with_allocation_failure(&self) {
        self.assert_defined("replace_with_allocation_failure");
        self.pool.write().convert_to_failed(self.id);
    }
}

impl<P: NodePayload> Clone for TreeHandle<P> {
    fn clone(&self) -> Self {
        if self.id.is_some() {
            self.pool.write().retain(self.id);
        }
        TreeHandle {
            pool: self.pool.clone(),
            id: self.id,
        }
    }
}

impl<P: NodePayload> Drop for TreeHandle<P> {
    fn drop(&mut self) {
        if self.id.is_some() {
            self.pool.write().release(self.id);
        }
    }
}

impl<P: NodePayload> PartialEq for TreeHandle<P> {
    fn eq(&self, other: &Self) -> bool {
        self.pool.same_pool(&other.pool) && self.id == other.id
    }
}

impl<P: NodePayload> Eq for TreeHandle<P> {}

impl<P: NodePayload> fmt::Debug for TreeHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHandle({})", self.id)
    }
}
