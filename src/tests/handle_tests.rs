//! Tests for pool/handle.rs

use crate::pool::TreeHandle;
use crate::test_fixtures::{MathNode, int_value, pool, sum};

#[test]
fn test_create_gives_a_defined_handle() {
    let pool = pool(8);
    let leaf = pool.create(MathNode::Integer(5));
    assert!(leaf.is_defined());
    assert!(!leaf.is_allocation_failure());
    assert_eq!(leaf.kind(), "integer");
    assert_eq!(leaf.retain_count(), 1);
    assert_eq!(leaf.child_count(), 0);
    assert_eq!(leaf.payload(), Some(MathNode::Integer(5)));
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_clone_retains_and_drop_releases() {
    let pool = pool(8);
    let leaf = pool.create(MathNode::Integer(1));
    assert_eq!(leaf.retain_count(), 1);

    let alias = leaf.clone();
    assert_eq!(leaf.retain_count(), 2);
    assert_eq!(alias.identifier(), leaf.identifier());
    assert_eq!(alias, leaf);

    drop(alias);
    assert_eq!(leaf.retain_count(), 1);
}

#[test]
fn test_last_drop_reclaims_the_subtree() {
    let pool = pool(8);
    {
        let root = sum(&pool, &[1, 2, 3]);
        assert_eq!(pool.len(), 4);
        assert_eq!(root.retain_count(), 1);
    }
    assert!(pool.is_empty());
    pool.check_consistency();
}

#[test]
fn test_parent_drop_leaves_retained_child_as_root() {
    let pool = pool(8);
    let child = pool.create(MathNode::Integer(1));
    {
        let root = pool.create(MathNode::Add);
        root.add_child(&child);
        assert_eq!(child.retain_count(), 2);
    }
    // The root is gone; the child's handle kept its subtree alive.
    assert!(child.is_defined());
    assert_eq!(pool.len(), 1);
    assert_eq!(child.retain_count(), 1);
    assert_eq!(child.index_in_parent(), None);
    assert!(!child.parent().is_defined());
    pool.check_consistency();
}

#[test]
fn test_undefined_handle() {
    let pool = pool(8);
    let undefined = TreeHandle::undefined(&pool);
    assert!(!undefined.is_defined());
    assert!(undefined.identifier().is_none());
    assert!(!undefined.is_allocation_failure());

    let root = pool.create(MathNode::Add);
    assert!(!root.parent().is_defined());
}

#[test]
fn test_payload_access_and_mutation() {
    let pool = pool(8);
    let leaf = pool.create(MathNode::Integer(3));
    assert_eq!(int_value(&leaf), 3);

    leaf.with_payload_mut(|payload| *payload = MathNode::Integer(4));
    assert_eq!(int_value(&leaf), 4);
    assert_eq!(leaf.kind(), "integer");
}

#[test]
fn test_navigation() {
    let pool = pool(8);
    let root = sum(&pool, &[10, 20]);

    let first = root.child_at(0);
    assert_eq!(int_value(&first), 10);
    assert_eq!(first.index_in_parent(), Some(0));
    assert_eq!(first.parent(), root);
    assert_eq!(root.index_in_parent(), None);

    let ids = root.subtree_ids();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], root.identifier());
    assert_eq!(ids[1], first.identifier());
}

#[test]
fn test_pool_handle_retains() {
    let pool = pool(8);
    let leaf = pool.create(MathNode::Integer(1));
    let again = pool.handle(leaf.identifier());
    assert_eq!(leaf.retain_count(), 2);
    assert_eq!(again, leaf);
}

#[test]
#[should_panic(expected = "retain of unresolvable")]
fn test_resurrecting_a_reclaimed_identifier_is_fatal() {
    let pool = pool(8);
    let id = {
        let leaf = pool.create(MathNode::Integer(1));
        leaf.identifier()
    };
    // The node is gone; the raw identifier must not come back to life.
    pool.handle(id);
}

#[test]
fn test_roots_iteration() {
    let pool = pool(8);
    let first = sum(&pool, &[1]);
    let second = pool.create(MathNode::Integer(2));

    let roots = pool.roots();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[0], first);
    assert_eq!(roots[1], second);
}

#[test]
#[should_panic(expected = "different pools")]
fn test_cross_pool_attach_is_fatal() {
    let left = pool(8);
    let right = pool(8);
    let parent = left.create(MathNode::Add);
    let stray = right.create(MathNode::Integer(1));
    parent.add_child(&stray);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_child_at_out_of_range_is_fatal() {
    let pool = pool(8);
    let leaf = pool.create(MathNode::Integer(1));
    leaf.child_at(0);
}

#[test]
fn test_handle_equality_is_per_node() {
    let pool = pool(8);
    let a = pool.create(MathNode::Integer(1));
    let b = pool.create(MathNode::Integer(1));
    assert_ne!(a, b, "equality follows identity, not payload");
    assert_eq!(a, a.clone());
}

#[test]
fn test_swap_children_via_handles() {
    let pool = pool(8);
    let root = sum(&pool, &[1, 2, 3]);
    root.swap_children(0, 2);
    assert_eq!(int_value(&root.child_at(0)), 3);
    assert_eq!(int_value(&root.child_at(1)), 2);
    assert_eq!(int_value(&root.child_at(2)), 1);
    pool.check_consistency();
}

#[test]
fn test_add_child_detaches_from_prior_parent() {
    let pool = pool(8);
    let old_parent = sum(&pool, &[1]);
    let new_parent = pool.create(MathNode::Add);
    let leaf = old_parent.child_at(0);

    new_parent.add_child(&leaf);
    assert_eq!(old_parent.child_count(), 0);
    assert_eq!(new_parent.child_count(), 1);
    assert_eq!(leaf.parent(), new_parent);
    pool.check_consistency();
}

#[test]
fn test_add_child_inserts_at_the_front() {
    let pool = pool(8);
    let root = pool.create(MathNode::Add);
    let a = pool.create(MathNode::Integer(1));
    let b = pool.create(MathNode::Integer(2));

    root.add_child(&a);
    root.add_child(&b);
    // The most recently added child sits at index 0.
    assert_eq!(root.child_at(0), b);
    assert_eq!(root.child_at(1), a);
    pool.check_consistency();
}

#[test]
fn test_remove_child_keeps_subtree_alive_via_handle() {
    let pool = pool(8);
    let root = sum(&pool, &[1, 2]);
    let removed = root.child_at(0);

    root.remove_child(&removed);
    assert_eq!(root.child_count(), 1);
    assert_eq!(int_value(&root.child_at(0)), 2);
    assert!(removed.is_defined());
    assert_eq!(removed.index_in_parent(), None);
    assert_eq!(pool.len(), 3);

    drop(removed);
    assert_eq!(pool.len(), 2);
    pool.check_consistency();
}

#[test]
fn test_replace_child_at_index_reclaims_the_old_child() {
    let pool = pool(8);
    let root = sum(&pool, &[1, 2]);
    let replacement = pool.create(MathNode::Integer(9));

    root.replace_child_at_index(0, &replacement);
    assert_eq!(root.child_count(), 2);
    assert_eq!(int_value(&root.child_at(0)), 9);
    assert_eq!(int_value(&root.child_at(1)), 2);
    assert_eq!(pool.len(), 3, "the unreferenced old child is reclaimed");
    pool.check_consistency();
}

#[test]
fn test_replace_child_with_a_sibling() {
    let pool = pool(8);
    let root = sum(&pool, &[1, 2, 3]);
    let last = root.child_at(2);

    // The sibling is detached before the old child is resolved, so it fills
    // the slot instead of colliding with it.
    root.replace_child_at_index(0, &last);
    assert_eq!(root.child_count(), 2);
    assert_eq!(int_value(&root.child_at(0)), 3);
    assert_eq!(int_value(&root.child_at(1)), 2);
    assert_eq!(last.index_in_parent(), Some(0));
    assert_eq!(pool.len(), 3, "the replaced first child is reclaimed");
    pool.check_consistency();
}

#[test]
fn test_replace_with_swaps_inside_the_parent() {
    let pool = pool(8);
    let root = sum(&pool, &[1, 2]);
    let old = root.child_at(1);
    let new = pool.create(MathNode::Integer(5));

    old.replace_with(&new);
    assert_eq!(int_value(&root.child_at(1)), 5);
    assert_eq!(root.child_count(), 2);
    // Held by a handle, so the old child survives as a detached root.
    assert!(old.is_defined());
    assert_eq!(old.index_in_parent(), None);
    pool.check_consistency();
}

#[test]
fn test_replace_with_on_a_root_is_a_noop() {
    let pool = pool(8);
    let root = pool.create(MathNode::Add);
    let new = pool.create(MathNode::Integer(1));
    root.replace_with(&new);
    assert!(root.is_defined());
    assert_eq!(root.index_in_parent(), None);
    assert_eq!(new.index_in_parent(), None);
    assert_eq!(pool.len(), 2);
}
