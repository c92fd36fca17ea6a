//! Debug renderings of pool contents.
//!
//! Three views of the same storage: `flat_string` shows the physical slot
//! layout, `tree_string` shows the logical trees, `to_json` produces a
//! machine-readable snapshot. All of them read the pool without changing
//! any retain count.

use serde::Serialize;
use serde_json::json;

use crate::pool::arena::PoolState;
use crate::pool::{NodePayload, TreePool};

/// One line per slot in physical order, preceded by a usage header. Shows
/// exactly how the preorder layout and the retain ledger look right now.
pub fn flat_string<P: NodePayload>(pool: &TreePool<P>) -> String {
    let state = pool.read();
    let mut out = format!("pool {}/{} slots\n", state.len(), state.capacity());
    for (slot, node) in state.nodes().iter().enumerate() {
        out.push_str(&format!(
            "[{slot:4}] {} kind={} children={} retain={}\n",
            node.id(),
            node.kind_label(),
            node.child_count(),
            node.retain_count(),
        ));
    }
    out
}

/// Indented rendering of every tree in the pool, two spaces per depth
/// level. Live nodes show their payload, failure markers just their label.
pub fn tree_string<P: NodePayload>(pool: &TreePool<P>) -> String {
    let state = pool.read();
    let mut out = String::new();
    let mut cursor = 0;
    while cursor < state.len() {
        cursor = write_subtree(&state, cursor, 0, &mut out);
    }
    out
}

fn write_subtree<P: NodePayload>(
    state: &PoolState<P>,
    slot: usize,
    depth: usize,
    out: &mut String,
) -> usize {
    let node = &state.nodes()[slot];
    for _ in 0..depth {
        out.push_str("  ");
    }
    match node.payload() {
        Some(payload) => {
            out.push_str(&format!("{} {} {:?}\n", node.id(), node.kind_label(), payload));
        }
        None => {
            out.push_str(&format!("{} {}\n", node.id(), node.kind_label()));
        }
    }
    let mut cursor = slot + 1;
    for _ in 0..node.child_count() {
        cursor = write_subtree(state, cursor, depth + 1, out);
    }
    cursor
}

/// JSON snapshot of the whole pool: usage counters plus every tree with
/// identifiers, retain counts and payloads. Failure markers carry a null
/// payload.
pub fn to_json<P>(pool: &TreePool<P>) -> serde_json::Value
where
    P: NodePayload + Serialize,
{
    let state = pool.read();
    let mut roots = Vec::new();
    let mut cursor = 0;
    while cursor < state.len() {
        let (tree, next) = json_subtree(&state, cursor);
        roots.push(tree);
        cursor = next;
    }
    json!({
        "used": state.len(),
        "capacity": state.capacity(),
        "roots": roots,
    })
}

fn json_subtree<P>(state: &PoolState<P>, slot: usize) -> (serde_json::Value, usize)
where
    P: NodePayload + Serialize,
{
    let node = &state.nodes()[slot];
    let mut children = Vec::new();
    let mut cursor = slot + 1;
    for _ in 0..node.child_count() {
        let (child, next) = json_subtree(state, cursor);
        children.push(child);
        cursor = next;
    }
    let payload = node.payload().map(|payload| {
        serde_json::to_value(payload).unwrap_or_else(|_| json!(format!("{payload:?}")))
    });
    let tree = json!({
        "id": node.id(),
        "kind": node.kind_label(),
        "retain": node.retain_count(),
        "payload": payload,
        "children": children,
    });
    (tree, cursor)
}
