//! Graph assertions

use codegraph_dsa::features::dsa::domain::{NodeFlags, NodeId, ValueId};
use codegraph_dsa::features::dsa::infrastructure::Graph;

/// Representative node of `v`'s cell
pub fn node_of(g: &Graph, v: ValueId) -> NodeId {
    let cell = g.cell(v).unwrap_or_else(|| panic!("no cell for {v}"));
    g.resolve(cell).node()
}

/// Representative node of the object stored at `v`
pub fn pointee_of(g: &Graph, v: ValueId) -> NodeId {
    let cell = g.cell(v).unwrap_or_else(|| panic!("no cell for {v}"));
    let target = g
        .link(g.resolve(cell), None)
        .unwrap_or_else(|| panic!("{v} has no pointee"));
    g.resolve(target).node()
}

/// Representative node linked from `v`'s cell at `offset`, if any
pub fn pointee_at(g: &Graph, v: ValueId, offset: u32) -> Option<NodeId> {
    let cell = g.cell(v).unwrap_or_else(|| panic!("no cell for {v}"));
    g.link(g.resolve(cell).shifted(offset), None)
        .map(|target| g.resolve(target).node())
}

pub fn assert_same_node(g: &Graph, a: ValueId, b: ValueId) {
    assert_eq!(node_of(g, a), node_of(g, b), "{a} and {b} should share a node");
}

pub fn assert_distinct_nodes(g: &Graph, a: ValueId, b: ValueId) {
    assert_ne!(node_of(g, a), node_of(g, b), "{a} and {b} should not share a node");
}

pub fn assert_flags(g: &Graph, v: ValueId, flags: NodeFlags) {
    let node = g.node(node_of(g, v));
    assert!(
        node.flags().contains(flags),
        "{v}: expected {flags} in {}",
        node.flags()
    );
}

/// No live node forwards, and every root resolves to a live node
pub fn assert_compressed(g: &Graph) {
    for (id, node) in g.live_nodes() {
        assert!(!node.is_forwarding(), "{id:?} still forwards");
    }
    for (root, cell) in g.roots() {
        assert!(g.has_node(cell.node()), "{root:?} points at a deleted node");
    }
}
