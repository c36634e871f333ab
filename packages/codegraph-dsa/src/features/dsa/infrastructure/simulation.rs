//! Simulation relation between a callee graph and a caller graph
//!
//! The caller simulates the callee at a call site when every callee node
//! has exactly one image (caller node, base offset) and every callee link is
//! matched by a caller link at the corresponding position. Injectivity then
//! tells whether the callee keeps apart what the caller keeps apart.

use super::graph::Graph;
use crate::features::dsa::domain::{CallSite, Cell, Function, NodeId};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::trace;

/// Image of one callee node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeImage {
    pub node: NodeId,
    /// Caller offset of the callee node's offset 0
    pub base: u32,
    callee_size: u32,
    callee_modified: bool,
    /// Collapsed or array image: every byte overlaps every other
    overlaps_all: bool,
}

/// Callee node → caller (node, base) mapping at one call site
#[derive(Debug, Clone, Default)]
pub struct SimulationMapper {
    images: FxHashMap<NodeId, NodeImage>,
    failed: bool,
}

impl SimulationMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `callee_cell` onto `caller_cell` and, recursively, every link
    /// below it. Returns `false` (and poisons the mapper) on the first
    /// inconsistency.
    pub fn insert(
        &mut self,
        callee_cell: Cell,
        caller_cell: Cell,
        callee: &Graph,
        caller: &Graph,
    ) -> bool {
        if self.failed {
            return false;
        }
        let mut work = vec![(callee_cell, caller_cell)];
        while let Some((c1, c2)) = work.pop() {
            let c1 = callee.resolve(c1);
            let c2 = caller.resolve(c2);
            let n1 = callee.node(c1.node());
            let n2 = caller.node(c2.node());

            if n1.is_collapsed() && !n2.is_collapsed() {
                return self.fail("collapsed callee node maps to a field-sensitive caller node");
            }

            let o1 = n1.effective_offset(c1.raw_offset());
            let o2 = n2.effective_offset(c2.raw_offset());
            let base = if n2.is_collapsed() {
                0
            } else if n2.is_array() && n2.size() > 0 {
                let stride = n2.size();
                (o2 + stride - o1 % stride) % stride
            } else if o2 < o1 {
                return self.fail("offsets cannot be aligned");
            } else {
                o2 - o1
            };

            if let Some(existing) = self.images.get(&c1.node()) {
                if existing.node != c2.node() || existing.base != base {
                    return self.fail("callee node maps to two caller positions");
                }
                continue;
            }
            self.images.insert(
                c1.node(),
                NodeImage {
                    node: c2.node(),
                    base,
                    callee_size: n1.size(),
                    callee_modified: n1.is_modified(),
                    overlaps_all: n2.is_collapsed() || n2.is_array(),
                },
            );

            for (field, target) in n1.links() {
                let at = Cell::new(c2.node(), base + field.offset);
                match caller.link(at, field.ty.clone()) {
                    Some(image) => work.push((*target, image)),
                    None => return self.fail("caller lacks a link present in the callee"),
                }
            }
        }
        true
    }

    fn fail(&mut self, reason: &'static str) -> bool {
        trace!(reason, "simulation mapping failed");
        self.failed = true;
        false
    }

    /// No insertion failed
    pub fn is_function(&self) -> bool {
        !self.failed
    }

    /// Caller image of a resolved callee cell
    pub fn get(&self, cell: Cell) -> Option<Cell> {
        self.images
            .get(&cell.node())
            .map(|img| Cell::new(img.node, img.base + cell.raw_offset()))
    }

    pub fn image(&self, node: NodeId) -> Option<&NodeImage> {
        self.images.get(&node)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Callee nodes grouped by caller image, in node order
    fn by_image(&self, only_modified: bool) -> BTreeMap<NodeId, Vec<(NodeId, NodeImage)>> {
        let mut groups: BTreeMap<NodeId, Vec<(NodeId, NodeImage)>> = BTreeMap::new();
        for (callee, img) in &self.images {
            groups.entry(img.node).or_default().push((*callee, *img));
        }
        for members in groups.values_mut() {
            members.sort_by_key(|(n, _)| *n);
        }
        if only_modified {
            groups.retain(|_, members| members.iter().any(|(_, img)| img.callee_modified));
        }
        groups
    }

    /// Some caller node is the image of more than one callee node
    pub fn is_one_to_many(&self, only_modified: bool) -> bool {
        self.by_image(only_modified).values().any(|members| members.len() > 1)
    }

    /// No two distinct callee nodes map onto overlapping bytes of one caller
    /// node. With `only_modified`, a pair counts only when either side is
    /// MODIFIED in the callee.
    pub fn is_injective(&self, only_modified: bool) -> bool {
        for members in self.by_image(only_modified).values() {
            for (i, (_, a)) in members.iter().enumerate() {
                for (_, b) in &members[i + 1..] {
                    if only_modified && !a.callee_modified && !b.callee_modified {
                        continue;
                    }
                    if a.overlaps_all || overlaps(a, b) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn overlaps(a: &NodeImage, b: &NodeImage) -> bool {
    let a_end = a.base + a.callee_size.max(1);
    let b_end = b.base + b.callee_size.max(1);
    a.base < b_end && b.base < a_end
}

/// Build the callee→caller mapping of `cs` for callee `function`
///
/// Inputs: every global of the callee graph, the return cell against the
/// call result, and pointer formals against positional actuals (extra
/// actuals are ignored). Returns `sm.is_function()`.
pub fn compute_callee_caller_mapping(
    cs: &CallSite,
    function: &Function,
    callee: &Graph,
    caller: &Graph,
    sm: &mut SimulationMapper,
) -> bool {
    for (g, cell) in callee.globals() {
        match caller.global_cell(g) {
            Some(image) => {
                if !sm.insert(cell, image, callee, caller) {
                    return false;
                }
            }
            None => return sm.fail("caller lacks a global used by the callee"),
        }
    }

    if let (Some(ret), Some(result)) = (callee.ret_cell(function.id), cs.result) {
        match caller.cell(result) {
            Some(image) => {
                if !sm.insert(ret, image, callee, caller) {
                    return false;
                }
            }
            None => return sm.fail("caller lacks a cell for the call result"),
        }
    }

    for (formal, actual) in function.formals.iter().zip(&cs.actuals) {
        let Some(actual) = actual else { continue };
        if !formal.is_pointer {
            continue;
        }
        let Some(cell) = callee.formal_cell(formal.value) else {
            continue;
        };
        match caller.cell(*actual) {
            Some(image) => {
                if !sm.insert(cell, image, callee, caller) {
                    return false;
                }
            }
            None => return sm.fail("caller lacks a cell for an actual"),
        }
    }
    sm.is_function()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::features::dsa::domain::{NodeFlags, ValueId};

    fn graph() -> Graph {
        Graph::new(GraphConfig::default())
    }

    #[test]
    fn test_isomorphic_graphs_map_injectively() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        callee.mk_link(p, None);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);
        caller.mk_link(a, None);

        let mut sm = SimulationMapper::new();
        assert!(sm.insert(p, a, &callee, &caller));
        assert!(sm.is_function());
        assert_eq!(sm.len(), 2);
        assert!(sm.is_injective(false));
        assert!(!sm.is_one_to_many(false));
        assert_eq!(sm.get(p), Some(a));
    }

    #[test]
    fn test_missing_caller_link_fails() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        callee.mk_link(p.shifted(8), None);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);

        let mut sm = SimulationMapper::new();
        assert!(!sm.insert(p, a, &callee, &caller));
        assert!(!sm.is_function());
    }

    #[test]
    fn test_two_positions_for_one_node_fails() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);
        let b = caller.mk_cell(ValueId(11), None);

        let mut sm = SimulationMapper::new();
        assert!(sm.insert(p, a, &callee, &caller));
        assert!(!sm.insert(p, b, &callee, &caller));
        assert!(!sm.is_function());
    }

    #[test]
    fn test_collapsed_callee_needs_collapsed_image() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        callee.collapse(p.node(), "test");

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);

        let mut sm = SimulationMapper::new();
        assert!(!sm.insert(p, a, &callee, &caller));
    }

    #[test]
    fn test_merged_modified_nodes_are_not_injective() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        let q = callee.mk_cell(ValueId(2), None);
        callee.grow_size(p.node(), 8);
        callee.grow_size(q.node(), 8);
        callee.add_flags(p.node(), NodeFlags::MODIFIED);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);

        let mut sm = SimulationMapper::new();
        assert!(sm.insert(p, a, &callee, &caller));
        assert!(sm.insert(q, a, &callee, &caller));
        assert!(sm.is_function());
        assert!(sm.is_one_to_many(true));
        assert!(!sm.is_injective(true));
        assert!(!sm.is_injective(false));
    }

    #[test]
    fn test_disjoint_fields_stay_injective() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        let q = callee.mk_cell(ValueId(2), None);
        callee.grow_size(p.node(), 8);
        callee.grow_size(q.node(), 8);
        callee.add_flags(q.node(), NodeFlags::MODIFIED);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);
        caller.grow_size(a.node(), 16);

        let mut sm = SimulationMapper::new();
        assert!(sm.insert(p, a, &callee, &caller));
        assert!(sm.insert(q, a.shifted(8), &callee, &caller));
        assert!(sm.is_one_to_many(false));
        assert!(sm.is_injective(false));
    }

    #[test]
    fn test_unmodified_overlap_ignored_when_only_modified() {
        let mut callee = graph();
        let p = callee.mk_cell(ValueId(1), None);
        let q = callee.mk_cell(ValueId(2), None);

        let mut caller = graph();
        let a = caller.mk_cell(ValueId(10), None);

        let mut sm = SimulationMapper::new();
        sm.insert(p, a, &callee, &caller);
        sm.insert(q, a, &callee, &caller);
        assert!(sm.is_injective(true));
        assert!(!sm.is_injective(false));
    }
}
