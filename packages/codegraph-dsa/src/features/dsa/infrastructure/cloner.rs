//! Subgraph copying between graphs
//!
//! A `Cloner` lives for one propagation step between a fixed source and
//! destination graph. Every source node it touches is copied at most once;
//! the node→node memo is filled before a node's links are visited, so cyclic
//! structures terminate. Copies start fresh in the destination, callers
//! unify them with existing structure afterwards.

use super::graph::{Graph, Root};
use crate::config::CloningPolicy;
use crate::features::dsa::domain::{
    AllocSite, CallStep, Cell, Direction, FunctionId, NodeFlags, NodeId,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-step cloning behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Drop stack allocation sites unless the clone is forced
    pub strip_allocas: bool,
    /// Append `step` to the call path of every copied allocation site
    pub track_call_paths: bool,
    /// Tag every produced node FOREIGN
    pub mark_foreign: bool,
    pub step: Option<CallStep>,
}

impl CloneOptions {
    /// Callee summary into a caller
    pub fn bottom_up(policy: &CloningPolicy, callee: FunctionId) -> Self {
        Self {
            strip_allocas: policy.strip_allocas,
            track_call_paths: policy.track_call_paths,
            mark_foreign: false,
            step: Some(CallStep {
                direction: Direction::BottomUp,
                function: callee,
            }),
        }
    }

    /// Caller context into a callee
    pub fn top_down(policy: &CloningPolicy, caller: FunctionId) -> Self {
        Self {
            strip_allocas: policy.no_escape,
            track_call_paths: policy.track_call_paths,
            mark_foreign: true,
            step: Some(CallStep {
                direction: Direction::TopDown,
                function: caller,
            }),
        }
    }
}

/// Copies nodes reachable from chosen source cells into a destination graph
pub struct Cloner<'a> {
    source: &'a Graph,
    dest: &'a mut Graph,
    options: CloneOptions,
    memo: FxHashMap<NodeId, NodeId>,
    forced: FxHashSet<NodeId>,
}

impl<'a> Cloner<'a> {
    pub fn new(source: &'a Graph, dest: &'a mut Graph, options: CloneOptions) -> Self {
        Self {
            source,
            dest,
            options,
            memo: FxHashMap::default(),
            forced: FxHashSet::default(),
        }
    }

    pub fn source(&self) -> &Graph {
        self.source
    }

    /// Destination graph, for unifying clones with existing cells
    pub fn dest(&mut self) -> &mut Graph {
        self.dest
    }

    /// Whether `node` of the source graph was already copied
    pub fn has_node(&self, node: NodeId) -> bool {
        self.memo.contains_key(&self.source.resolve(Cell::new(node, 0)).node())
    }

    /// Image of a source cell in the destination graph
    pub fn clone_cell(&mut self, cell: Cell, force: bool) -> Cell {
        let c = self.source.resolve(cell);
        let memo = self.clone_into_memo(c.node(), force);
        self.dest.find(Cell::new(memo, c.raw_offset()))
    }

    /// Image of offset 0 of a source node; cloning the same node twice
    /// yields the same destination cell
    ///
    /// The copy may since have been unified into a destination node at a
    /// non-zero offset, so the image is a cell and not a bare node.
    pub fn clone_node(&mut self, node: NodeId, force: bool) -> Cell {
        let memo = self.clone_into_memo(node, force);
        self.dest.find(Cell::new(memo, 0))
    }

    /// Memoized destination id of a source node, copying it on first use.
    /// The id may be forwarding; resolve it together with the offset.
    fn clone_into_memo(&mut self, node: NodeId, force: bool) -> NodeId {
        let src = self.source.resolve(Cell::new(node, 0)).node();

        if let Some(&existing) = self.memo.get(&src) {
            if force && self.options.strip_allocas && self.forced.insert(src) {
                let sites = self.sites_to_copy(src, true);
                self.add_sites(existing, sites);
            }
            return existing;
        }
        if force {
            self.forced.insert(src);
        }

        let source = self.source;
        let root = self.copy_node(src, force);
        let mut stack = vec![src];
        while let Some(s) = stack.pop() {
            let copy = self.memo[&s];
            for (field, target) in &source.node(s).links {
                let t = source.resolve(*target);
                let target_copy = match self.memo.get(&t.node()) {
                    Some(&c) => c,
                    None => {
                        stack.push(t.node());
                        self.copy_node(t.node(), false)
                    }
                };
                self.dest.add_link(
                    Cell::new(copy, field.offset),
                    field.ty.clone(),
                    Cell::new(target_copy, t.raw_offset()),
                );
            }
        }
        root
    }

    /// Fresh destination node carrying the attributes of `src`; memoized
    fn copy_node(&mut self, src: NodeId, force: bool) -> NodeId {
        let source = self.source;
        let n = source.node(src);
        let mut flags = n.flags;
        if self.options.mark_foreign {
            flags.insert(NodeFlags::FOREIGN);
        } else {
            flags.remove(NodeFlags::FOREIGN);
        }
        // Unique scalars name source-function values and are not copied
        let copy = self.dest.create_node_with(flags, n.size);
        self.dest.node_mut(copy).types = n.types.clone();
        let sites = self.sites_to_copy(src, force);
        self.add_sites(copy, sites);
        self.memo.insert(src, copy);
        copy
    }

    fn sites_to_copy(&self, src: NodeId, force: bool) -> Vec<(AllocSite, Vec<CallStep>)> {
        let n = self.source.node(src);
        n.alloc_sites
            .iter()
            .filter(|site| force || !self.options.strip_allocas || !site.is_stack())
            .map(|site| {
                let mut path = n.call_path(site.id).cloned().unwrap_or_default();
                if self.options.track_call_paths {
                    path.extend(self.options.step);
                }
                (*site, path)
            })
            .collect()
    }

    fn add_sites(&mut self, node: NodeId, sites: Vec<(AllocSite, Vec<CallStep>)>) {
        let node = self.dest.find(Cell::new(node, 0)).node();
        let track = self.options.track_call_paths;
        let dst = self.dest.node_mut(node);
        for (site, path) in sites {
            dst.alloc_sites.insert(site);
            if track {
                dst.call_paths.entry(site.id).or_insert(path);
            }
        }
    }
}

impl Graph {
    /// Copy every scalar and global cell of `other` (and its formal and
    /// return cells when `with_formals`), unifying with existing cells for
    /// the same values
    pub fn import(&mut self, other: &Graph, with_formals: bool) {
        let mut cloner = Cloner::new(other, self, CloneOptions::default());
        let roots = other.roots();
        for (root, cell) in roots {
            let copy = match root {
                Root::Global(_) => cloner.clone_cell(cell, true),
                Root::Scalar(_) => cloner.clone_cell(cell, false),
                Root::Formal(_) | Root::Return(_) if with_formals => cloner.clone_cell(cell, false),
                Root::Formal(_) | Root::Return(_) => continue,
            };
            cloner.dest().mk_root_cell(root, Some(copy));
        }
        for f in other.functions() {
            self.add_function(*f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::features::dsa::domain::{AllocKind, AllocSiteId, GlobalId, ValueId};

    fn graph() -> Graph {
        Graph::new(GraphConfig::default())
    }

    fn heap_cycle(g: &mut Graph) -> Cell {
        let head = g.mk_cell(ValueId(1), None);
        g.add_alloc_site(head.node(), AllocSite::new(AllocSiteId(1), AllocKind::Heap));
        let next = g.mk_link(head.shifted(8), None);
        g.add_link(next.shifted(8), None, head);
        head
    }

    #[test]
    fn test_clone_twice_returns_same_node() {
        let mut src = graph();
        let head = heap_cycle(&mut src);
        let mut dst = graph();

        let mut cloner = Cloner::new(&src, &mut dst, CloneOptions::default());
        let a = cloner.clone_node(head.node(), false);
        let b = cloner.clone_node(head.node(), false);
        assert_eq!(a, b);
        assert_eq!(a.raw_offset(), 0);
        assert_eq!(dst.num_live_nodes(), 2);
    }

    #[test]
    fn test_clone_preserves_cycle() {
        let mut src = graph();
        let head = heap_cycle(&mut src);
        let mut dst = graph();

        let copy = Cloner::new(&src, &mut dst, CloneOptions::default()).clone_cell(head, false);
        let next = dst.link(copy.shifted(8), None).unwrap();
        assert_eq!(dst.link(next.shifted(8), None), Some(copy));
        let site = AllocSite::new(AllocSiteId(1), AllocKind::Heap);
        assert!(dst.node_of(copy).alloc_sites().contains(&site));
    }

    #[test]
    fn test_strip_allocas_unless_forced() {
        let mut src = graph();
        let a = src.mk_cell(ValueId(1), None);
        src.add_alloc_site(a.node(), AllocSite::new(AllocSiteId(7), AllocKind::Stack));
        let options = CloneOptions {
            strip_allocas: true,
            ..CloneOptions::default()
        };

        let mut dst = graph();
        let mut cloner = Cloner::new(&src, &mut dst, options);
        let copy = cloner.clone_node(a.node(), false);
        assert!(cloner.dest().node(copy.node()).alloc_sites().is_empty());

        // Forcing an already copied node restores what was stripped
        let again = cloner.clone_node(a.node(), true);
        assert_eq!(copy, again);
        assert_eq!(dst.node(copy.node()).alloc_sites().len(), 1);
    }

    #[test]
    fn test_mark_foreign_and_call_paths() {
        let mut src = graph();
        let a = src.mk_cell(ValueId(1), None);
        src.add_alloc_site(a.node(), AllocSite::new(AllocSiteId(3), AllocKind::Heap));
        let options = CloneOptions::top_down(
            &CloningPolicy {
                track_call_paths: true,
                ..CloningPolicy::default()
            },
            FunctionId(9),
        );

        let mut dst = graph();
        let copy = Cloner::new(&src, &mut dst, options).clone_node(a.node(), false);
        let node = dst.node(copy.node());
        assert!(node.is_foreign());
        assert_eq!(
            node.call_path(AllocSiteId(3)),
            Some(&vec![CallStep {
                direction: Direction::TopDown,
                function: FunctionId(9)
            }])
        );
    }

    #[test]
    fn test_clone_keeps_offset_of_unified_copy() {
        let mut src = graph();
        let p = src.mk_cell(ValueId(1), None);
        src.grow_size(p.node(), 8);

        let mut dst = graph();
        let outer = dst.create_node_with(NodeFlags::empty(), 16);
        let mut cloner = Cloner::new(&src, &mut dst, CloneOptions::default());
        let copy = cloner.clone_cell(p, false);
        cloner.dest().unify(Cell::new(outer, 8), copy);

        // The copy now forwards into `outer` at 8; later images must too
        let at_zero = cloner.clone_cell(p, false);
        let at_four = cloner.clone_cell(p.shifted(4), false);
        let node = cloner.clone_node(p.node(), false);
        assert_eq!(at_zero, Cell::new(outer, 8));
        assert_eq!(at_four, Cell::new(outer, 12));
        assert_eq!(node, Cell::new(outer, 8));
    }

    #[test]
    fn test_import_unifies_by_value() {
        let mut a = graph();
        let p = a.mk_cell(ValueId(1), None);
        a.mk_link(p, None);
        a.mk_global_cell(GlobalId(0));

        let mut b = graph();
        let q = b.mk_cell(ValueId(1), None);
        let g = b.mk_global_cell(GlobalId(0));
        b.add_link(q, None, g);

        a.import(&b, false);
        let p = a.cell(ValueId(1)).unwrap();
        assert_eq!(a.link(p, None), a.global_cell(GlobalId(0)));
    }
}
