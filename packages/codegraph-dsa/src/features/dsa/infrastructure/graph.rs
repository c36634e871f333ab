//! Per-procedure (or per-SCC) abstract memory graph
//!
//! Nodes live in an arena indexed by `NodeId`. A merged-away node keeps its
//! slot with a forwarding cell until `compress()` rewrites every stored cell
//! to its representative and frees the slot. Freed slots are reused by later
//! node creation, so ids of deleted nodes must not be held across
//! `compress`, `remove_dead` or `prune_foreign`.
//!
//! # Roots
//! Program values name cells through four maps: scalars, formals, return
//! slots (per function) and globals. Everything reachable from a root (or
//! from a transient call-site cell) is live; `remove_dead()` drops the rest.
//!
//! # Unification
//! The merge algebra (`unify`, `collapse`, `set_array`, link insertion) is in
//! `unification.rs`.

use crate::config::GraphConfig;
use crate::features::dsa::domain::{
    AllocSite, AllocSiteId, CallSiteId, Cell, Field, FunctionId, GlobalId, Node, NodeFlags, NodeId,
    TypeSet, TypeTag, ValueId,
};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ═══════════════════════════════════════════════════════════════════════════
// Roots
// ═══════════════════════════════════════════════════════════════════════════

/// Named entry point into a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "root", content = "id", rename_all = "snake_case")]
pub enum Root {
    Scalar(ValueId),
    Formal(ValueId),
    Return(FunctionId),
    Global(GlobalId),
}

/// Cells recorded for one call site while it is being resolved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteCells {
    /// Positional; `None` for non-pointer actuals
    pub actuals: Vec<Option<Cell>>,
    pub result: Option<Cell>,
}

/// Downstream view of one (node, offset) position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// Stable within one graph state: assigned in (node, offset) order
    pub id: u32,
    pub node: NodeId,
    pub offset: u32,
    pub read: bool,
    pub modified: bool,
    pub alloc_sites: Vec<AllocSiteId>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Graph
// ═══════════════════════════════════════════════════════════════════════════

/// Abstract memory graph
#[derive(Debug, Clone)]
pub struct Graph {
    config: GraphConfig,
    pub(crate) nodes: Vec<Option<Node>>,
    /// Freed slots, reused before the arena grows
    free: Vec<NodeId>,
    pub(crate) scalars: BTreeMap<ValueId, Cell>,
    pub(crate) formals: BTreeMap<ValueId, Cell>,
    pub(crate) returns: BTreeMap<FunctionId, Cell>,
    pub(crate) globals: BTreeMap<GlobalId, Cell>,
    call_sites: BTreeMap<CallSiteId, CallSiteCells>,
    functions: BTreeSet<FunctionId>,
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            free: Vec::new(),
            scalars: BTreeMap::new(),
            formals: BTreeMap::new(),
            returns: BTreeMap::new(),
            globals: BTreeMap::new(),
            call_sites: BTreeMap::new(),
            functions: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Functions whose effects this graph summarizes
    pub fn functions(&self) -> &BTreeSet<FunctionId> {
        &self.functions
    }

    pub fn add_function(&mut self, f: FunctionId) {
        self.functions.insert(f);
    }

    pub fn contains_function(&self, f: FunctionId) -> bool {
        self.functions.contains(&f)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Arena
    // ───────────────────────────────────────────────────────────────────────

    /// Fresh empty node
    pub fn create_node(&mut self) -> NodeId {
        self.create_node_with(NodeFlags::empty(), 0)
    }

    pub fn create_node_with(&mut self, flags: NodeFlags, size: u32) -> NodeId {
        let node = Node {
            flags,
            size,
            ..Node::default()
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            return id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    /// Node by id; panics on a deleted node
    pub fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("access to deleted node {}", id),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("access to deleted node {}", id),
        }
    }

    /// Whether `id` still has a slot (live or forwarding)
    pub fn has_node(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    /// Live (non-forwarding) nodes in id order
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .filter(|n| !n.is_forwarding())
                .map(|n| (NodeId(i as u32), n))
        })
    }

    pub fn num_live_nodes(&self) -> usize {
        self.live_nodes().count()
    }

    /// Occupied arena slots, forwarding nodes included
    pub fn num_slots(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Resolution
    // ───────────────────────────────────────────────────────────────────────

    /// Live representative of `cell`, offsets summed along the chain
    pub fn resolve(&self, cell: Cell) -> Cell {
        let mut node = cell.node();
        let mut offset = cell.raw_offset();
        while let Some(fwd) = self.node(node).forward {
            node = fwd.node();
            offset += fwd.raw_offset();
        }
        Cell::new(node, offset)
    }

    /// `resolve` with path compression
    pub fn find(&mut self, cell: Cell) -> Cell {
        let mut chain = Vec::new();
        let mut node = cell.node();
        let mut acc = 0;
        while let Some(fwd) = self.node(node).forward {
            chain.push((node, acc));
            acc += fwd.raw_offset();
            node = fwd.node();
        }
        // Every visited node now forwards straight to the representative
        if chain.len() > 1 {
            for (visited, before) in chain {
                self.node_mut(visited).forward = Some(Cell::new(node, acc - before));
            }
        }
        Cell::new(node, cell.raw_offset() + acc)
    }

    /// Resolved cell with its effective offset
    pub fn effective(&self, cell: Cell) -> Cell {
        let c = self.resolve(cell);
        Cell::new(c.node(), self.node(c.node()).effective_offset(c.raw_offset()))
    }

    /// Representative node of `cell`
    pub fn node_of(&self, cell: Cell) -> &Node {
        self.node(self.resolve(cell).node())
    }

    // ───────────────────────────────────────────────────────────────────────
    // Root maps
    // ───────────────────────────────────────────────────────────────────────

    /// Resolved cell bound to `root`
    pub fn root_cell(&self, root: Root) -> Option<Cell> {
        self.root_slot(root).map(|c| self.resolve(c))
    }

    fn root_slot(&self, root: Root) -> Option<Cell> {
        match root {
            Root::Scalar(v) => self.scalars.get(&v).copied(),
            Root::Formal(v) => self.formals.get(&v).copied(),
            Root::Return(f) => self.returns.get(&f).copied(),
            Root::Global(g) => self.globals.get(&g).copied(),
        }
    }

    fn bind_root(&mut self, root: Root, cell: Cell) {
        match root {
            Root::Scalar(v) => {
                self.scalars.insert(v, cell);
            }
            Root::Formal(v) => {
                self.formals.insert(v, cell);
            }
            Root::Return(f) => {
                self.returns.insert(f, cell);
            }
            Root::Global(g) => {
                self.globals.insert(g, cell);
            }
        }
    }

    /// Cell of `root`, created (or unified with `init`) on demand
    pub fn mk_root_cell(&mut self, root: Root, init: Option<Cell>) -> Cell {
        let cell = match (self.root_slot(root), init) {
            (Some(existing), Some(init)) => {
                self.unify(existing, init);
                self.find(existing)
            }
            (Some(existing), None) => self.find(existing),
            (None, init) => {
                let cell = match init {
                    Some(c) => self.find(c),
                    None => Cell::new(self.create_node(), 0),
                };
                self.bind_root(root, cell);
                cell
            }
        };
        if let Root::Scalar(v) | Root::Formal(v) = root {
            self.note_unique_scalar(v, cell);
        }
        cell
    }

    fn note_unique_scalar(&mut self, v: ValueId, cell: Cell) {
        let node = self.node_mut(cell.node());
        if node.effective_offset(cell.raw_offset()) == 0 {
            node.unique_scalar.record(v);
        } else {
            node.unique_scalar.clear();
        }
    }

    /// Cell of scalar `v`, unified with `init` when given
    pub fn mk_cell(&mut self, v: ValueId, init: Option<Cell>) -> Cell {
        self.mk_root_cell(Root::Scalar(v), init)
    }

    pub fn mk_formal_cell(&mut self, v: ValueId) -> Cell {
        self.mk_root_cell(Root::Formal(v), None)
    }

    pub fn mk_ret_cell(&mut self, f: FunctionId) -> Cell {
        self.mk_root_cell(Root::Return(f), None)
    }

    pub fn mk_global_cell(&mut self, g: GlobalId) -> Cell {
        self.mk_root_cell(Root::Global(g), None)
    }

    /// Cell of a value, looked up among scalars then formals
    pub fn cell(&self, v: ValueId) -> Option<Cell> {
        self.root_cell(Root::Scalar(v))
            .or_else(|| self.root_cell(Root::Formal(v)))
    }

    pub fn has_cell(&self, v: ValueId) -> bool {
        self.scalars.contains_key(&v) || self.formals.contains_key(&v)
    }

    /// Value cell, created as a scalar when unknown
    pub(crate) fn value_cell(&mut self, v: ValueId) -> Cell {
        match self.formals.get(&v).copied() {
            Some(c) => self.find(c),
            None => self.mk_cell(v, None),
        }
    }

    pub fn formal_cell(&self, v: ValueId) -> Option<Cell> {
        self.root_cell(Root::Formal(v))
    }

    pub fn ret_cell(&self, f: FunctionId) -> Option<Cell> {
        self.root_cell(Root::Return(f))
    }

    pub fn global_cell(&self, g: GlobalId) -> Option<Cell> {
        self.root_cell(Root::Global(g))
    }

    pub fn scalars(&self) -> impl Iterator<Item = (ValueId, Cell)> + '_ {
        self.scalars.iter().map(|(v, c)| (*v, self.resolve(*c)))
    }

    pub fn formals(&self) -> impl Iterator<Item = (ValueId, Cell)> + '_ {
        self.formals.iter().map(|(v, c)| (*v, self.resolve(*c)))
    }

    pub fn returns(&self) -> impl Iterator<Item = (FunctionId, Cell)> + '_ {
        self.returns.iter().map(|(f, c)| (*f, self.resolve(*c)))
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, Cell)> + '_ {
        self.globals.iter().map(|(g, c)| (*g, self.resolve(*c)))
    }

    /// Every root with its resolved cell, in root order
    pub fn roots(&self) -> Vec<(Root, Cell)> {
        let mut roots = Vec::new();
        roots.extend(self.scalars().map(|(v, c)| (Root::Scalar(v), c)));
        roots.extend(self.formals().map(|(v, c)| (Root::Formal(v), c)));
        roots.extend(self.returns().map(|(f, c)| (Root::Return(f), c)));
        roots.extend(self.globals().map(|(g, c)| (Root::Global(g), c)));
        roots
    }

    // ───────────────────────────────────────────────────────────────────────
    // Call-site cells
    // ───────────────────────────────────────────────────────────────────────

    pub fn record_call_site(&mut self, cs: CallSiteId, cells: CallSiteCells) {
        self.call_sites.insert(cs, cells);
    }

    pub fn call_site_cells(&self, cs: CallSiteId) -> Option<&CallSiteCells> {
        self.call_sites.get(&cs)
    }

    /// Forget transient call-site cells
    pub fn clear_call_site_cells(&mut self) {
        self.call_sites.clear();
    }

    // ───────────────────────────────────────────────────────────────────────
    // Node attributes
    // ───────────────────────────────────────────────────────────────────────

    /// Resolved target of the link at `cell`
    pub fn link(&self, cell: Cell, ty: Option<TypeTag>) -> Option<Cell> {
        let c = self.resolve(cell);
        let node = self.node(c.node());
        let field = node.effective_field(&Field::new(c.raw_offset(), ty, &self.config));
        node.links.get(&field).map(|target| self.resolve(*target))
    }

    /// Target of the link at `cell`, created as a fresh node when absent
    pub fn mk_link(&mut self, cell: Cell, ty: Option<TypeTag>) -> Cell {
        if let Some(target) = self.link(cell, ty.clone()) {
            return target;
        }
        let target = Cell::new(self.create_node(), 0);
        self.add_link(cell, ty, target);
        self.find(target)
    }

    /// Record a type tag at `cell`
    pub fn add_type(&mut self, cell: Cell, tag: TypeTag) {
        self.add_types_at(cell, &TypeSet::single(tag));
    }

    /// Add flags to the representative of `node`
    ///
    /// `ARRAY` and `OFFSET_COLLAPSED` are ignored here; use `set_array` and
    /// `collapse`, which also restructure the node.
    pub fn add_flags(&mut self, node: NodeId, flags: NodeFlags) {
        let rep = self.find(Cell::new(node, 0)).node();
        let flags = flags.difference(NodeFlags::ARRAY | NodeFlags::OFFSET_COLLAPSED);
        self.node_mut(rep).flags.insert(flags);
    }

    /// Grow a plain node to at least `size` bytes
    pub fn grow_size(&mut self, node: NodeId, size: u32) {
        let rep = self.find(Cell::new(node, 0)).node();
        let node = self.node_mut(rep);
        if !node.is_collapsed() && !node.is_array() && node.size < size {
            node.size = size;
        }
    }

    pub fn add_alloc_site(&mut self, node: NodeId, site: AllocSite) {
        let rep = self.find(Cell::new(node, 0)).node();
        self.node_mut(rep).alloc_sites.insert(site);
    }

    /// Force the unique-scalar bookkeeping of a node to "none"
    pub fn clear_unique_scalar(&mut self, node: NodeId) {
        let rep = self.find(Cell::new(node, 0)).node();
        self.node_mut(rep).unique_scalar.clear();
    }

    // ───────────────────────────────────────────────────────────────────────
    // Garbage collection
    // ───────────────────────────────────────────────────────────────────────

    /// Rewrite all stored cells to their representatives and free forwarding
    /// nodes. Idempotent.
    pub fn compress(&mut self) {
        for i in 0..self.nodes.len() {
            let links: Vec<(Field, Cell)> = match &self.nodes[i] {
                Some(node) if !node.is_forwarding() => node
                    .links
                    .iter()
                    .map(|(f, c)| (f.clone(), *c))
                    .collect(),
                _ => continue,
            };
            let resolved: BTreeMap<Field, Cell> = links
                .into_iter()
                .map(|(f, c)| (f, self.resolve(c)))
                .collect();
            if let Some(node) = self.nodes[i].as_mut() {
                node.links = resolved;
            }
        }

        let scalars: Vec<_> = self.scalars().collect();
        self.scalars = scalars.into_iter().collect();
        let formals: Vec<_> = self.formals().collect();
        self.formals = formals.into_iter().collect();
        let returns: Vec<_> = self.returns().collect();
        self.returns = returns.into_iter().collect();
        let globals: Vec<_> = self.globals().collect();
        self.globals = globals.into_iter().collect();

        let call_sites = std::mem::take(&mut self.call_sites);
        self.call_sites = call_sites
            .into_iter()
            .map(|(cs, cells)| {
                let resolved = CallSiteCells {
                    actuals: cells
                        .actuals
                        .iter()
                        .map(|a| a.map(|c| self.resolve(c)))
                        .collect(),
                    result: cells.result.map(|c| self.resolve(c)),
                };
                (cs, resolved)
            })
            .collect();

        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if slot.as_ref().map_or(false, Node::is_forwarding) {
                *slot = None;
                self.free.push(NodeId(i as u32));
            }
        }
    }

    /// Nodes reachable from `starts` through links (graph must be compressed)
    pub(crate) fn reachable_from(&self, starts: impl IntoIterator<Item = NodeId>) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<NodeId> = starts.into_iter().collect();
        while let Some(id) = stack.pop() {
            let id = self.resolve(Cell::new(id, 0)).node();
            if !seen.insert(id) {
                continue;
            }
            for target in self.node(id).links.values() {
                stack.push(target.node());
            }
        }
        seen
    }

    /// Delete nodes unreachable from any root or recorded call-site cell.
    /// Returns the number of nodes freed.
    pub fn remove_dead(&mut self) -> usize {
        self.compress();
        let mut starts: Vec<NodeId> = self.roots().into_iter().map(|(_, c)| c.node()).collect();
        for cells in self.call_sites.values() {
            starts.extend(cells.actuals.iter().flatten().map(|c| c.node()));
            starts.extend(cells.result.map(|c| c.node()));
        }
        let live = self.reachable_from(starts);
        self.retain_nodes(|id| live.contains(&id))
    }

    /// Delete nodes still marked FOREIGN together with links into them.
    /// Returns the number of nodes freed.
    ///
    /// A foreign node bound to a root is kept and loses the flag.
    pub fn prune_foreign(&mut self) -> usize {
        self.compress();
        let rooted: FxHashSet<NodeId> = self.roots().into_iter().map(|(_, c)| c.node()).collect();
        let mut foreign = FxHashSet::default();
        for (id, node) in self.live_nodes() {
            if node.is_foreign() && !rooted.contains(&id) {
                foreign.insert(id);
            }
        }
        for id in &rooted {
            self.node_mut(*id).flags.remove(NodeFlags::FOREIGN);
        }
        if foreign.is_empty() {
            return 0;
        }
        for slot in self.nodes.iter_mut().flatten() {
            slot.links.retain(|_, target| !foreign.contains(&target.node()));
        }
        self.retain_nodes(|id| !foreign.contains(&id))
    }

    fn retain_nodes(&mut self, keep: impl Fn(NodeId) -> bool) -> usize {
        let mut freed = 0;
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_some() && !keep(NodeId(i as u32)) {
                *slot = None;
                self.free.push(NodeId(i as u32));
                freed += 1;
            }
        }
        freed
    }

    // ───────────────────────────────────────────────────────────────────────
    // Downstream views
    // ───────────────────────────────────────────────────────────────────────

    /// One region per live (node, offset) with a type, a link, or offset 0
    pub fn memory_regions(&self) -> Vec<MemoryRegion> {
        let mut regions = Vec::new();
        for (id, node) in self.live_nodes() {
            let mut offsets: BTreeSet<u32> = BTreeSet::from([0]);
            offsets.extend(node.types.keys().copied());
            offsets.extend(node.links.keys().map(|f| f.offset));
            let sites: Vec<AllocSiteId> = node.alloc_sites.iter().map(|s| s.id).collect();
            for offset in offsets {
                regions.push(MemoryRegion {
                    id: regions.len() as u32,
                    node: id,
                    offset,
                    read: node.is_read(),
                    modified: node.is_modified(),
                    alloc_sites: sites.clone(),
                });
            }
        }
        regions
    }

    /// Serializable view of the current state
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            functions: self.functions.iter().copied().collect(),
            nodes: self
                .live_nodes()
                .map(|(id, node)| NodeSnapshot {
                    id,
                    flags: node.flags.to_string(),
                    size: node.size,
                    types: node
                        .types
                        .iter()
                        .map(|(off, ts)| (*off, ts.iter().map(|t| t.to_string()).collect()))
                        .collect(),
                    links: node
                        .links
                        .iter()
                        .map(|(f, c)| (f.to_string(), self.resolve(*c)))
                        .collect(),
                    alloc_sites: node.alloc_sites.iter().copied().collect(),
                })
                .collect(),
            roots: self.roots(),
        }
    }
}

/// Serializable graph state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub functions: Vec<FunctionId>,
    pub nodes: Vec<NodeSnapshot>,
    pub roots: Vec<(Root, Cell)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub flags: String,
    pub size: u32,
    pub types: Vec<(u32, Vec<String>)>,
    pub links: Vec<(String, Cell)>,
    pub alloc_sites: Vec<AllocSite>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(GraphConfig::default())
    }

    #[test]
    fn test_mk_cell_is_stable() {
        let mut g = graph();
        let a = g.mk_cell(ValueId(1), None);
        let b = g.mk_cell(ValueId(1), None);
        assert_eq!(a, b);
        assert_eq!(g.num_live_nodes(), 1);
        assert_eq!(g.node(a.node()).unique_scalar().value(), Some(ValueId(1)));
    }

    #[test]
    fn test_mk_cell_with_init_unifies() {
        let mut g = graph();
        let a = g.mk_cell(ValueId(1), None);
        let b = g.mk_cell(ValueId(2), None);
        let c = g.mk_cell(ValueId(1), Some(b));

        assert_eq!(g.resolve(a), g.resolve(b));
        assert_eq!(c, g.resolve(b));
        // Two values now denote the node
        assert_eq!(g.node_of(a).unique_scalar().value(), None);
    }

    #[test]
    fn test_find_compresses_paths() {
        let mut g = graph();
        let a = g.create_node();
        let b = g.create_node();
        let c = g.create_node();
        g.node_mut(a).forward = Some(Cell::new(b, 4));
        g.node_mut(b).forward = Some(Cell::new(c, 8));

        let resolved = g.find(Cell::new(a, 2));
        assert_eq!(resolved, Cell::new(c, 14));
        assert_eq!(g.node(a).forward(), Some(Cell::new(c, 12)));
        assert_eq!(g.node(b).forward(), Some(Cell::new(c, 8)));
        // Idempotent
        assert_eq!(g.find(Cell::new(a, 2)), resolved);
        assert_eq!(g.resolve(Cell::new(a, 2)), resolved);
    }

    #[test]
    fn test_mk_link_creates_once_and_grows() {
        let mut g = graph();
        let base = g.mk_cell(ValueId(1), None);
        let t1 = g.mk_link(base.shifted(8), None);
        let t2 = g.mk_link(base.shifted(8), None);
        assert_eq!(t1, t2);
        assert_eq!(g.node_of(base).size(), 16);
        assert_eq!(g.link(base.shifted(8), None), Some(t1));
        assert_eq!(g.link(base, None), None);
    }

    #[test]
    fn test_remove_dead_keeps_reachable() {
        let mut g = graph();
        let root = g.mk_cell(ValueId(1), None);
        let pointee = g.mk_link(root, None);
        let orphan = g.create_node();

        let freed = g.remove_dead();
        assert_eq!(freed, 1);
        assert!(g.has_node(root.node()));
        assert!(g.has_node(pointee.node()));
        assert!(!g.has_node(orphan));
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut g = graph();
        let a = g.mk_cell(ValueId(1), None);
        let b = g.mk_cell(ValueId(2), None);
        g.unify(a, b);
        g.compress();
        let arena = g.nodes.len();
        assert_eq!(g.num_slots(), 1);

        let fresh = g.create_node();
        assert_eq!(g.nodes.len(), arena);
        assert_eq!(g.num_slots(), 2);
        assert!(g.node(fresh).links.is_empty());
        assert_ne!(g.resolve(g.cell(ValueId(1)).unwrap()).node(), fresh);
    }

    #[test]
    fn test_remove_dead_keeps_call_site_cells() {
        let mut g = graph();
        let n = g.create_node();
        g.record_call_site(
            CallSiteId(0),
            CallSiteCells {
                actuals: vec![Some(Cell::new(n, 0))],
                result: None,
            },
        );
        assert_eq!(g.remove_dead(), 0);
        g.clear_call_site_cells();
        assert_eq!(g.remove_dead(), 1);
    }

    #[test]
    fn test_prune_foreign_drops_links() {
        let mut g = graph();
        let root = g.mk_cell(ValueId(1), None);
        let local = g.mk_link(root, None);
        let foreign = g.mk_link(local.shifted(8), None);
        g.add_flags(foreign.node(), NodeFlags::FOREIGN);

        assert_eq!(g.prune_foreign(), 1);
        assert_eq!(g.link(local.shifted(8), None), None);
        assert!(g.has_node(local.node()));
    }

    #[test]
    fn test_prune_foreign_keeps_rooted_nodes() {
        let mut g = graph();
        let root = g.mk_formal_cell(ValueId(1));
        g.add_flags(root.node(), NodeFlags::FOREIGN);

        assert_eq!(g.prune_foreign(), 0);
        assert!(!g.node_of(root).is_foreign());
    }

    #[test]
    fn test_memory_regions_are_dense() {
        let mut g = graph();
        let root = g.mk_cell(ValueId(1), None);
        g.mk_link(root.shifted(8), None);
        g.add_flags(root.node(), NodeFlags::MODIFIED);

        let regions = g.memory_regions();
        let ids: Vec<u32> = regions.iter().map(|r| r.id).collect();
        assert_eq!(ids, (0..regions.len() as u32).collect::<Vec<_>>());
        let root_regions: Vec<_> = regions.iter().filter(|r| r.node == root.node()).collect();
        assert_eq!(root_regions.len(), 2);
        assert!(root_regions.iter().all(|r| r.modified && !r.read));
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut g = graph();
        let root = g.mk_cell(ValueId(1), None);
        g.mk_link(root, None);
        let json = serde_json::to_string(&g.snapshot()).unwrap();
        let back: GraphSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.roots.len(), 1);
    }
}
