//! Function → graph ownership
//!
//! Members of one SCC share a single graph. `pair_mut` is the only way to
//! hold a source graph and a destination graph at once; it refuses the
//! same-graph case, so cloning a graph into itself never happens.

use super::graph::Graph;
use crate::features::dsa::domain::FunctionId;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    graphs: Vec<Graph>,
    owner: FxHashMap<FunctionId, usize>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `graph` as the graph of every function in `functions`
    pub fn insert(&mut self, functions: &[FunctionId], mut graph: Graph) -> usize {
        let slot = self.graphs.len();
        for f in functions {
            graph.add_function(*f);
            self.owner.insert(*f, slot);
        }
        self.graphs.push(graph);
        slot
    }

    pub fn graph_id(&self, f: FunctionId) -> Option<usize> {
        self.owner.get(&f).copied()
    }

    pub fn contains(&self, f: FunctionId) -> bool {
        self.owner.contains_key(&f)
    }

    pub fn graph(&self, f: FunctionId) -> Option<&Graph> {
        self.graph_id(f).map(|slot| &self.graphs[slot])
    }

    pub fn graph_mut(&mut self, f: FunctionId) -> Option<&mut Graph> {
        self.graph_id(f).map(move |slot| &mut self.graphs[slot])
    }

    /// Whether `a` and `b` own the same graph
    pub fn same_graph(&self, a: FunctionId, b: FunctionId) -> bool {
        matches!((self.graph_id(a), self.graph_id(b)), (Some(x), Some(y)) if x == y)
    }

    /// Source graph of `from` and destination graph of `to`
    ///
    /// `None` when either is unknown or both share one graph.
    pub fn pair_mut(&mut self, from: FunctionId, to: FunctionId) -> Option<(&Graph, &mut Graph)> {
        let src = self.graph_id(from)?;
        let dst = self.graph_id(to)?;
        if src == dst {
            return None;
        }
        if src < dst {
            let (head, tail) = self.graphs.split_at_mut(dst);
            Some((&head[src], &mut tail[0]))
        } else {
            let (head, tail) = self.graphs.split_at_mut(src);
            Some((&tail[0], &mut head[dst]))
        }
    }

    /// Distinct graphs in registration order
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.iter()
    }

    pub fn graphs_mut(&mut self) -> impl Iterator<Item = &mut Graph> {
        self.graphs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}
