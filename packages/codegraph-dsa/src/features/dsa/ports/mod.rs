//! Ports (interfaces) of the heap-shape analysis
//!
//! - `LocalGraphBuilder`: upstream, turns a function body into its
//!   intraprocedural graph
//! - `ShapeQuery`: downstream, read-only questions over analysis results

use crate::errors::Result;
use crate::features::dsa::domain::{AllocSiteId, Function, FunctionId, Module, ValueId};
use crate::features::dsa::infrastructure::graph::Graph;

/// Builds the intraprocedural graph of one function
///
/// Called once per function with a body, before any interprocedural
/// propagation; members of an SCC are built into the same `graph`.
pub trait LocalGraphBuilder {
    fn build(&self, module: &Module, function: &Function, graph: &mut Graph) -> Result<()>;
}

/// Read-only queries over per-function graphs
///
/// # Example
/// ```ignore
/// fn report<Q: ShapeQuery>(q: &Q, f: FunctionId, a: ValueId, b: ValueId) {
///     if q.may_alias(f, a, b) {
///         println!("{} and {} may alias", a, b);
///     }
/// }
/// ```
pub trait ShapeQuery {
    /// Final graph of `f`
    fn function_graph(&self, f: FunctionId) -> Option<&Graph>;

    /// Whether `a` and `b` may address overlapping memory inside `f`
    fn may_alias(&self, f: FunctionId, a: ValueId, b: ValueId) -> bool {
        let Some(g) = self.function_graph(f) else {
            return false;
        };
        match (g.cell(a), g.cell(b)) {
            (Some(ca), Some(cb)) => {
                let (ea, eb) = (g.effective(ca), g.effective(cb));
                ea.node() == eb.node()
                    && (g.node(ea.node()).is_collapsed() || ea.raw_offset() == eb.raw_offset())
            }
            _ => false,
        }
    }

    /// Allocation sites the memory addressed by `v` may come from
    fn alloc_sites_of(&self, f: FunctionId, v: ValueId) -> Vec<AllocSiteId> {
        self.function_graph(f)
            .and_then(|g| g.cell(v).map(|c| g.node_of(c)))
            .map(|n| n.alloc_sites().iter().map(|s| s.id).collect())
            .unwrap_or_default()
    }
}
