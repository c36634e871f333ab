//! Single-call-site propagation steps shared by every pass
//!
//! - `bottom_up_step`: clone the callee summary into the caller
//! - `top_down_step`: clone the caller context into the callee
//! - `resolve_in_place`: both ends share one graph (same SCC, or a
//!   context-insensitive graph)
//! - `mark_external`: the callee is unknown or has no body

use crate::config::DsaConfig;
use crate::features::dsa::domain::{
    CallSite, CallSiteId, Cell, Function, FunctionId, Module, NodeFlags,
};
use crate::features::dsa::infrastructure::{
    compute_callee_caller_mapping, CallGraphWrapper, CallSiteCells, CloneOptions, Cloner, Graph,
    GraphStore, SimulationMapper,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Propagation still required at a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Caller simulates callee injectively
    None,
    /// Callee must learn caller aliasing (top-down)
    Down,
    /// Caller must learn callee effects (bottom-up)
    Up,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Propagation::None => "NONE",
            Propagation::Down => "DOWN",
            Propagation::Up => "UP",
        };
        f.write_str(s)
    }
}

/// Read-only inputs of a propagation pass
#[derive(Clone, Copy)]
pub struct PropagationContext<'a> {
    pub module: &'a Module,
    pub call_graph: &'a CallGraphWrapper,
    pub config: &'a DsaConfig,
}

impl<'a> PropagationContext<'a> {
    pub fn new(module: &'a Module, call_graph: &'a CallGraphWrapper, config: &'a DsaConfig) -> Self {
        Self {
            module,
            call_graph,
            config,
        }
    }

    /// Function of the module by id
    pub fn function(&self, id: FunctionId) -> Option<&'a Function> {
        self.call_graph.function(self.module, id)
    }

    /// Call site of the module by id
    pub fn call_site(&self, id: CallSiteId) -> Option<&'a CallSite> {
        self.call_graph.call_site(self.module, id)
    }

    /// Callees of `cs` that have a body, in resolution order
    pub fn defined_callees(&self, cs: &CallSite) -> Vec<&'a Function> {
        self.call_graph
            .resolution(cs.id)
            .map(|res| {
                res.callees
                    .iter()
                    .filter_map(|f| self.function(*f))
                    .filter(|f| f.has_body())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the fixpoint considers `cs` at all: inline assembly and
    /// incomplete indirect calls are never propagated through
    pub fn is_propagatable(&self, cs: &CallSite) -> bool {
        self.call_graph
            .resolution(cs.id)
            .map_or(false, |res| res.fully_resolved && !res.callees.is_empty())
    }

    /// Decide what `cs` still needs for `callee`, without mutating
    /// anything. Same-graph callees always decide `None`.
    pub fn decide_propagation(
        &self,
        store: &GraphStore,
        cs: &CallSite,
        callee: &Function,
    ) -> Propagation {
        if store.same_graph(cs.caller, callee.id) {
            return Propagation::None;
        }
        let (Some(caller_g), Some(callee_g)) = (store.graph(cs.caller), store.graph(callee.id))
        else {
            return Propagation::None;
        };
        let mut sm = SimulationMapper::new();
        if !compute_callee_caller_mapping(cs, callee, callee_g, caller_g, &mut sm) {
            Propagation::Up
        } else if !sm.is_injective(self.config.fixpoint.only_modified_injectivity) {
            Propagation::Down
        } else {
            Propagation::None
        }
    }
}

/// Cells of `cs` in the caller graph, created on demand
fn call_site_cells(graph: &mut Graph, cs: &CallSite) -> CallSiteCells {
    CallSiteCells {
        actuals: cs
            .actuals
            .iter()
            .map(|a| a.map(|v| graph.value_cell(v)))
            .collect(),
        result: cs.result.map(|r| graph.value_cell(r)),
    }
}

/// Copy the summary of `callee` into the caller of `cs` and bind it to the
/// call's globals, result and actuals. Returns `false` when both share a
/// graph or either graph is missing.
pub fn bottom_up_step(
    store: &mut GraphStore,
    config: &DsaConfig,
    cs: &CallSite,
    callee: &Function,
) -> bool {
    let Some((callee_g, caller_g)) = store.pair_mut(callee.id, cs.caller) else {
        return false;
    };
    debug!(call_site = %cs.id, callee = %callee.name, "bottom-up step");

    let cells = call_site_cells(caller_g, cs);
    caller_g.record_call_site(cs.id, cells.clone());

    let mut cloner = Cloner::new(callee_g, caller_g, CloneOptions::bottom_up(&config.cloning, callee.id));
    for (g, cell) in callee_g.globals() {
        let copy = cloner.clone_cell(cell, true);
        let own = cloner.dest().mk_global_cell(g);
        cloner.dest().unify(own, copy);
    }
    if let (Some(ret), Some(result)) = (callee_g.ret_cell(callee.id), cells.result) {
        let copy = cloner.clone_cell(ret, false);
        cloner.dest().unify(result, copy);
    }
    for (formal, actual) in callee.formals.iter().zip(&cells.actuals) {
        let (true, Some(actual)) = (formal.is_pointer, actual) else {
            continue;
        };
        if let Some(fc) = callee_g.formal_cell(formal.value) {
            let copy = cloner.clone_cell(fc, false);
            cloner.dest().unify(*actual, copy);
        }
    }
    caller_g.compress();
    true
}

/// Copy the calling context of `cs` into `callee` (nodes marked FOREIGN)
/// and bind it to the callee's globals, return and formals.
///
/// Returns the number of pruned foreign nodes, or `None` when both share a
/// graph or either graph is missing.
pub fn top_down_step(
    store: &mut GraphStore,
    config: &DsaConfig,
    cs: &CallSite,
    callee: &Function,
) -> Option<usize> {
    let (caller_g, callee_g) = store.pair_mut(cs.caller, callee.id)?;
    debug!(call_site = %cs.id, callee = %callee.name, "top-down step");
    let policy = &config.cloning;

    let mut cloner = Cloner::new(caller_g, callee_g, CloneOptions::top_down(policy, cs.caller));
    for (g, cell) in caller_g.globals() {
        if policy.skip_unused_globals && cloner.dest().global_cell(g).is_none() {
            continue;
        }
        let copy = cloner.clone_cell(cell, true);
        let own = cloner.dest().mk_global_cell(g);
        cloner.dest().unify(own, copy);
    }
    if callee.returns_pointer {
        if let Some(result) = cs.result.and_then(|r| caller_g.cell(r)) {
            let copy = cloner.clone_cell(result, false);
            let own = cloner.dest().mk_ret_cell(callee.id);
            cloner.dest().unify(own, copy);
        }
    }
    for (formal, actual) in callee.formals.iter().zip(&cs.actuals) {
        let (true, Some(actual)) = (formal.is_pointer, actual) else {
            continue;
        };
        if let Some(ac) = caller_g.cell(*actual) {
            let copy = cloner.clone_cell(ac, false);
            let own = cloner.dest().mk_formal_cell(formal.value);
            cloner.dest().unify(own, copy);
        }
    }

    let pruned = if policy.prune_foreign {
        callee_g.prune_foreign()
    } else {
        callee_g.compress();
        0
    };
    Some(pruned)
}

/// Bind formals/actuals and return/result of `cs` inside one shared graph
pub fn resolve_in_place(graph: &mut Graph, cs: &CallSite, callee: &Function) {
    debug!(call_site = %cs.id, callee = %callee.name, "resolving call in place");
    let cells = call_site_cells(graph, cs);
    if let (true, Some(result)) = (callee.returns_pointer, cells.result) {
        let ret = graph.mk_ret_cell(callee.id);
        graph.unify(ret, result);
    }
    for (formal, actual) in callee.formals.iter().zip(&cells.actuals) {
        let (true, Some(actual)) = (formal.is_pointer, actual) else {
            continue;
        };
        let fc = graph.mk_formal_cell(formal.value);
        graph.unify(fc, *actual);
    }
}

/// Flag everything reachable from the actuals and result of `cs` as
/// EXTERNAL and INCOMPLETE
pub fn mark_external(graph: &mut Graph, cs: &CallSite) {
    let cells = call_site_cells(graph, cs);
    let starts: Vec<Cell> = cells.actuals.iter().flatten().copied().chain(cells.result).collect();
    let reachable = graph.reachable_from(starts.iter().map(|c| c.node()));
    for node in reachable {
        graph.add_flags(node, NodeFlags::EXTERNAL | NodeFlags::INCOMPLETE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dsa::application::BottomUpAnalysis;
    use crate::features::dsa::domain::{AllocKind, ModuleBuilder};
    use crate::features::dsa::infrastructure::OperationLowering;

    #[test]
    fn test_top_down_binds_only_globals_the_callee_names() {
        for (skip, expected) in [(true, false), (false, true)] {
            let mut b = ModuleBuilder::new("globals");
            let global = b.global("G", 8);
            let (read, formals) = b.function("read", &[true], false);
            b.load(read, formals[0]);
            let (main, _) = b.function("main", &[], false);
            b.global_addr(main, global);
            let x = b.alloc(main, AllocKind::Heap, 8);
            let cs = b.call(main, read, &[Some(x)]);
            let module = b.build();

            let config = DsaConfig::default().cloning(|c| c.skip_unused_globals = skip);
            let call_graph = CallGraphWrapper::new(&module);
            let ctx = PropagationContext::new(&module, &call_graph, &config);
            let mut store = GraphStore::new();
            BottomUpAnalysis::new(ctx)
                .run(&OperationLowering, &mut store)
                .unwrap();

            let (cs, callee) = (ctx.call_site(cs).unwrap(), ctx.function(read).unwrap());
            assert!(top_down_step(&mut store, &config, cs, callee).is_some());
            let g = store.graph(read).unwrap();
            assert_eq!(g.global_cell(global).is_some(), expected, "skip_unused_globals = {skip}");
            assert!(g.formal_cell(formals[0]).is_some());
        }
    }
}
