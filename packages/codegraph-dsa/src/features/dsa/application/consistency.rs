//! Caller/callee consistency closures
//!
//! After the main fixpoint, two per-node properties are made to agree
//! across every call boundary through the simulation mapping:
//!
//! - unique scalar: when the two sides disagree on the value (one names
//!   another value, or already lost its own), both end up cleared
//! - allocation sites: each side receives the other's sites (by id),
//!   except stack sites that the cloning policy keeps local
//!
//! Both closures run on the same dependency worklist as the main loop: a
//! change in a function's graph re-enqueues the call sites that use or are
//! defined in that function.

use super::propagation::PropagationContext;
use crate::errors::Result;
use crate::features::dsa::domain::{AllocSite, CallSite, CallSiteId, Function, FunctionId, NodeId};
use crate::features::dsa::infrastructure::{
    compute_callee_caller_mapping, DependencyWorklist, GraphStore, SimulationMapper,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Outcome of one closure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureStats {
    /// Worklist items processed
    pub iterations: usize,
    /// Node updates applied (clears or added sites)
    pub changes: usize,
}

/// Changes applied to each side of one call boundary
#[derive(Debug, Clone, Copy, Default)]
struct Reconciled {
    caller: usize,
    callee: usize,
}

fn run_closure<F>(
    ctx: &PropagationContext<'_>,
    store: &mut GraphStore,
    mut reconcile: F,
) -> Result<ClosureStats>
where
    F: FnMut(&mut GraphStore, &CallSite, &Function) -> Reconciled,
{
    let mut worklist = DependencyWorklist::new();
    worklist.extend(ctx.call_graph.call_sites().iter().copied());
    let mut changes = 0;

    let iterations = worklist.run_to_fixpoint(ctx.config.fixpoint.max_iterations, |cs_id, wl| {
        let Some(cs) = ctx.call_site(cs_id) else {
            return Ok(());
        };
        if !ctx.is_propagatable(cs) {
            return Ok(());
        }
        for callee in ctx.defined_callees(cs) {
            if store.same_graph(cs.caller, callee.id) {
                continue;
            }
            let done = reconcile(store, cs, callee);
            if done.caller > 0 {
                enqueue_dependents(ctx, wl, cs.caller);
            }
            if done.callee > 0 {
                enqueue_dependents(ctx, wl, callee.id);
            }
            changes += done.caller + done.callee;
        }
        Ok(())
    })?;

    Ok(ClosureStats {
        iterations,
        changes,
    })
}

/// Call sites affected by a change in `f`'s graph
pub(crate) fn enqueue_dependents(
    ctx: &PropagationContext<'_>,
    worklist: &mut DependencyWorklist<CallSiteId>,
    f: FunctionId,
) {
    worklist.extend(ctx.call_graph.uses(f).iter().copied());
    worklist.extend(ctx.call_graph.defs(f).iter().copied());
}

/// Mapping of `cs` for `callee`, when it is a function
fn mapping(store: &GraphStore, cs: &CallSite, callee: &Function) -> Option<SimulationMapper> {
    let caller_g = store.graph(cs.caller)?;
    let callee_g = store.graph(callee.id)?;
    let mut sm = SimulationMapper::new();
    compute_callee_caller_mapping(cs, callee, callee_g, caller_g, &mut sm).then_some(sm)
}

/// Clear unique scalars on both sides of a call boundary wherever caller
/// and callee disagree
///
/// Nodes that never had a unique scalar make no claim and are skipped.
pub fn unique_scalar_closure(
    ctx: &PropagationContext<'_>,
    store: &mut GraphStore,
) -> Result<ClosureStats> {
    let stats = run_closure(ctx, store, |store, cs, callee| {
        let Some(sm) = mapping(store, cs, callee) else {
            return Reconciled::default();
        };
        let (Some(caller_g), Some(callee_g)) = (store.graph(cs.caller), store.graph(callee.id))
        else {
            return Reconciled::default();
        };

        let mut clear_caller: BTreeSet<NodeId> = BTreeSet::new();
        let mut clear_callee: BTreeSet<NodeId> = BTreeSet::new();
        for (id, node) in callee_g.live_nodes() {
            let Some(image) = sm.image(id) else {
                continue;
            };
            let ours = node.unique_scalar();
            let theirs = caller_g.node(image.node).unique_scalar();
            if !ours.ever_had() || !theirs.ever_had() {
                continue;
            }
            if ours.value() == theirs.value() {
                continue;
            }
            if ours.value().is_some() {
                clear_callee.insert(id);
            }
            if theirs.value().is_some() {
                clear_caller.insert(image.node);
            }
        }

        let done = Reconciled {
            caller: clear_caller.len(),
            callee: clear_callee.len(),
        };
        if let Some(g) = store.graph_mut(cs.caller) {
            for n in clear_caller {
                g.clear_unique_scalar(n);
            }
        }
        if let Some(g) = store.graph_mut(callee.id) {
            for n in clear_callee {
                g.clear_unique_scalar(n);
            }
        }
        done
    })?;
    debug!(iterations = stats.iterations, cleared = stats.changes, "unique-scalar closure done");
    Ok(stats)
}

/// Union allocation sites across every call boundary
///
/// Callee stack sites do not flow up under `strip_allocas`; caller stack
/// sites do not flow down under `no_escape`.
pub fn alloc_site_closure(
    ctx: &PropagationContext<'_>,
    store: &mut GraphStore,
) -> Result<ClosureStats> {
    let policy = ctx.config.cloning;
    let stats = run_closure(ctx, store, |store, cs, callee| {
        let Some(sm) = mapping(store, cs, callee) else {
            return Reconciled::default();
        };
        let (Some(caller_g), Some(callee_g)) = (store.graph(cs.caller), store.graph(callee.id))
        else {
            return Reconciled::default();
        };

        let mut up: Vec<(NodeId, AllocSite)> = Vec::new();
        let mut down: Vec<(NodeId, AllocSite)> = Vec::new();
        for (id, node) in callee_g.live_nodes() {
            let Some(image) = sm.image(id) else {
                continue;
            };
            let theirs = caller_g.node(image.node).alloc_sites();
            let has = |sites: &BTreeSet<AllocSite>, site: &AllocSite| {
                sites.iter().any(|s| s.id == site.id)
            };
            for site in node.alloc_sites() {
                if !(policy.strip_allocas && site.is_stack()) && !has(theirs, site) {
                    up.push((image.node, *site));
                }
            }
            for site in theirs {
                if !(policy.no_escape && site.is_stack()) && !has(node.alloc_sites(), site) {
                    down.push((id, *site));
                }
            }
        }

        let done = Reconciled {
            caller: up.len(),
            callee: down.len(),
        };
        if let Some(g) = store.graph_mut(cs.caller) {
            for (n, site) in up {
                g.add_alloc_site(n, site);
            }
        }
        if let Some(g) = store.graph_mut(callee.id) {
            for (n, site) in down {
                g.add_alloc_site(n, site);
            }
        }
        done
    })?;
    debug!(iterations = stats.iterations, added = stats.changes, "allocation-site closure done");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DsaConfig;
    use crate::features::dsa::application::BottomUpAnalysis;
    use crate::features::dsa::domain::{AllocKind, Module, ModuleBuilder, ValueId};
    use crate::features::dsa::infrastructure::{CallGraphWrapper, OperationLowering};

    /// `read(p)` loads through `p`; `main` passes it a fresh object `x`
    fn pass_fresh(kind: AllocKind) -> (Module, FunctionId, FunctionId, ValueId, ValueId) {
        let mut b = ModuleBuilder::new("pass_fresh");
        let (read, formals) = b.function("read", &[true], false);
        b.load(read, formals[0]);
        let (main, _) = b.function("main", &[], false);
        let x = b.alloc(main, kind, 8);
        b.call(main, read, &[Some(x)]);
        (b.build(), read, main, formals[0], x)
    }

    fn summarize(module: &Module, config: &DsaConfig) -> (CallGraphWrapper, GraphStore) {
        let call_graph = CallGraphWrapper::new(module);
        let mut store = GraphStore::new();
        let ctx = PropagationContext::new(module, &call_graph, config);
        BottomUpAnalysis::new(ctx)
            .run(&OperationLowering, &mut store)
            .unwrap();
        (call_graph, store)
    }

    fn unique_of(store: &GraphStore, f: FunctionId, v: ValueId) -> Option<ValueId> {
        let g = store.graph(f).unwrap();
        g.node_of(g.cell(v).unwrap()).unique_scalar().value()
    }

    fn sites_of(store: &GraphStore, f: FunctionId, v: ValueId) -> usize {
        let g = store.graph(f).unwrap();
        g.node_of(g.cell(v).unwrap()).alloc_sites().len()
    }

    #[test]
    fn test_disagreeing_unique_scalars_are_cleared_on_both_sides() {
        let (module, read, main, p, x) = pass_fresh(AllocKind::Heap);
        let config = DsaConfig::default();
        let (call_graph, mut store) = summarize(&module, &config);
        let ctx = PropagationContext::new(&module, &call_graph, &config);
        assert_eq!(unique_of(&store, read, p), Some(p));
        assert_eq!(unique_of(&store, main, x), Some(x));

        let stats = unique_scalar_closure(&ctx, &mut store).unwrap();
        assert_eq!(stats.changes, 2);
        assert_eq!(unique_of(&store, read, p), None);
        assert_eq!(unique_of(&store, main, x), None);

        // Cleared values stay cleared and nothing is left to reconcile
        let again = unique_scalar_closure(&ctx, &mut store).unwrap();
        assert_eq!(again.changes, 0);
    }

    #[test]
    fn test_caller_sites_flow_down_unless_kept_local() {
        let cases = [
            (AllocKind::Stack, false, 1),
            (AllocKind::Stack, true, 0),
            (AllocKind::Heap, true, 1),
        ];
        for (kind, no_escape, expected) in cases {
            let (module, read, _, p, _) = pass_fresh(kind);
            let config = DsaConfig::default().cloning(|c| c.no_escape = no_escape);
            let (call_graph, mut store) = summarize(&module, &config);
            let ctx = PropagationContext::new(&module, &call_graph, &config);
            assert_eq!(sites_of(&store, read, p), 0);

            let stats = alloc_site_closure(&ctx, &mut store).unwrap();
            assert_eq!(stats.changes, expected, "{kind:?}, no_escape = {no_escape}");
            assert_eq!(sites_of(&store, read, p), expected);
        }
    }

    #[test]
    fn test_callee_stack_sites_stay_local_under_strip_allocas() {
        let mut b = ModuleBuilder::new("fill");
        let (fill, formals) = b.function("fill", &[true], false);
        let slot = b.alloc(fill, AllocKind::Stack, 8);
        b.store(fill, formals[0], Some(slot));
        let (main, _) = b.function("main", &[], false);
        let x = b.alloc(main, AllocKind::Heap, 8);
        b.call(main, fill, &[Some(x)]);
        let loaded = b.load(main, x);
        let module = b.build();

        let config = DsaConfig::default();
        let (call_graph, mut store) = summarize(&module, &config);
        let ctx = PropagationContext::new(&module, &call_graph, &config);
        alloc_site_closure(&ctx, &mut store).unwrap();

        // The caller's heap site went down, the callee's stack site did not go up
        assert_eq!(sites_of(&store, main, loaded), 0);
        assert_eq!(sites_of(&store, fill, formals[0]), 1);
        assert_eq!(sites_of(&store, fill, slot), 1);

        let keep = DsaConfig::default().cloning(|c| c.strip_allocas = false);
        let (_, store) = summarize(&module, &keep);
        assert_eq!(sites_of(&store, main, loaded), 1);
    }
}
