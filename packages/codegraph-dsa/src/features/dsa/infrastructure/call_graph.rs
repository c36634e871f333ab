//! Call graph with SCCs and a use/def index of call sites
//!
//! Edges go caller → callee, one per (call site, matched callee). Tarjan's
//! algorithm yields SCCs in reverse topological order of that graph, i.e.
//! callees before callers, which is the bottom-up processing order.
//!
//! - uses(f): call sites that may call `f`
//! - defs(f): call sites located inside `f`
//!
//! It also keeps the position of every function and call site in the module
//! so that passes look them up by id in constant time.

use crate::features::dsa::domain::{
    CallSite, CallSiteId, CallTarget, Function, FunctionId, Module,
};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Downstream view of how one call site was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteResolution {
    pub call_site: CallSiteId,
    pub caller: FunctionId,
    /// Candidates defined or declared in the module whose signature fits
    pub callees: Vec<FunctionId>,
    /// Whether `callees` is known to be exhaustive
    pub fully_resolved: bool,
}

/// Call graph over a module
#[derive(Debug, Clone)]
pub struct CallGraphWrapper {
    graph: DiGraph<FunctionId, CallSiteId>,
    /// FunctionId → graph node index
    index: FxHashMap<FunctionId, NodeIndex>,
    uses: FxHashMap<FunctionId, Vec<CallSiteId>>,
    defs: FxHashMap<FunctionId, Vec<CallSiteId>>,
    /// SCCs, callees first; members sorted by name
    sccs: Vec<Vec<FunctionId>>,
    scc_of: FxHashMap<FunctionId, usize>,
    resolutions: BTreeMap<CallSiteId, CallSiteResolution>,
    /// Call sites in stable (caller name, callee name, id) order
    order: Vec<CallSiteId>,
    /// Position in `Module::functions`
    function_pos: FxHashMap<FunctionId, usize>,
    /// Position in `Module::call_sites`
    call_site_pos: FxHashMap<CallSiteId, usize>,
}

impl CallGraphWrapper {
    pub fn new(module: &Module) -> Self {
        let functions = module.function_index();
        let mut graph = DiGraph::new();
        let mut index = FxHashMap::default();
        for f in &module.functions {
            index.insert(f.id, graph.add_node(f.id));
        }

        let mut uses: FxHashMap<FunctionId, Vec<CallSiteId>> = FxHashMap::default();
        let mut defs: FxHashMap<FunctionId, Vec<CallSiteId>> = FxHashMap::default();
        let mut resolutions = BTreeMap::new();
        let mut order = Vec::with_capacity(module.call_sites.len());

        for cs in module.sorted_call_sites() {
            let callees: Vec<FunctionId> = cs
                .callees()
                .iter()
                .copied()
                .filter(|c| functions.get(c).map_or(false, |f| signature_fits(cs, f)))
                .collect();

            defs.entry(cs.caller).or_default().push(cs.id);
            for callee in &callees {
                uses.entry(*callee).or_default().push(cs.id);
                if let (Some(&from), Some(&to)) = (index.get(&cs.caller), index.get(callee)) {
                    graph.add_edge(from, to, cs.id);
                }
            }
            resolutions.insert(
                cs.id,
                CallSiteResolution {
                    call_site: cs.id,
                    caller: cs.caller,
                    callees,
                    fully_resolved: cs.is_fully_resolved(),
                },
            );
            order.push(cs.id);
        }

        let mut sccs: Vec<Vec<FunctionId>> = tarjan_scc(&graph)
            .into_iter()
            .map(|component| component.into_iter().map(|n| graph[n]).collect())
            .collect();
        for members in &mut sccs {
            members.sort_by(|a, b| {
                module
                    .function_name(*a)
                    .cmp(module.function_name(*b))
                    .then(a.cmp(b))
            });
        }
        let scc_of = sccs
            .iter()
            .enumerate()
            .flat_map(|(i, members)| members.iter().map(move |f| (*f, i)))
            .collect();

        Self {
            graph,
            index,
            uses,
            defs,
            sccs,
            scc_of,
            resolutions,
            order,
            function_pos: module
                .functions
                .iter()
                .enumerate()
                .map(|(i, f)| (f.id, i))
                .collect(),
            call_site_pos: module
                .call_sites
                .iter()
                .enumerate()
                .map(|(i, cs)| (cs.id, i))
                .collect(),
        }
    }

    /// `module.function(id)` through the position index; `module` must be
    /// the module this call graph was built from
    pub fn function<'m>(&self, module: &'m Module, id: FunctionId) -> Option<&'m Function> {
        self.function_pos
            .get(&id)
            .and_then(|&i| module.functions.get(i))
            .filter(|f| f.id == id)
    }

    /// `module.call_site(id)` through the position index
    pub fn call_site<'m>(&self, module: &'m Module, id: CallSiteId) -> Option<&'m CallSite> {
        self.call_site_pos
            .get(&id)
            .and_then(|&i| module.call_sites.get(i))
            .filter(|cs| cs.id == id)
    }

    /// SCCs, callees before callers
    pub fn sccs(&self) -> &[Vec<FunctionId>] {
        &self.sccs
    }

    /// SCCs, callers before callees
    pub fn sccs_top_down(&self) -> impl Iterator<Item = &Vec<FunctionId>> {
        self.sccs.iter().rev()
    }

    /// Index of the SCC containing `f`
    pub fn scc_of(&self, f: FunctionId) -> Option<usize> {
        self.scc_of.get(&f).copied()
    }

    pub fn same_scc(&self, a: FunctionId, b: FunctionId) -> bool {
        matches!((self.scc_of(a), self.scc_of(b)), (Some(x), Some(y)) if x == y)
    }

    /// Whether `f` is part of a call cycle (including self-recursion)
    pub fn is_recursive(&self, f: FunctionId) -> bool {
        let Some(scc) = self.scc_of(f) else {
            return false;
        };
        if self.sccs[scc].len() > 1 {
            return true;
        }
        self.index
            .get(&f)
            .map_or(false, |&n| self.graph.contains_edge(n, n))
    }

    /// Call sites that may call `f`
    pub fn uses(&self, f: FunctionId) -> &[CallSiteId] {
        self.uses.get(&f).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Call sites inside `f`
    pub fn defs(&self, f: FunctionId) -> &[CallSiteId] {
        self.defs.get(&f).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolution(&self, cs: CallSiteId) -> Option<&CallSiteResolution> {
        self.resolutions.get(&cs)
    }

    pub fn resolutions(&self) -> impl Iterator<Item = &CallSiteResolution> {
        self.resolutions.values()
    }

    /// Every call site in stable order
    pub fn call_sites(&self) -> &[CallSiteId] {
        &self.order
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Whether an (indirect-call) candidate can receive the call's actuals
fn signature_fits(cs: &CallSite, f: &Function) -> bool {
    match &cs.target {
        CallTarget::Direct { .. } => true,
        _ if f.is_variadic => cs.actuals.len() >= f.formals.len(),
        _ => cs.actuals.len() == f.formals.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dsa::domain::{AllocKind, ModuleBuilder};

    #[test]
    fn test_sccs_are_callees_first() {
        let mut mb = ModuleBuilder::new("m");
        let (main, _) = mb.function("main", &[], false);
        let (leaf, _) = mb.function("leaf", &[], false);
        let (mid, _) = mb.function("mid", &[], false);
        mb.call(main, mid, &[]);
        mb.call(mid, leaf, &[]);
        let module = mb.build();

        let cg = CallGraphWrapper::new(&module);
        let order: Vec<FunctionId> = cg.sccs().iter().map(|scc| scc[0]).collect();
        assert_eq!(order, vec![leaf, mid, main]);
        let top_down: Vec<FunctionId> = cg.sccs_top_down().map(|scc| scc[0]).collect();
        assert_eq!(top_down, vec![main, mid, leaf]);
    }

    #[test]
    fn test_mutual_recursion_shares_scc() {
        let mut mb = ModuleBuilder::new("m");
        let (even, _) = mb.function("even", &[], false);
        let (odd, _) = mb.function("odd", &[], false);
        let (main, _) = mb.function("main", &[], false);
        mb.call(even, odd, &[]);
        mb.call(odd, even, &[]);
        mb.call(main, even, &[]);
        let module = mb.build();

        let cg = CallGraphWrapper::new(&module);
        assert!(cg.same_scc(even, odd));
        assert!(!cg.same_scc(main, even));
        assert!(cg.is_recursive(even));
        assert!(!cg.is_recursive(main));
    }

    #[test]
    fn test_uses_and_defs() {
        let mut mb = ModuleBuilder::new("m");
        let (main, _) = mb.function("main", &[], false);
        let (f, _) = mb.function("f", &[], false);
        let cs1 = mb.call(main, f, &[]);
        let cs2 = mb.call(main, f, &[]);
        let module = mb.build();

        let cg = CallGraphWrapper::new(&module);
        assert_eq!(cg.uses(f), &[cs1, cs2]);
        assert_eq!(cg.defs(main), &[cs1, cs2]);
        assert!(cg.uses(main).is_empty());
        assert_eq!(cg.call_sites(), &[cs1, cs2]);
    }

    #[test]
    fn test_indirect_candidates_filtered_by_arity() {
        let mut mb = ModuleBuilder::new("m");
        let (main, _) = mb.function("main", &[], false);
        let (one, _) = mb.function("one", &[true], false);
        let (two, _) = mb.function("two", &[true, true], false);
        let p = mb.alloc(main, AllocKind::Heap, 8);
        let cs = mb.call_indirect(main, &[one, two], true, &[Some(p)]);
        let module = mb.build();

        let cg = CallGraphWrapper::new(&module);
        let res = cg.resolution(cs).unwrap();
        assert_eq!(res.callees, vec![one]);
        assert!(res.fully_resolved);
    }

    #[test]
    fn test_lookups_by_id_match_module() {
        let mut mb = ModuleBuilder::new("m");
        let (main, _) = mb.function("main", &[], false);
        let ext = mb.declare("ext", &[], false);
        let cs = mb.call(main, ext, &[]);
        let module = mb.build();
        let cg = CallGraphWrapper::new(&module);

        assert_eq!(cg.function(&module, ext), module.function(ext));
        assert_eq!(cg.call_site(&module, cs), module.call_site(cs));
        assert_eq!(cg.function(&module, FunctionId(99)), None);

        // Positions from another module never yield the wrong function
        let mut other = module.clone();
        other.functions.reverse();
        assert_eq!(cg.function(&other, main), None);
    }
}
