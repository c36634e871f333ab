//! Bottom-up pass
//!
//! SCCs are visited callees first. Each SCC gets one graph holding the
//! local graphs of all its members; every call site inside the SCC is then
//! resolved against its callees' (already final) summaries, or in place for
//! calls within the SCC.

use super::propagation::{bottom_up_step, mark_external, resolve_in_place, PropagationContext};
use crate::errors::Result;
use crate::features::dsa::domain::{CallSite, FunctionId};
use crate::features::dsa::infrastructure::{Graph, GraphStore};
use crate::features::dsa::ports::LocalGraphBuilder;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Bottom-up statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BottomUpStats {
    pub sccs: usize,
    pub functions: usize,
    pub call_sites_resolved: usize,
    pub in_place: usize,
    pub external_calls: usize,
    pub duration_ms: f64,
}

pub struct BottomUpAnalysis<'a> {
    ctx: PropagationContext<'a>,
}

impl<'a> BottomUpAnalysis<'a> {
    pub fn new(ctx: PropagationContext<'a>) -> Self {
        Self { ctx }
    }

    /// Build and summarize every function with a body into `store`
    pub fn run(
        &self,
        builder: &dyn LocalGraphBuilder,
        store: &mut GraphStore,
    ) -> Result<BottomUpStats> {
        let start = Instant::now();
        let mut stats = BottomUpStats::default();
        let module = self.ctx.module;

        for scc in self.ctx.call_graph.sccs() {
            let members: Vec<FunctionId> = scc
                .iter()
                .copied()
                .filter(|f| self.ctx.function(*f).map_or(false, |func| func.has_body()))
                .collect();
            if members.is_empty() {
                continue;
            }

            let mut graph = Graph::new(self.ctx.config.graph);
            for f in &members {
                if let Some(func) = self.ctx.function(*f) {
                    builder.build(module, func, &mut graph)?;
                }
            }
            store.insert(&members, graph);
            stats.sccs += 1;
            stats.functions += members.len();

            for f in &members {
                for cs_id in self.ctx.call_graph.defs(*f) {
                    if let Some(cs) = self.ctx.call_site(*cs_id) {
                        self.resolve(store, cs, &mut stats);
                    }
                }
            }
            if let Some(g) = store.graph_mut(members[0]) {
                g.compress();
            }
        }

        stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            sccs = stats.sccs,
            functions = stats.functions,
            resolved = stats.call_sites_resolved,
            in_place = stats.in_place,
            external = stats.external_calls,
            duration_ms = stats.duration_ms,
            "bottom-up pass finished"
        );
        Ok(stats)
    }

    fn resolve(&self, store: &mut GraphStore, cs: &CallSite, stats: &mut BottomUpStats) {
        let Some(resolution) = self.ctx.call_graph.resolution(cs.id) else {
            return;
        };
        let mut external = !resolution.fully_resolved || resolution.callees.is_empty();
        for callee in resolution.callees.iter().filter_map(|f| self.ctx.function(*f)) {
            if !callee.has_body() {
                external = true;
                continue;
            }
            if store.same_graph(cs.caller, callee.id) {
                if let Some(g) = store.graph_mut(cs.caller) {
                    resolve_in_place(g, cs, callee);
                    stats.in_place += 1;
                }
            } else if bottom_up_step(store, self.ctx.config, cs, callee) {
                stats.call_sites_resolved += 1;
            }
        }
        if external {
            if let Some(g) = store.graph_mut(cs.caller) {
                mark_external(g, cs);
                stats.external_calls += 1;
            }
        }
    }
}
