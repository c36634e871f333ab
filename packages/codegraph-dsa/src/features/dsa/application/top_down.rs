//! Top-down pass
//!
//! SCCs are visited callers first. Each call site inside an SCC pushes the
//! caller's context (the structure reachable from actuals, result and
//! globals) into every callee outside the SCC. Whatever a callee cannot
//! relate to its own structure stays FOREIGN and is pruned per
//! `CloningPolicy::prune_foreign`.

use super::propagation::{top_down_step, PropagationContext};
use crate::errors::Result;
use crate::features::dsa::infrastructure::GraphStore;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Top-down statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDownStats {
    pub sccs: usize,
    pub call_sites_propagated: usize,
    pub nodes_pruned: usize,
    pub duration_ms: f64,
}

pub struct TopDownAnalysis<'a> {
    ctx: PropagationContext<'a>,
}

impl<'a> TopDownAnalysis<'a> {
    pub fn new(ctx: PropagationContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn run(&self, store: &mut GraphStore) -> Result<TopDownStats> {
        let start = Instant::now();
        let mut stats = TopDownStats::default();

        for scc in self.ctx.call_graph.sccs_top_down() {
            let mut visited = false;
            for f in scc {
                for cs_id in self.ctx.call_graph.defs(*f) {
                    let Some(cs) = self.ctx.call_site(*cs_id) else {
                        continue;
                    };
                    if !self.ctx.is_propagatable(cs) {
                        continue;
                    }
                    for callee in self.ctx.defined_callees(cs) {
                        if let Some(pruned) = top_down_step(store, self.ctx.config, cs, callee) {
                            stats.call_sites_propagated += 1;
                            stats.nodes_pruned += pruned;
                            visited = true;
                        }
                    }
                }
            }
            if visited {
                stats.sccs += 1;
            }
        }

        stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            sccs = stats.sccs,
            propagated = stats.call_sites_propagated,
            pruned = stats.nodes_pruned,
            duration_ms = stats.duration_ms,
            "top-down pass finished"
        );
        Ok(stats)
    }
}
