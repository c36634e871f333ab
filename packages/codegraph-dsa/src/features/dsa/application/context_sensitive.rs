//! Context-sensitive global analysis
//!
//! Bottom-up summaries are refined per call site until every caller
//! simulates each of its callees injectively:
//!
//! ```text
//! decide_propagation(cs, callee)
//!   mapping not a function  -> UP    (bottom-up step, re-enqueue caller)
//!   mapping not injective   -> DOWN  (top-down step, re-enqueue callee)
//!   otherwise               -> NONE
//! ```
//!
//! Decisions never mutate; steps only ever merge nodes, so the worklist
//! drains. `FixpointConfig::max_iterations` bounds it regardless.

use super::bottom_up::{BottomUpAnalysis, BottomUpStats};
use super::consistency::{alloc_site_closure, enqueue_dependents, unique_scalar_closure, ClosureStats};
use super::propagation::{bottom_up_step, top_down_step, Propagation, PropagationContext};
use crate::config::DsaConfig;
use crate::errors::{DsaError, Result};
use crate::features::dsa::domain::{CallSite, CallSiteId, FunctionId, Module};
use crate::features::dsa::infrastructure::{CallGraphWrapper, DependencyWorklist, Graph, GraphStore};
use crate::features::dsa::ports::LocalGraphBuilder;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

/// Main-loop statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixpointStats {
    /// Call sites initially needing propagation
    pub seeded: usize,
    pub items_processed: usize,
    pub down_steps: usize,
    pub up_steps: usize,
    pub duration_ms: f64,
}

impl FixpointStats {
    pub fn steps(&self) -> usize {
        self.down_steps + self.up_steps
    }
}

/// Statistics of one `run_on_module`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSensitiveStats {
    pub bottom_up: BottomUpStats,
    pub fixpoint: FixpointStats,
    pub unique_scalars: Option<ClosureStats>,
    pub alloc_sites: Option<ClosureStats>,
    pub dead_nodes_removed: usize,
}

pub struct ContextSensitiveGlobalAnalysis {
    config: DsaConfig,
    store: GraphStore,
    summaries: GraphStore,
    call_graph: Option<CallGraphWrapper>,
    stats: ContextSensitiveStats,
}

impl ContextSensitiveGlobalAnalysis {
    pub fn new(config: DsaConfig) -> Self {
        Self {
            config,
            store: GraphStore::new(),
            summaries: GraphStore::new(),
            call_graph: None,
            stats: ContextSensitiveStats::default(),
        }
    }

    pub fn config(&self) -> &DsaConfig {
        &self.config
    }

    /// Run the whole pipeline on `module`, replacing any previous result
    pub fn run_on_module(
        &mut self,
        module: &Module,
        builder: &dyn LocalGraphBuilder,
    ) -> Result<&ContextSensitiveStats> {
        let start = Instant::now();
        self.store = GraphStore::new();
        self.stats = ContextSensitiveStats::default();
        let call_graph = CallGraphWrapper::new(module);

        {
            let ctx = PropagationContext::new(module, &call_graph, &self.config);
            self.stats.bottom_up = BottomUpAnalysis::new(ctx).run(builder, &mut self.store)?;
        }
        self.summaries = self.store.clone();
        self.call_graph = Some(call_graph);

        self.stats.fixpoint = self.propagate_to_fixpoint(module)?;

        let Some(call_graph) = self.call_graph.as_ref() else {
            return Err(DsaError::analysis("call graph missing after fixpoint"));
        };
        let ctx = PropagationContext::new(module, call_graph, &self.config);
        if self.config.fixpoint.unique_scalar_closure {
            self.stats.unique_scalars = Some(unique_scalar_closure(&ctx, &mut self.store)?);
        }
        if self.config.fixpoint.alloc_site_closure {
            self.stats.alloc_sites = Some(alloc_site_closure(&ctx, &mut self.store)?);
        }
        if self.config.fixpoint.check_postcondition {
            check_stable(&ctx, &self.store)?;
        }

        for graph in self.store.graphs_mut() {
            graph.clear_call_site_cells();
            self.stats.dead_nodes_removed += graph.remove_dead();
        }

        info!(
            functions = self.stats.bottom_up.functions,
            steps = self.stats.fixpoint.steps(),
            dead = self.stats.dead_nodes_removed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "context-sensitive analysis finished"
        );
        Ok(&self.stats)
    }

    /// Drive every call site to `Propagation::None`
    ///
    /// Requires `run_on_module` to have built the call graph. On a module
    /// that is already stable nothing is seeded and no step runs.
    pub fn propagate_to_fixpoint(&mut self, module: &Module) -> Result<FixpointStats> {
        let Some(call_graph) = self.call_graph.as_ref() else {
            return Err(DsaError::analysis("no call graph: run_on_module first"));
        };
        let ctx = PropagationContext::new(module, call_graph, &self.config);
        run_fixpoint(&ctx, &mut self.store)
    }

    /// Strongest propagation `cs` still needs over its defined callees
    pub fn decide_propagation(&self, module: &Module, cs: CallSiteId) -> Propagation {
        let Some(call_graph) = self.call_graph.as_ref() else {
            return Propagation::None;
        };
        let ctx = PropagationContext::new(module, call_graph, &self.config);
        match ctx.call_site(cs) {
            Some(cs) => pending(&ctx, &self.store, cs),
            None => Propagation::None,
        }
    }

    /// Final graph of `f`
    pub fn graph(&self, f: FunctionId) -> Option<&Graph> {
        self.store.graph(f)
    }

    /// Bottom-up summary of `f`, as it was before the fixpoint
    pub fn summary_graph(&self, f: FunctionId) -> Option<&Graph> {
        self.summaries.graph(f)
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn call_graph(&self) -> Option<&CallGraphWrapper> {
        self.call_graph.as_ref()
    }

    pub fn stats(&self) -> &ContextSensitiveStats {
        &self.stats
    }
}

/// First non-`None` decision over the defined callees of `cs`
fn pending(ctx: &PropagationContext<'_>, store: &GraphStore, cs: &CallSite) -> Propagation {
    if !ctx.is_propagatable(cs) {
        return Propagation::None;
    }
    ctx.defined_callees(cs)
        .into_iter()
        .map(|callee| ctx.decide_propagation(store, cs, callee))
        .find(|p| *p != Propagation::None)
        .unwrap_or(Propagation::None)
}

fn run_fixpoint(ctx: &PropagationContext<'_>, store: &mut GraphStore) -> Result<FixpointStats> {
    let start = Instant::now();
    let mut stats = FixpointStats::default();
    let mut worklist = DependencyWorklist::new();

    for cs_id in ctx.call_graph.call_sites() {
        let Some(cs) = ctx.call_site(*cs_id) else {
            continue;
        };
        if pending(ctx, store, cs) != Propagation::None {
            worklist.push(*cs_id);
        }
    }
    stats.seeded = worklist.len();

    let (mut down, mut up) = (0, 0);
    stats.items_processed =
        worklist.run_to_fixpoint(ctx.config.fixpoint.max_iterations, |cs_id, wl| {
            let Some(cs) = ctx.call_site(cs_id) else {
                return Ok(());
            };
            if !ctx.is_propagatable(cs) {
                return Ok(());
            }
            for callee in ctx.defined_callees(cs) {
                let decision = ctx.decide_propagation(store, cs, callee);
                debug!(call_site = %cs.id, callee = %callee.name, %decision, "call site decided");
                match decision {
                    Propagation::None => {}
                    Propagation::Down => {
                        if top_down_step(store, ctx.config, cs, callee).is_some() {
                            down += 1;
                            enqueue_dependents(ctx, wl, callee.id);
                        }
                    }
                    Propagation::Up => {
                        if bottom_up_step(store, ctx.config, cs, callee) {
                            up += 1;
                            enqueue_dependents(ctx, wl, cs.caller);
                        }
                    }
                }
            }
            Ok(())
        })?;
    stats.down_steps = down;
    stats.up_steps = up;
    stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    info!(
        seeded = stats.seeded,
        processed = stats.items_processed,
        down = stats.down_steps,
        up = stats.up_steps,
        duration_ms = stats.duration_ms,
        "propagation fixpoint reached"
    );
    Ok(stats)
}

/// Fail with `DsaError::Unstable` on the first call site that still needs
/// propagation, logging both graphs involved
fn check_stable(ctx: &PropagationContext<'_>, store: &GraphStore) -> Result<()> {
    for cs_id in ctx.call_graph.call_sites() {
        let Some(cs) = ctx.call_site(*cs_id) else {
            continue;
        };
        let state = pending(ctx, store, cs);
        if state == Propagation::None {
            continue;
        }
        let dump = |f: FunctionId| {
            store
                .graph(f)
                .and_then(|g| serde_json::to_string(&g.snapshot()).ok())
                .unwrap_or_default()
        };
        let callees: Vec<String> = ctx
            .defined_callees(cs)
            .iter()
            .map(|callee| dump(callee.id))
            .collect();
        error!(
            call_site = %cs.id,
            %state,
            caller = %dump(cs.caller),
            callees = ?callees,
            "call site not stable after propagation"
        );
        return Err(DsaError::Unstable {
            call_site: cs.id,
            state: state.to_string(),
        });
    }
    Ok(())
}
