//! Global analysis variants
//!
//! | Kind                 | Graphs                | Precision                      |
//! |----------------------|-----------------------|--------------------------------|
//! | `Flat`               | one, one node         | everything may alias           |
//! | `ContextInsensitive` | one per module        | field-sensitive, no contexts   |
//! | `BottomUp`           | one per SCC           | callee effects per call site   |
//! | `BottomUpTopDown`    | one per SCC           | + caller aliasing, one pass    |
//! | `ContextSensitive`   | one per SCC           | fixpoint, every call site NONE |

use super::bottom_up::{BottomUpAnalysis, BottomUpStats};
use super::context_sensitive::{ContextSensitiveGlobalAnalysis, FixpointStats};
use super::propagation::{mark_external, resolve_in_place, PropagationContext};
use super::top_down::{TopDownAnalysis, TopDownStats};
use crate::config::{AnalysisKind, DsaConfig};
use crate::errors::{DsaError, Result};
use crate::features::dsa::domain::{CallSiteId, Cell, FunctionId, Module, NodeId};
use crate::features::dsa::infrastructure::{
    CallGraphWrapper, CallSiteResolution, Graph, GraphStore, OperationLowering,
};
use crate::features::dsa::ports::{LocalGraphBuilder, ShapeQuery};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Summary of one `run_on_module`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub kind: AnalysisKind,
    /// Functions with a graph
    pub functions: usize,
    /// Distinct graphs
    pub graphs: usize,
    pub live_nodes: usize,
    pub bottom_up: Option<BottomUpStats>,
    pub top_down: Option<TopDownStats>,
    pub fixpoint: Option<FixpointStats>,
    pub duration_ms: f64,
}

/// Graphs and call graph of the non-fixpoint variants
pub struct ModuleGraphs {
    config: DsaConfig,
    store: GraphStore,
    summaries: Option<GraphStore>,
    call_graph: Option<CallGraphWrapper>,
}

impl ModuleGraphs {
    fn new(config: DsaConfig) -> Self {
        Self {
            config,
            store: GraphStore::new(),
            summaries: None,
            call_graph: None,
        }
    }

    fn reset(&mut self, module: &Module) -> CallGraphWrapper {
        self.store = GraphStore::new();
        self.summaries = None;
        CallGraphWrapper::new(module)
    }

    /// One graph for every function with a body; calls unify in place
    fn run_context_insensitive(
        &mut self,
        module: &Module,
        builder: &dyn LocalGraphBuilder,
    ) -> Result<()> {
        let call_graph = self.reset(module);
        let mut graph = Graph::new(self.config.graph);
        let members: Vec<FunctionId> = module
            .functions
            .iter()
            .filter(|f| f.has_body())
            .map(|f| f.id)
            .collect();
        for f in module.functions.iter().filter(|f| f.has_body()) {
            builder.build(module, f, &mut graph)?;
        }

        let ctx = PropagationContext::new(module, &call_graph, &self.config);
        for cs_id in call_graph.call_sites() {
            let Some(cs) = ctx.call_site(*cs_id) else {
                continue;
            };
            if !ctx.function(cs.caller).map_or(false, |f| f.has_body()) {
                continue;
            }
            let callees = ctx.defined_callees(cs);
            for callee in &callees {
                resolve_in_place(&mut graph, cs, callee);
            }
            let complete = call_graph
                .resolution(cs.id)
                .map_or(false, |r| r.fully_resolved && r.callees.len() == callees.len());
            if !complete || callees.is_empty() {
                mark_external(&mut graph, cs);
            }
        }
        graph.compress();
        graph.clear_call_site_cells();
        graph.remove_dead();

        self.store.insert(&members, graph);
        self.call_graph = Some(call_graph);
        Ok(())
    }

    /// Context-insensitive graph with every node merged into one
    /// collapsed node
    fn run_flat(&mut self, module: &Module, builder: &dyn LocalGraphBuilder) -> Result<()> {
        self.run_context_insensitive(module, builder)?;
        for graph in self.store.graphs_mut() {
            flatten(graph);
        }
        Ok(())
    }

    fn run_bottom_up(
        &mut self,
        module: &Module,
        builder: &dyn LocalGraphBuilder,
        top_down: bool,
    ) -> Result<(BottomUpStats, Option<TopDownStats>)> {
        let call_graph = self.reset(module);
        let ctx = PropagationContext::new(module, &call_graph, &self.config);
        let bu = BottomUpAnalysis::new(ctx).run(builder, &mut self.store)?;
        self.summaries = Some(self.store.clone());
        let td = if top_down {
            Some(TopDownAnalysis::new(ctx).run(&mut self.store)?)
        } else {
            None
        };
        for graph in self.store.graphs_mut() {
            graph.clear_call_site_cells();
            graph.remove_dead();
        }
        self.call_graph = Some(call_graph);
        Ok((bu, td))
    }

    fn graph(&self, f: FunctionId) -> Option<&Graph> {
        self.store.graph(f)
    }

    fn summary_graph(&self, f: FunctionId) -> Option<&Graph> {
        self.summaries.as_ref().unwrap_or(&self.store).graph(f)
    }
}

/// Merge every live node of `graph` into one collapsed node
fn flatten(graph: &mut Graph) {
    let ids: Vec<NodeId> = graph.live_nodes().map(|(id, _)| id).collect();
    let Some((&first, rest)) = ids.split_first() else {
        return;
    };
    let mut rep = graph.collapse(first, "flat analysis");
    for id in rest {
        let node = graph.find(Cell::new(*id, 0)).node();
        if node == rep {
            continue;
        }
        let node = graph.collapse(node, "flat analysis");
        graph.unify(Cell::new(rep, 0), Cell::new(node, 0));
        rep = graph.find(Cell::new(rep, 0)).node();
    }
    graph.compress();
}

/// One of the five global analyses
pub enum GlobalAnalysis {
    Flat(ModuleGraphs),
    ContextInsensitive(ModuleGraphs),
    BottomUp(ModuleGraphs),
    BottomUpTopDown(ModuleGraphs),
    ContextSensitive(ContextSensitiveGlobalAnalysis),
}

impl GlobalAnalysis {
    /// Variant selected by `config.kind`
    pub fn new(config: DsaConfig) -> Self {
        match config.kind {
            AnalysisKind::Flat => Self::Flat(ModuleGraphs::new(config)),
            AnalysisKind::ContextInsensitive => Self::ContextInsensitive(ModuleGraphs::new(config)),
            AnalysisKind::BottomUp => Self::BottomUp(ModuleGraphs::new(config)),
            AnalysisKind::BottomUpTopDown => Self::BottomUpTopDown(ModuleGraphs::new(config)),
            AnalysisKind::ContextSensitive => {
                Self::ContextSensitive(ContextSensitiveGlobalAnalysis::new(config))
            }
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            Self::Flat(_) => AnalysisKind::Flat,
            Self::ContextInsensitive(_) => AnalysisKind::ContextInsensitive,
            Self::BottomUp(_) => AnalysisKind::BottomUp,
            Self::BottomUpTopDown(_) => AnalysisKind::BottomUpTopDown,
            Self::ContextSensitive(_) => AnalysisKind::ContextSensitive,
        }
    }

    pub fn config(&self) -> &DsaConfig {
        match self {
            Self::Flat(m) | Self::ContextInsensitive(m) | Self::BottomUp(m) | Self::BottomUpTopDown(m) => {
                &m.config
            }
            Self::ContextSensitive(cs) => cs.config(),
        }
    }

    /// Analyze `module` with the built-in `OperationLowering`
    pub fn run_on_module(&mut self, module: &Module) -> Result<AnalysisStats> {
        self.run_with_builder(module, &OperationLowering)
    }

    /// Analyze `module`, building local graphs with `builder`
    pub fn run_with_builder(
        &mut self,
        module: &Module,
        builder: &dyn LocalGraphBuilder,
    ) -> Result<AnalysisStats> {
        let start = Instant::now();
        let mut stats = AnalysisStats {
            kind: self.kind(),
            functions: 0,
            graphs: 0,
            live_nodes: 0,
            bottom_up: None,
            top_down: None,
            fixpoint: None,
            duration_ms: 0.0,
        };

        match self {
            Self::Flat(m) => m.run_flat(module, builder)?,
            Self::ContextInsensitive(m) => m.run_context_insensitive(module, builder)?,
            Self::BottomUp(m) => {
                stats.bottom_up = Some(m.run_bottom_up(module, builder, false)?.0);
            }
            Self::BottomUpTopDown(m) => {
                let (bu, td) = m.run_bottom_up(module, builder, true)?;
                stats.bottom_up = Some(bu);
                stats.top_down = td;
            }
            Self::ContextSensitive(cs) => {
                let run = cs.run_on_module(module, builder)?;
                stats.bottom_up = Some(run.bottom_up.clone());
                stats.fixpoint = Some(run.fixpoint.clone());
            }
        }

        let store = self.store();
        stats.functions = module.functions.iter().filter(|f| store.contains(f.id)).count();
        stats.graphs = store.len();
        stats.live_nodes = store.graphs().map(Graph::num_live_nodes).sum();
        stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            kind = %stats.kind,
            functions = stats.functions,
            graphs = stats.graphs,
            live_nodes = stats.live_nodes,
            duration_ms = stats.duration_ms,
            "global analysis finished"
        );
        Ok(stats)
    }

    fn store(&self) -> &GraphStore {
        match self {
            Self::Flat(m) | Self::ContextInsensitive(m) | Self::BottomUp(m) | Self::BottomUpTopDown(m) => {
                &m.store
            }
            Self::ContextSensitive(cs) => cs.store(),
        }
    }

    fn call_graph(&self) -> Option<&CallGraphWrapper> {
        match self {
            Self::Flat(m) | Self::ContextInsensitive(m) | Self::BottomUp(m) | Self::BottomUpTopDown(m) => {
                m.call_graph.as_ref()
            }
            Self::ContextSensitive(cs) => cs.call_graph(),
        }
    }

    /// Final graph of `f`
    pub fn graph(&self, f: FunctionId) -> Option<&Graph> {
        match self {
            Self::Flat(m) | Self::ContextInsensitive(m) | Self::BottomUp(m) | Self::BottomUpTopDown(m) => {
                m.graph(f)
            }
            Self::ContextSensitive(cs) => cs.graph(f),
        }
    }

    /// Bottom-up summary of `f`; the final graph for the variants without
    /// a bottom-up pass
    pub fn summary_graph(&self, f: FunctionId) -> Option<&Graph> {
        match self {
            Self::Flat(m) | Self::ContextInsensitive(m) | Self::BottomUp(m) | Self::BottomUpTopDown(m) => {
                m.summary_graph(f)
            }
            Self::ContextSensitive(cs) => cs.summary_graph(f),
        }
    }

    /// Graph of `f`, or `DsaError::UnknownFunction`
    pub fn require_graph(&self, f: FunctionId) -> Result<&Graph> {
        self.graph(f).ok_or(DsaError::UnknownFunction(f))
    }

    /// Matched callees of `cs`
    pub fn call_site_resolution(&self, cs: CallSiteId) -> Option<&CallSiteResolution> {
        self.call_graph()?.resolution(cs)
    }
}

impl ShapeQuery for GlobalAnalysis {
    fn function_graph(&self, f: FunctionId) -> Option<&Graph> {
        self.graph(f)
    }
}
