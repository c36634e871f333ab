//! Intraprocedural graph construction from `Operation` lists
//!
//! Each operation is lowered to graph primitives:
//!
//! | Operation    | Effect                                                    |
//! |--------------|-----------------------------------------------------------|
//! | `Alloc`      | fresh node with storage flag, size and allocation site    |
//! | `Copy`       | `dst` and `src` share a cell                              |
//! | `FieldAddr`  | `dst` is `base` shifted by `offset`                       |
//! | `IndexAddr`  | node of `base` becomes an array of `stride`               |
//! | `Load`       | READ; `dst` is the link at `addr`                         |
//! | `Store`      | MODIFIED; pointer value stored as the link at `addr`      |
//! | `GlobalAddr` | `dst` is the global's cell                                |
//! | `Return`     | return cell unified with the value                        |
//! | `IntToPtr`   | fresh INT_TO_PTR node                                     |
//! | `PtrToInt`   | node of `src` flagged PTR_TO_INT                          |
//!
//! Cells for the actuals and results of the function's call sites are
//! created too, so that interprocedural passes find them.

use super::graph::Graph;
use crate::errors::{DsaError, Result};
use crate::features::dsa::domain::{
    AllocKind, AllocSite, Cell, Function, Module, NodeFlags, Operation, TypeTag,
};
use crate::features::dsa::ports::LocalGraphBuilder;
use tracing::trace;

/// Default `LocalGraphBuilder`
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationLowering;

impl OperationLowering {
    pub fn new() -> Self {
        Self
    }

    fn lower(
        &self,
        module: &Module,
        function: &Function,
        op: &Operation,
        g: &mut Graph,
    ) -> Result<()> {
        match op {
            Operation::Alloc {
                dst,
                site,
                kind,
                size,
                ty,
            } => {
                let node = g.create_node_with(storage_flag(*kind), *size);
                g.add_alloc_site(node, AllocSite::new(*site, *kind));
                if let Some(ty) = ty {
                    g.add_type(Cell::new(node, 0), TypeTag::new(ty));
                }
                g.mk_cell(*dst, Some(Cell::new(node, 0)));
            }
            Operation::Copy { dst, src } => {
                let c = g.value_cell(*src);
                g.mk_cell(*dst, Some(c));
            }
            Operation::FieldAddr { dst, base, offset } => {
                let c = g.value_cell(*base);
                let field = c
                    .checked_shifted(*offset)
                    .ok_or_else(|| DsaError::OffsetOverflow {
                        function: function.name.clone(),
                        base: c.raw_offset(),
                        offset: *offset,
                    })?;
                g.grow_size(c.node(), field.raw_offset());
                g.mk_cell(*dst, Some(field));
            }
            Operation::IndexAddr { dst, base, stride } => {
                let c = g.value_cell(*base);
                g.set_array(c.node(), *stride);
                let c = g.find(c);
                g.mk_cell(*dst, Some(c));
            }
            Operation::Load { dst, addr, ty } => {
                let a = g.value_cell(*addr);
                g.add_flags(a.node(), NodeFlags::READ);
                let tag = ty.as_deref().map(TypeTag::new);
                if let Some(tag) = &tag {
                    g.add_type(a, tag.clone());
                }
                let target = g.mk_link(a, tag);
                g.mk_cell(*dst, Some(target));
            }
            Operation::Store { addr, value, ty } => {
                let a = g.value_cell(*addr);
                g.add_flags(a.node(), NodeFlags::MODIFIED);
                let tag = ty.as_deref().map(TypeTag::new);
                if let Some(tag) = &tag {
                    g.add_type(a, tag.clone());
                }
                if let Some(value) = value {
                    let v = g.value_cell(*value);
                    let a = g.find(a);
                    g.add_link(a, tag, v);
                }
            }
            Operation::GlobalAddr { dst, global } => {
                let c = g.mk_global_cell(*global);
                g.add_flags(c.node(), NodeFlags::GLOBAL);
                if let Some(decl) = module.global(*global) {
                    g.grow_size(c.node(), decl.size);
                }
                let c = g.find(c);
                g.mk_cell(*dst, Some(c));
            }
            Operation::Return { value } => {
                if function.returns_pointer {
                    let r = g.mk_ret_cell(function.id);
                    let v = g.value_cell(*value);
                    g.unify(r, v);
                }
            }
            Operation::IntToPtr { dst } => {
                let node = g.create_node_with(NodeFlags::INT_TO_PTR | NodeFlags::UNKNOWN, 0);
                g.mk_cell(*dst, Some(Cell::new(node, 0)));
            }
            Operation::PtrToInt { src } => {
                let c = g.value_cell(*src);
                g.add_flags(c.node(), NodeFlags::PTR_TO_INT);
            }
        }
        Ok(())
    }
}

fn storage_flag(kind: AllocKind) -> NodeFlags {
    match kind {
        AllocKind::Stack => NodeFlags::STACK,
        AllocKind::Heap => NodeFlags::HEAP,
        AllocKind::Global => NodeFlags::GLOBAL,
        AllocKind::External => NodeFlags::EXTERNAL,
    }
}

impl LocalGraphBuilder for OperationLowering {
    fn build(&self, module: &Module, function: &Function, graph: &mut Graph) -> Result<()> {
        trace!(function = %function.name, ops = function.body.len(), "lowering function body");
        graph.add_function(function.id);
        for formal in function.formals.iter().filter(|f| f.is_pointer) {
            graph.mk_formal_cell(formal.value);
        }
        if function.returns_pointer {
            graph.mk_ret_cell(function.id);
        }
        for op in &function.body {
            self.lower(module, function, op, graph)?;
        }
        for cs in module.call_sites.iter().filter(|cs| cs.caller == function.id) {
            for actual in cs.actuals.iter().flatten() {
                graph.value_cell(*actual);
            }
            if let Some(result) = cs.result {
                graph.value_cell(result);
            }
        }
        Ok(())
    }
}
