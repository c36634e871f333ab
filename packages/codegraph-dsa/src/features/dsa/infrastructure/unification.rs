//! Unification and collapse algebra
//!
//! `unify(a, b)` makes two cells denote the same address. The node with the
//! smaller effective offset is placed inside the other (`unify_at`), which
//! ends in `point_to`: the absorbed node becomes a forwarding node and its
//! contents are replayed into the absorbing node. Replaying links may unify
//! further cells, so every step re-resolves its inputs.
//!
//! | Situation                                         | Outcome                    |
//! |---------------------------------------------------|----------------------------|
//! | array into scalar at offset 0                     | swap roles                 |
//! | array into scalar at offset != 0                  | collapse                   |
//! | two arrays, `max % min != 0`                      | collapse                   |
//! | two arrays, compatible, non-zero relative offset  | collapse                   |
//! | scalar into array, overflows stride at offset != 0| collapse                   |

use super::graph::Graph;
use crate::features::dsa::domain::{Cell, Field, NodeFlags, NodeId, TypeSet, TypeTag};
use tracing::trace;

impl Graph {
    /// Make `a` and `b` denote the same address
    pub fn unify(&mut self, a: Cell, b: Cell) {
        let a = self.find(a);
        let b = self.find(b);
        let oa = self.node(a.node()).effective_offset(a.raw_offset());
        let ob = self.node(b.node()).effective_offset(b.raw_offset());

        if a.node() == b.node() {
            if oa != ob {
                self.collapse(a.node(), "self-unification at distinct offsets");
            }
            return;
        }
        if oa < ob {
            self.unify_at(b.node(), a.node(), ob - oa);
        } else {
            self.unify_at(a.node(), b.node(), oa - ob);
        }
    }

    /// Merge `other` into `this` so that `other`'s offset 0 sits at `offset`
    pub(crate) fn unify_at(&mut self, this: NodeId, other: NodeId, offset: u32) {
        assert!(
            !self.node(this).is_forwarding() && !self.node(other).is_forwarding(),
            "unification through a stale forwarding reference ({} <- {})",
            this,
            other
        );

        if this == other {
            if self.node(this).effective_offset(offset) != 0 {
                self.collapse(this, "self-unification at non-zero offset");
            }
            return;
        }

        let (this_collapsed, this_array, this_size) = {
            let n = self.node(this);
            (n.is_collapsed(), n.is_array(), n.size)
        };
        let (other_collapsed, other_array, other_size) = {
            let n = self.node(other);
            (n.is_collapsed(), n.is_array(), n.size)
        };

        if other_collapsed && !this_collapsed {
            let rep = self.collapse(this, "absorbing a collapsed node");
            self.unify(Cell::new(rep, 0), Cell::new(other, 0));
            return;
        }
        if this_collapsed {
            self.point_to(other, this, 0);
            return;
        }

        match (this_array, other_array) {
            (false, true) => {
                if offset == 0 {
                    self.unify_at(other, this, 0);
                } else {
                    self.collapse_then_unify(this, other, "array merged into scalar at non-zero offset");
                }
            }
            (true, true) => {
                let lo = this_size.min(other_size);
                let hi = this_size.max(other_size);
                if lo == 0 || hi % lo != 0 {
                    self.collapse_then_unify(this, other, "arrays with incompatible strides");
                } else if offset % this_size != 0 {
                    self.collapse_then_unify(this, other, "arrays at non-zero relative offset");
                } else {
                    self.node_mut(this).size = hi;
                    self.point_to(other, this, 0);
                }
            }
            (true, false) => {
                let eo = if this_size == 0 { offset } else { offset % this_size };
                if eo != 0 && other_size + eo > this_size {
                    self.collapse_then_unify(this, other, "scalar overflows array stride");
                } else {
                    self.point_to(other, this, eo);
                }
            }
            (false, false) => {
                let needed = other_size + offset;
                if needed > this_size {
                    self.node_mut(this).size = needed;
                }
                self.point_to(other, this, offset);
            }
        }
    }

    fn collapse_then_unify(&mut self, this: NodeId, other: NodeId, reason: &'static str) {
        let rep = self.collapse(this, reason);
        self.unify(Cell::new(rep, 0), Cell::new(other, 0));
    }

    /// Turn `other` into a forwarding node to `(this, offset)` and replay its
    /// contents into `this`
    fn point_to(&mut self, other: NodeId, this: NodeId, offset: u32) {
        debug_assert_ne!(other, this);
        let moved = std::mem::take(self.node_mut(other));
        self.node_mut(other).forward = Some(Cell::new(this, offset));

        {
            let target = self.node_mut(this);
            target.flags = target.flags.join(moved.flags);
            if target.is_collapsed() {
                target.flags.remove(NodeFlags::ARRAY);
            }
            let mut scalar = target.unique_scalar.merge(moved.unique_scalar);
            if offset != 0 {
                scalar.clear();
            }
            target.unique_scalar = scalar;
            target.alloc_sites.extend(moved.alloc_sites);
            for (site, path) in moved.call_paths {
                target.call_paths.entry(site).or_insert(path);
            }
        }

        for (at, types) in moved.types {
            self.add_types_at(Cell::new(this, at + offset), &types);
        }
        for (field, target) in moved.links {
            self.add_link(Cell::new(this, field.offset + offset), field.ty, target);
        }
    }

    /// Irreversibly lose field sensitivity; returns the representative
    pub fn collapse(&mut self, node: NodeId, reason: &'static str) -> NodeId {
        let node = self.find(Cell::new(node, 0)).node();
        if self.node(node).is_collapsed() {
            return node;
        }
        trace!(node = %node, reason, "collapsing node");

        if self.node(node).size <= 1 {
            let (links, types) = {
                let n = self.node_mut(node);
                n.flags.insert(NodeFlags::OFFSET_COLLAPSED);
                n.flags.remove(NodeFlags::ARRAY);
                n.size = 1;
                (std::mem::take(&mut n.links), std::mem::take(&mut n.types))
            };
            for (at, ts) in types {
                self.add_types_at(Cell::new(node, at), &ts);
            }
            for (field, target) in links {
                self.add_link(Cell::new(node, field.offset), field.ty, target);
            }
        } else {
            let fresh = self.create_node_with(NodeFlags::OFFSET_COLLAPSED, 1);
            self.point_to(node, fresh, 0);
        }
        self.find(Cell::new(node, 0)).node()
    }

    /// Make `node` an array of `stride`-byte elements
    ///
    /// Existing links and types fold modulo the stride. No-op on collapsed
    /// nodes; incompatible with an existing stride it collapses.
    pub fn set_array(&mut self, node: NodeId, stride: u32) {
        let node = self.find(Cell::new(node, 0)).node();
        let (collapsed, array, size) = {
            let n = self.node(node);
            (n.is_collapsed(), n.is_array(), n.size)
        };
        if collapsed || stride == 0 {
            return;
        }
        let new_size = if array {
            if size == stride {
                return;
            }
            let (lo, hi) = (size.min(stride), size.max(stride));
            if lo == 0 || hi % lo != 0 {
                self.collapse(node, "conflicting array strides");
                return;
            }
            hi
        } else {
            stride
        };

        let (links, types) = {
            let n = self.node_mut(node);
            n.flags.insert(NodeFlags::ARRAY);
            n.size = new_size;
            (std::mem::take(&mut n.links), std::mem::take(&mut n.types))
        };
        for (at, ts) in types {
            self.add_types_at(Cell::new(node, at), &ts);
        }
        for (field, target) in links {
            self.add_link(Cell::new(node, field.offset), field.ty, target);
        }
    }

    /// Link `cell` (through a field of type `ty`) to `target`; an occupied
    /// slot is unified with `target` instead
    pub fn add_link(&mut self, cell: Cell, ty: Option<TypeTag>, target: Cell) {
        let at = self.find(cell);
        let field = {
            let node = self.node(at.node());
            node.effective_field(&Field::new(at.raw_offset(), ty, self.config()))
        };
        if let Some(existing) = self.node(at.node()).links.get(&field).copied() {
            self.unify(existing, target);
            return;
        }
        let target = self.find(target);
        // Resolving the target never moves `at`; only unification does
        let pointer_size = self.config().pointer_size;
        let node = self.node_mut(at.node());
        if !node.is_collapsed() && !node.is_array() {
            node.size = node.size.max(field.offset + pointer_size);
        }
        node.links.insert(field, target);
    }

    /// Merge `types` into the type set at `cell`
    ///
    /// On a collapsed node only offset 0 keeps types; anything else marks
    /// the node type-collapsed.
    pub(crate) fn add_types_at(&mut self, cell: Cell, types: &TypeSet) {
        if types.is_empty() {
            return;
        }
        let at = self.find(cell);
        let node = self.node_mut(at.node());
        if node.is_collapsed() && at.raw_offset() != 0 {
            node.flags.insert(NodeFlags::TYPE_COLLAPSED);
            return;
        }
        let offset = node.effective_offset(at.raw_offset());
        let merged = node.types.get(&offset).map_or_else(|| types.clone(), |ts| ts.union(types));
        if node.is_collapsed() && merged.len() > 1 {
            node.flags.insert(NodeFlags::TYPE_COLLAPSED);
        }
        node.types.insert(offset, merged);
    }
}
