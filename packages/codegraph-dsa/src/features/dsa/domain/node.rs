//! Abstract memory object
//!
//! A `Node` is one element of the graph's disjoint-set forest. While live it
//! carries flags, size, type tags, links and allocation provenance; once
//! merged into another node only `forward` is meaningful.

use super::cell::{Cell, Field};
use super::flags::NodeFlags;
use super::program::{AllocKind, AllocSiteId, FunctionId, ValueId};
use super::type_set::TypeSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Allocation site contributing memory to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocSite {
    pub id: AllocSiteId,
    pub kind: AllocKind,
}

impl AllocSite {
    pub fn new(id: AllocSiteId, kind: AllocKind) -> Self {
        Self { id, kind }
    }

    /// Purely function-local provenance
    #[inline]
    pub fn is_stack(&self) -> bool {
        self.kind == AllocKind::Stack
    }
}

/// Propagation direction of a cloning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Callee summary copied into a caller
    BottomUp,
    /// Caller context copied into a callee
    TopDown,
}

/// One hop of an allocation site's interprocedural journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallStep {
    pub direction: Direction,
    pub function: FunctionId,
}

/// Sequence of hops, oldest first
pub type CallPath = Vec<CallStep>;

/// "Only this scalar points here" bookkeeping
///
/// Once disarmed the value never comes back; `ever_had` remembers that the
/// node used to have one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueScalar {
    value: Option<ValueId>,
    ever_had: bool,
}

impl UniqueScalar {
    #[inline]
    pub fn value(&self) -> Option<ValueId> {
        self.value
    }

    #[inline]
    pub fn ever_had(&self) -> bool {
        self.ever_had
    }

    /// Never recorded anything
    #[inline]
    fn is_pristine(&self) -> bool {
        !self.ever_had
    }

    /// Note that `v` denotes the node
    pub fn record(&mut self, v: ValueId) {
        if self.is_pristine() {
            self.value = Some(v);
            self.ever_had = true;
        } else if self.value != Some(v) {
            self.value = None;
        }
    }

    /// Permanently forget the value
    pub fn clear(&mut self) {
        if self.value.is_some() {
            self.ever_had = true;
        }
        self.value = None;
    }

    /// Bookkeeping of the node produced by merging two nodes
    pub fn merge(self, other: UniqueScalar) -> UniqueScalar {
        if other.is_pristine() {
            return self;
        }
        if self.is_pristine() {
            return other;
        }
        UniqueScalar {
            value: if self.value == other.value {
                self.value
            } else {
                None
            },
            ever_had: true,
        }
    }
}

/// Abstract memory object
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub(crate) flags: NodeFlags,
    pub(crate) size: u32,
    pub(crate) types: BTreeMap<u32, TypeSet>,
    pub(crate) links: BTreeMap<Field, Cell>,
    pub(crate) alloc_sites: BTreeSet<AllocSite>,
    pub(crate) call_paths: BTreeMap<AllocSiteId, CallPath>,
    pub(crate) unique_scalar: UniqueScalar,
    pub(crate) forward: Option<Cell>,
}

impl Node {
    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn types(&self) -> &BTreeMap<u32, TypeSet> {
        &self.types
    }

    /// Outgoing links; targets may be stale until the graph is compressed
    #[inline]
    pub fn links(&self) -> &BTreeMap<Field, Cell> {
        &self.links
    }

    #[inline]
    pub fn alloc_sites(&self) -> &BTreeSet<AllocSite> {
        &self.alloc_sites
    }

    /// Recorded interprocedural path of an allocation site
    pub fn call_path(&self, site: AllocSiteId) -> Option<&CallPath> {
        self.call_paths.get(&site)
    }

    #[inline]
    pub fn unique_scalar(&self) -> UniqueScalar {
        self.unique_scalar
    }

    #[inline]
    pub fn is_forwarding(&self) -> bool {
        self.forward.is_some()
    }

    /// Forwarding target, if this node has been merged away
    #[inline]
    pub fn forward(&self) -> Option<Cell> {
        self.forward
    }

    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.flags.contains(NodeFlags::OFFSET_COLLAPSED)
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.flags.contains(NodeFlags::ARRAY)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.flags.contains(NodeFlags::MODIFIED)
    }

    #[inline]
    pub fn is_read(&self) -> bool {
        self.flags.contains(NodeFlags::READ)
    }

    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.flags.contains(NodeFlags::FOREIGN)
    }

    /// Offset a raw offset denotes inside this node
    #[inline]
    pub fn effective_offset(&self, raw: u32) -> u32 {
        if self.is_collapsed() {
            0
        } else if self.is_array() && self.size > 0 {
            raw % self.size
        } else {
            raw
        }
    }

    /// Link key a raw field denotes inside this node
    pub fn effective_field(&self, field: &Field) -> Field {
        if self.is_collapsed() {
            Field::at(0)
        } else {
            field.with_offset(self.effective_offset(field.offset))
        }
    }

    /// Whether the node carries no information beyond its existence
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
            && self.links.is_empty()
            && self.types.is_empty()
            && self.alloc_sites.is_empty()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(fwd) = self.forward {
            return write!(f, "forward -> {}", fwd);
        }
        write!(f, "[{}] size={}", self.flags, self.size)?;
        for (offset, types) in &self.types {
            write!(f, " {}:{}", offset, types)?;
        }
        for (field, target) in &self.links {
            write!(f, " ({} -> {})", field, target)?;
        }
        Ok(())
    }
}
