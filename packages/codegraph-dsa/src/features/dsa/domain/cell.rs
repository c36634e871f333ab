//! Cells and fields
//!
//! A `Cell` names a byte position inside an abstract memory object. The node
//! it mentions may be stale (forwarding); `Graph::resolve` and `Graph::find`
//! return the live representative with the accumulated raw offset.

use super::type_set::TypeTag;
use crate::config::GraphConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a node inside its owning `Graph`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// (node, raw offset) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    node: NodeId,
    offset: u32,
}

impl Cell {
    #[inline]
    pub fn new(node: NodeId, offset: u32) -> Self {
        Self { node, offset }
    }

    /// Node as stored; may be a forwarding node
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Offset as stored, before forwarding and array/collapse normalization
    #[inline]
    pub fn raw_offset(&self) -> u32 {
        self.offset
    }

    /// Same node, `delta` bytes further
    #[inline]
    pub fn shifted(&self, delta: u32) -> Self {
        Self {
            node: self.node,
            offset: self.offset + delta,
        }
    }

    /// `shifted`, or `None` when the offset leaves the `u32` range
    #[inline]
    pub fn checked_shifted(&self, delta: u32) -> Option<Self> {
        self.offset.checked_add(delta).map(|offset| Self {
            node: self.node,
            offset,
        })
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.node, self.offset)
    }
}

/// Link key: an offset, optionally qualified by the accessed type
///
/// The type component is only populated when the graph runs with
/// `GraphConfig::type_aware_fields`; otherwise two accesses at the same
/// offset always share one link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub offset: u32,
    pub ty: Option<TypeTag>,
}

impl Field {
    /// Build a field honoring the graph's type-awareness setting
    pub fn new(offset: u32, ty: Option<TypeTag>, config: &GraphConfig) -> Self {
        Self {
            offset,
            ty: if config.type_aware_fields { ty } else { None },
        }
    }

    /// Untyped field
    #[inline]
    pub fn at(offset: u32) -> Self {
        Self { offset, ty: None }
    }

    /// Same type, different offset
    #[inline]
    pub fn with_offset(&self, offset: u32) -> Self {
        Self {
            offset,
            ty: self.ty.clone(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "{}:{}", self.offset, ty),
            None => write!(f, "{}", self.offset),
        }
    }
}
